use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use tile_rs::primitive::registry;
use tile_rs::JsonCodec;

/// JSON metadata of primitive `name` called with `num_inputs` inputs.
#[pyfunction]
pub fn primitive_metadata(name: &str, num_inputs: u32) -> PyResult<String> {
    let metadata = registry::primitive_metadata(name, num_inputs)
        .map_err(|err| PyValueError::new_err(err.to_string()))?;
    metadata
        .to_json_str()
        .map_err(|err| PyValueError::new_err(err.to_string()))
}

#[pyfunction]
pub fn list_primitives() -> Vec<String> {
    registry::list_primitives()
}

#[pyfunction]
pub fn has_primitive(name: &str) -> bool {
    registry::has_primitive(name)
}
