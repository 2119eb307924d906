#![allow(clippy::useless_conversion)]

use pyo3::prelude::*;

mod params;
mod primitives;
mod types;

#[pymodule]
fn _native(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Data types
    m.add_class::<types::PyIpuType>()?;
    m.add_class::<types::PyVertexIOType>()?;
    m.add_class::<types::PyShapedArray>()?;
    m.add_class::<types::PyVertexIOInfo>()?;
    m.add_class::<types::PyVertexAttributeU32>()?;
    m.add_class::<types::PyVertexAttributeF32>()?;

    // Primitive parameters
    m.add_class::<params::PyTileMapEquation>()?;
    m.add_class::<params::PyTileGatherParams>()?;
    m.add_class::<params::PyTileDataBarrierParams>()?;

    // Primitive registry
    m.add_function(wrap_pyfunction!(primitives::primitive_metadata, m)?)?;
    m.add_function(wrap_pyfunction!(primitives::list_primitives, m)?)?;
    m.add_function(wrap_pyfunction!(primitives::has_primitive, m)?)?;

    Ok(())
}
