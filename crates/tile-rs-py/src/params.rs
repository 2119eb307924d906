use pyo3::prelude::*;
use tile_rs::{TileDataBarrierParams, TileGatherParams, TileIndex, TileMapEquation};

use crate::types::{
    from_json, to_json, PyVertexAttributeF32, PyVertexAttributeU32, PyVertexIOInfo,
};

#[pyclass(name = "IpuTileMapEquation")]
#[derive(Clone)]
pub struct PyTileMapEquation {
    inner: TileMapEquation,
}

#[pymethods]
impl PyTileMapEquation {
    #[new]
    #[pyo3(signature = (
        pname,
        vname,
        tiles,
        inputs_info = Vec::new(),
        outputs_info = Vec::new(),
        attributes_u32 = Vec::new(),
        attributes_f32 = Vec::new(),
        gp_filename = String::new(),
        perf_estimate = 0,
    ))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        pname: String,
        vname: String,
        tiles: Vec<TileIndex>,
        inputs_info: Vec<PyVertexIOInfo>,
        outputs_info: Vec<PyVertexIOInfo>,
        attributes_u32: Vec<PyVertexAttributeU32>,
        attributes_f32: Vec<PyVertexAttributeF32>,
        gp_filename: String,
        perf_estimate: u64,
    ) -> Self {
        let inner = TileMapEquation::new(pname, vname, tiles)
            .with_inputs(inputs_info.into_iter().map(|info| info.inner).collect())
            .with_outputs(outputs_info.into_iter().map(|info| info.inner).collect())
            .with_attributes(
                attributes_u32.into_iter().map(|attr| attr.inner).collect(),
                attributes_f32.into_iter().map(|attr| attr.inner).collect(),
            )
            .with_external_code_ref(gp_filename)
            .with_perf_estimate(perf_estimate);
        Self { inner }
    }

    #[getter]
    fn pname(&self) -> String {
        self.inner.primitive_name.clone()
    }

    #[getter]
    fn vname(&self) -> String {
        self.inner.kernel_name.clone()
    }

    #[getter]
    fn tiles(&self) -> Vec<TileIndex> {
        self.inner.tiles.clone()
    }

    #[getter]
    fn inputs_info(&self) -> Vec<PyVertexIOInfo> {
        self.inner
            .inputs_info
            .iter()
            .cloned()
            .map(|inner| PyVertexIOInfo { inner })
            .collect()
    }

    #[getter]
    fn outputs_info(&self) -> Vec<PyVertexIOInfo> {
        self.inner
            .outputs_info
            .iter()
            .cloned()
            .map(|inner| PyVertexIOInfo { inner })
            .collect()
    }

    #[getter]
    fn gp_filename(&self) -> String {
        self.inner.external_code_ref.clone()
    }

    #[getter]
    fn perf_estimate(&self) -> u64 {
        self.inner.perf_estimate
    }

    fn __eq__(&self, other: &Self) -> bool {
        self.inner == other.inner
    }

    fn __repr__(&self) -> String {
        format!("{:?}", self.inner)
    }

    fn to_json_str(&self) -> PyResult<String> {
        to_json(&self.inner)
    }

    #[staticmethod]
    fn from_json_str(text: &str) -> PyResult<Self> {
        Ok(Self {
            inner: from_json(text)?,
        })
    }
}

#[pyclass(name = "TileGatherParams")]
#[derive(Clone)]
pub struct PyTileGatherParams {
    inner: TileGatherParams,
}

#[pymethods]
impl PyTileGatherParams {
    #[new]
    fn new(previous_tiles: Vec<TileIndex>, indices: Vec<u32>, tiles: Vec<TileIndex>) -> Self {
        Self {
            inner: TileGatherParams::new(previous_tiles, indices, tiles),
        }
    }

    #[getter]
    fn previous_tiles(&self) -> Vec<TileIndex> {
        self.inner.previous_tiles.clone()
    }

    #[getter]
    fn indices(&self) -> Vec<u32> {
        self.inner.indices.clone()
    }

    #[getter]
    fn tiles(&self) -> Vec<TileIndex> {
        self.inner.tiles.clone()
    }

    fn __eq__(&self, other: &Self) -> bool {
        self.inner == other.inner
    }

    fn __repr__(&self) -> String {
        format!("{:?}", self.inner)
    }

    fn to_json_str(&self) -> PyResult<String> {
        to_json(&self.inner)
    }

    #[staticmethod]
    fn from_json_str(text: &str) -> PyResult<Self> {
        Ok(Self {
            inner: from_json(text)?,
        })
    }
}

#[pyclass(name = "TileDataBarrierParams")]
#[derive(Clone)]
pub struct PyTileDataBarrierParams {
    inner: TileDataBarrierParams,
}

#[pymethods]
impl PyTileDataBarrierParams {
    #[new]
    fn new(vname: String, inputs_tiles: Vec<Vec<TileIndex>>) -> Self {
        Self {
            inner: TileDataBarrierParams::new(vname, inputs_tiles),
        }
    }

    #[getter]
    fn vname(&self) -> String {
        self.inner.kernel_name.clone()
    }

    #[getter]
    fn inputs_tiles(&self) -> Vec<Vec<TileIndex>> {
        self.inner.inputs_tiles.clone()
    }

    #[getter]
    fn max_tile(&self) -> TileIndex {
        self.inner.max_tile
    }

    fn __eq__(&self, other: &Self) -> bool {
        self.inner == other.inner
    }

    fn __repr__(&self) -> String {
        format!("{:?}", self.inner)
    }

    fn to_json_str(&self) -> PyResult<String> {
        to_json(&self.inner)
    }

    #[staticmethod]
    fn from_json_str(text: &str) -> PyResult<Self> {
        Ok(Self {
            inner: from_json(text)?,
        })
    }
}
