use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyBytes;
use tile_rs::{
    ConstantData, IpuType, JsonCodec, ShapedArray, VertexAttributeF32, VertexAttributeU32, VertexIOInfo,
    VertexIOType,
};

pub(crate) fn json_err(err: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(format!("invalid JSON parameters: {err}"))
}

pub(crate) fn to_json<T: JsonCodec>(value: &T) -> PyResult<String> {
    value.to_json_str().map_err(json_err)
}

pub(crate) fn from_json<T: JsonCodec>(text: &str) -> PyResult<T> {
    T::from_json_str(text).map_err(json_err)
}

#[pyclass(name = "IpuType", eq, eq_int)]
#[derive(Clone, Copy, PartialEq)]
#[allow(non_camel_case_types, clippy::upper_case_acronyms)]
pub enum PyIpuType {
    BOOL = 1,
    CHAR = 2,
    UNSIGNED_CHAR = 3,
    SIGNED_CHAR = 4,
    SHORT = 5,
    UNSIGNED_SHORT = 6,
    INT = 7,
    UNSIGNED_INT = 8,
    LONG = 9,
    UNSIGNED_LONG = 10,
    QUARTER = 11,
    HALF = 12,
    FLOAT = 13,
}

impl From<PyIpuType> for IpuType {
    fn from(value: PyIpuType) -> Self {
        // Discriminants are the wire codes.
        IpuType::ALL[value as usize - 1]
    }
}

impl From<IpuType> for PyIpuType {
    fn from(value: IpuType) -> Self {
        match value {
            IpuType::Bool => PyIpuType::BOOL,
            IpuType::Char => PyIpuType::CHAR,
            IpuType::UnsignedChar => PyIpuType::UNSIGNED_CHAR,
            IpuType::SignedChar => PyIpuType::SIGNED_CHAR,
            IpuType::Short => PyIpuType::SHORT,
            IpuType::UnsignedShort => PyIpuType::UNSIGNED_SHORT,
            IpuType::Int => PyIpuType::INT,
            IpuType::UnsignedInt => PyIpuType::UNSIGNED_INT,
            IpuType::Long => PyIpuType::LONG,
            IpuType::UnsignedLong => PyIpuType::UNSIGNED_LONG,
            IpuType::Quarter => PyIpuType::QUARTER,
            IpuType::Half => PyIpuType::HALF,
            IpuType::Float => PyIpuType::FLOAT,
        }
    }
}

#[pymethods]
impl PyIpuType {
    #[getter]
    fn bytesize(&self) -> usize {
        IpuType::from(*self).size_in_bytes()
    }

    #[getter]
    fn template_name(&self) -> &'static str {
        IpuType::from(*self).template_name()
    }

    fn to_json_str(&self) -> PyResult<String> {
        to_json(&IpuType::from(*self))
    }

    #[staticmethod]
    fn from_json_str(text: &str) -> PyResult<Self> {
        from_json::<IpuType>(text).map(Self::from)
    }
}

#[pyclass(name = "IpuVertexIOType", eq, eq_int)]
#[derive(Clone, Copy, PartialEq)]
pub enum PyVertexIOType {
    In = 0,
    Out = 1,
    InOut = 2,
}

impl From<PyVertexIOType> for VertexIOType {
    fn from(value: PyVertexIOType) -> Self {
        match value {
            PyVertexIOType::In => VertexIOType::In,
            PyVertexIOType::Out => VertexIOType::Out,
            PyVertexIOType::InOut => VertexIOType::InOut,
        }
    }
}

impl From<VertexIOType> for PyVertexIOType {
    fn from(value: VertexIOType) -> Self {
        match value {
            VertexIOType::In => PyVertexIOType::In,
            VertexIOType::Out => PyVertexIOType::Out,
            VertexIOType::InOut => PyVertexIOType::InOut,
        }
    }
}

#[pymethods]
impl PyVertexIOType {
    fn to_json_str(&self) -> PyResult<String> {
        to_json(&VertexIOType::from(*self))
    }

    #[staticmethod]
    fn from_json_str(text: &str) -> PyResult<Self> {
        from_json::<VertexIOType>(text).map(Self::from)
    }
}

#[pyclass(name = "IpuShapedArray")]
#[derive(Clone)]
pub struct PyShapedArray {
    pub(crate) inner: ShapedArray,
}

#[pymethods]
impl PyShapedArray {
    #[new]
    fn new(shape: Vec<usize>, dtype: PyIpuType) -> Self {
        Self {
            inner: ShapedArray::new(shape, dtype.into()),
        }
    }

    #[getter]
    fn shape(&self) -> Vec<usize> {
        self.inner.shape.clone()
    }

    #[getter]
    fn dtype(&self) -> PyIpuType {
        self.inner.dtype.into()
    }

    #[getter]
    fn size(&self) -> usize {
        self.inner.size()
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

#[pyclass(name = "IpuVertexIOInfo")]
#[derive(Clone)]
pub struct PyVertexIOInfo {
    pub(crate) inner: VertexIOInfo,
}

#[pymethods]
impl PyVertexIOInfo {
    #[new]
    #[pyo3(signature = (name, iotype, aval, rank = 1, constant_data = None))]
    fn new(
        name: String,
        iotype: PyVertexIOType,
        aval: PyShapedArray,
        rank: u8,
        constant_data: Option<Vec<u8>>,
    ) -> Self {
        let mut inner = VertexIOInfo::new(name, iotype.into(), aval.inner).with_rank(rank);
        inner.constant_data = constant_data.map(ConstantData);
        Self { inner }
    }

    #[getter]
    fn name(&self) -> String {
        self.inner.name.clone()
    }

    #[getter]
    fn iotype(&self) -> PyVertexIOType {
        self.inner.iotype.into()
    }

    #[getter]
    fn aval(&self) -> PyShapedArray {
        PyShapedArray {
            inner: self.inner.aval.clone(),
        }
    }

    #[getter]
    fn rank(&self) -> u8 {
        self.inner.rank
    }

    #[getter]
    fn constant_data<'py>(&self, py: Python<'py>) -> Option<Bound<'py, PyBytes>> {
        self.inner
            .constant_data
            .as_ref()
            .map(|data| PyBytes::new_bound(py, data.as_bytes()))
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

#[pyclass(name = "IpuVertexAttributeU32")]
#[derive(Clone)]
pub struct PyVertexAttributeU32 {
    pub(crate) inner: VertexAttributeU32,
}

#[pymethods]
impl PyVertexAttributeU32 {
    #[new]
    fn new(name: String, value: u32) -> Self {
        Self {
            inner: VertexAttributeU32::new(name, value),
        }
    }

    #[getter]
    fn name(&self) -> String {
        self.inner.name.clone()
    }

    #[getter]
    fn value(&self) -> u32 {
        self.inner.value
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

#[pyclass(name = "IpuVertexAttributeF32")]
#[derive(Clone)]
pub struct PyVertexAttributeF32 {
    pub(crate) inner: VertexAttributeF32,
}

#[pymethods]
impl PyVertexAttributeF32 {
    #[new]
    fn new(name: String, value: f32) -> Self {
        Self {
            inner: VertexAttributeF32::new(name, value),
        }
    }

    #[getter]
    fn name(&self) -> String {
        self.inner.name.clone()
    }

    #[getter]
    fn value(&self) -> f32 {
        self.inner.value
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
