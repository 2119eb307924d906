//! Data-model types crossing the host boundary as JSON text.
//!
//! Field names are part of the wire format: the host serializes parameters with exactly these
//! names, so renaming a field is a breaking change. The two integer-coded enums (`IpuType`,
//! `VertexIOType`) carry hand-written serde impls to pin their numeric codes.

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{TileError, TileResult};
use crate::graph::Tensor;

/// Index of one tile on the target accelerator.
pub type TileIndex = u32;

/// Element types supported on tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IpuType {
    Bool,
    Char,
    UnsignedChar,
    SignedChar,
    Short,
    UnsignedShort,
    Int,
    UnsignedInt,
    Long,
    UnsignedLong,
    Quarter,
    Half,
    Float,
}

impl IpuType {
    pub const ALL: [IpuType; 13] = [
        IpuType::Bool,
        IpuType::Char,
        IpuType::UnsignedChar,
        IpuType::SignedChar,
        IpuType::Short,
        IpuType::UnsignedShort,
        IpuType::Int,
        IpuType::UnsignedInt,
        IpuType::Long,
        IpuType::UnsignedLong,
        IpuType::Quarter,
        IpuType::Half,
        IpuType::Float,
    ];

    /// Wire code used in JSON parameters.
    pub fn code(self) -> u8 {
        match self {
            IpuType::Bool => 1,
            IpuType::Char => 2,
            IpuType::UnsignedChar => 3,
            IpuType::SignedChar => 4,
            IpuType::Short => 5,
            IpuType::UnsignedShort => 6,
            IpuType::Int => 7,
            IpuType::UnsignedInt => 8,
            IpuType::Long => 9,
            IpuType::UnsignedLong => 10,
            IpuType::Quarter => 11,
            IpuType::Half => 12,
            IpuType::Float => 13,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        IpuType::ALL.iter().copied().find(|dtype| dtype.code() == code)
    }

    /// Storage bit-width of one element.
    pub fn bitwidth(self) -> u32 {
        match self {
            IpuType::Bool
            | IpuType::Char
            | IpuType::UnsignedChar
            | IpuType::SignedChar
            | IpuType::Quarter => 8,
            IpuType::Short | IpuType::UnsignedShort | IpuType::Half => 16,
            IpuType::Int | IpuType::UnsignedInt | IpuType::Float => 32,
            IpuType::Long | IpuType::UnsignedLong => 64,
        }
    }

    pub fn size_in_bytes(self) -> usize {
        (self.bitwidth() / 8) as usize
    }

    /// Type name as spelled in kernel template arguments.
    pub fn template_name(self) -> &'static str {
        match self {
            IpuType::Bool => "bool",
            IpuType::Char => "char",
            IpuType::UnsignedChar => "unsigned char",
            IpuType::SignedChar => "signed char",
            IpuType::Short => "short",
            IpuType::UnsignedShort => "unsigned short",
            IpuType::Int => "int",
            IpuType::UnsignedInt => "unsigned int",
            IpuType::Long => "long",
            IpuType::UnsignedLong => "unsigned long",
            IpuType::Quarter => "quarter",
            IpuType::Half => "half",
            IpuType::Float => "float",
        }
    }

    pub fn from_template_name(name: &str) -> Option<Self> {
        IpuType::ALL
            .iter()
            .copied()
            .find(|dtype| dtype.template_name() == name)
    }

    pub fn is_float(self) -> bool {
        matches!(self, IpuType::Quarter | IpuType::Half | IpuType::Float)
    }
}

impl fmt::Display for IpuType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.template_name())
    }
}

impl Serialize for IpuType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for IpuType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let code = u8::deserialize(deserializer)?;
        IpuType::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown element type code {code}")))
    }
}

/// JAX-like abstract value: shape plus element type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShapedArray {
    pub shape: Vec<usize>,
    pub dtype: IpuType,
}

impl ShapedArray {
    pub fn new(shape: impl Into<Vec<usize>>, dtype: IpuType) -> Self {
        Self {
            shape: shape.into(),
            dtype,
        }
    }

    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }
}

/// Direction of a vertex I/O field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexIOType {
    In,
    Out,
    InOut,
}

impl VertexIOType {
    pub fn code(self) -> u8 {
        match self {
            VertexIOType::In => 0,
            VertexIOType::Out => 1,
            VertexIOType::InOut => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(VertexIOType::In),
            1 => Some(VertexIOType::Out),
            2 => Some(VertexIOType::InOut),
            _ => None,
        }
    }
}

impl Serialize for VertexIOType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for VertexIOType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let code = u8::deserialize(deserializer)?;
        VertexIOType::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown vertex io type {code}")))
    }
}

fn default_io_rank() -> u8 {
    1
}

/// Raw little-endian bytes of a constant vertex input, base64 text on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ConstantData(pub Vec<u8>);

impl ConstantData {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for ConstantData {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&BASE64.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for ConstantData {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        BASE64
            .decode(text.as_bytes())
            .map(ConstantData)
            .map_err(|err| serde::de::Error::custom(format!("invalid base64 constant data: {err}")))
    }
}

/// Named tensor connection point of a vertex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VertexIOInfo {
    pub name: String,
    pub iotype: VertexIOType,
    pub aval: ShapedArray,
    /// 1: flatten the per-tile slice before connecting. 2: connect it unchanged.
    #[serde(default = "default_io_rank")]
    pub rank: u8,
    /// Constant input materialized on every tile instead of being passed as a tensor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant_data: Option<ConstantData>,
}

impl VertexIOInfo {
    pub fn new(name: impl Into<String>, iotype: VertexIOType, aval: ShapedArray) -> Self {
        Self {
            name: name.into(),
            iotype,
            aval,
            rank: 1,
            constant_data: None,
        }
    }

    /// Constant `In` field holding `data`, the little-endian bytes of a `shape` array.
    pub fn constant(
        name: impl Into<String>,
        dtype: IpuType,
        shape: impl Into<Vec<usize>>,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        let mut info = Self::new(name, VertexIOType::In, ShapedArray::new(shape, dtype));
        info.constant_data = Some(ConstantData(data.into()));
        info
    }

    pub fn is_constant(&self) -> bool {
        self.constant_data.is_some()
    }

    pub fn input(name: impl Into<String>, aval: ShapedArray) -> Self {
        Self::new(name, VertexIOType::In, aval)
    }

    pub fn output(name: impl Into<String>, aval: ShapedArray) -> Self {
        Self::new(name, VertexIOType::Out, aval)
    }

    pub fn inout(name: impl Into<String>, aval: ShapedArray) -> Self {
        Self::new(name, VertexIOType::InOut, aval)
    }

    pub fn with_rank(mut self, rank: u8) -> Self {
        self.rank = rank;
        self
    }

    pub fn shape(&self) -> &[usize] {
        &self.aval.shape
    }

    pub fn dtype(&self) -> IpuType {
        self.aval.dtype
    }

    pub(crate) fn check_rank(&self) -> TileResult<()> {
        match self.rank {
            1 | 2 => Ok(()),
            other => Err(TileError::design(format!(
                "vertex io tensor '{}' has rank {other}; only 1 and 2 are supported",
                self.name
            ))),
        }
    }

    /// Constants must be plain inputs with exactly `size * width` bytes.
    pub(crate) fn check_constant(&self) -> TileResult<()> {
        let Some(data) = &self.constant_data else {
            return Ok(());
        };
        if self.iotype != VertexIOType::In {
            return Err(TileError::design(format!(
                "constant vertex field '{}' must be an input, got {:?}",
                self.name, self.iotype
            )));
        }
        let expected = self.aval.size() * self.dtype().size_in_bytes();
        if data.0.len() != expected {
            return Err(TileError::design(format!(
                "constant vertex field '{}' holds {} bytes, {:?} {:?} needs {expected}",
                self.name,
                data.0.len(),
                self.dtype(),
                self.shape()
            )));
        }
        Ok(())
    }

    /// Reshapes a per-tile tensor slice for connection to the vertex field.
    pub fn connect_reshape(&self, tensor: &Tensor) -> TileResult<Tensor> {
        self.check_rank()?;
        if self.rank == 1 {
            Ok(tensor.flatten())
        } else {
            Ok(tensor.clone())
        }
    }
}

fn vertex_infos<I, K>(avals: I, inout_names: &[&str], default: VertexIOType) -> Vec<VertexIOInfo>
where
    I: IntoIterator<Item = (K, ShapedArray)>,
    K: Into<String>,
{
    avals
        .into_iter()
        .map(|(name, aval)| {
            let name = name.into();
            let iotype = if inout_names.contains(&name.as_str()) {
                VertexIOType::InOut
            } else {
                default
            };
            VertexIOInfo::new(name, iotype, aval)
        })
        .collect()
}

/// Input descriptors in order; names listed in `inout_names` are `InOut`, others `In`.
pub fn vertex_inputs<I, K>(inavals: I, inout_names: &[&str]) -> Vec<VertexIOInfo>
where
    I: IntoIterator<Item = (K, ShapedArray)>,
    K: Into<String>,
{
    vertex_infos(inavals, inout_names, VertexIOType::In)
}

/// Output descriptors in order; names listed in `inout_names` are `InOut`, others `Out`.
pub fn vertex_outputs<I, K>(outavals: I, inout_names: &[&str]) -> Vec<VertexIOInfo>
where
    I: IntoIterator<Item = (K, ShapedArray)>,
    K: Into<String>,
{
    vertex_infos(outavals, inout_names, VertexIOType::Out)
}

/// Static scalar attribute set as the initial value of a vertex field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexAttribute<T> {
    pub name: String,
    pub value: T,
}

impl<T> VertexAttribute<T> {
    pub fn new(name: impl Into<String>, value: T) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

pub type VertexAttributeU32 = VertexAttribute<u32>;
pub type VertexAttributeF32 = VertexAttribute<f32>;

/// Scalar value written into a vertex field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttributeValue {
    U32(u32),
    F32(f32),
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        AttributeValue::U32(value)
    }
}

impl From<f32> for AttributeValue {
    fn from(value: f32) -> Self {
        AttributeValue::F32(value)
    }
}

/// Splits named scalars into the per-type attribute buckets carried by an equation.
pub fn split_vertex_attributes<I, K>(attributes: I) -> (Vec<VertexAttributeU32>, Vec<VertexAttributeF32>)
where
    I: IntoIterator<Item = (K, AttributeValue)>,
    K: Into<String>,
{
    let mut attrs_u32 = Vec::new();
    let mut attrs_f32 = Vec::new();
    for (name, value) in attributes {
        match value {
            AttributeValue::U32(v) => attrs_u32.push(VertexAttribute::new(name, v)),
            AttributeValue::F32(v) => attrs_f32.push(VertexAttribute::new(name, v)),
        }
    }
    (attrs_u32, attrs_f32)
}

/// JSON text conversion used at the host boundary.
pub trait JsonCodec: Serialize + DeserializeOwned {
    fn to_json_str(&self) -> TileResult<String> {
        serde_json::to_string(self).map_err(TileError::from)
    }

    fn from_json_str(src: &str) -> TileResult<Self> {
        serde_json::from_str(src).map_err(TileError::from)
    }
}

impl JsonCodec for IpuType {}
impl JsonCodec for ShapedArray {}
impl JsonCodec for VertexIOType {}
impl JsonCodec for VertexIOInfo {}
impl JsonCodec for VertexAttributeU32 {}
impl JsonCodec for VertexAttributeF32 {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_type_codes_are_dense_and_unique() {
        for (offset, dtype) in IpuType::ALL.iter().enumerate() {
            assert_eq!(dtype.code() as usize, offset + 1);
            assert_eq!(IpuType::from_code(dtype.code()), Some(*dtype));
            assert_eq!(IpuType::from_template_name(dtype.template_name()), Some(*dtype));
        }
        assert_eq!(IpuType::from_code(0), None);
        assert_eq!(IpuType::from_code(14), None);
    }

    #[test]
    fn io_rank_defaults_to_one() {
        let info: VertexIOInfo =
            serde_json::from_str(r#"{"name":"x","iotype":0,"aval":{"shape":[3],"dtype":13}}"#)
                .expect("valid io info");
        assert_eq!(info.rank, 1);
        assert_eq!(info.iotype, VertexIOType::In);
        assert_eq!(info.dtype(), IpuType::Float);
    }

    #[test]
    fn io_builders_mark_inout_names() {
        let aval = ShapedArray::new(vec![4], IpuType::Half);
        let inputs = vertex_inputs([("A", aval.clone()), ("B", aval.clone())], &["A"]);
        assert_eq!(
            inputs.iter().map(|i| i.iotype).collect::<Vec<_>>(),
            vec![VertexIOType::InOut, VertexIOType::In]
        );
        let outputs = vertex_outputs([("A", aval.clone()), ("C", aval)], &["A"]);
        assert_eq!(
            outputs.iter().map(|i| i.iotype).collect::<Vec<_>>(),
            vec![VertexIOType::InOut, VertexIOType::Out]
        );
        assert!(outputs.iter().all(|i| i.rank == 1 && !i.is_constant()));
    }

    #[test]
    fn constant_info_checks_size_and_direction() {
        let info = VertexIOInfo::constant("w", IpuType::Float, vec![2, 2], vec![0u8; 16]);
        assert_eq!(info.iotype, VertexIOType::In);
        assert!(info.check_constant().is_ok());

        let short = VertexIOInfo::constant("w", IpuType::Float, vec![2, 2], vec![0u8; 12]);
        assert!(matches!(short.check_constant(), Err(TileError::Design(_))));

        let mut output = info;
        output.iotype = VertexIOType::Out;
        assert!(matches!(output.check_constant(), Err(TileError::Design(_))));
    }

    #[test]
    fn split_attributes_buckets_by_scalar_type() {
        let (u, f) = split_vertex_attributes([
            ("size", AttributeValue::U32(8)),
            ("scale", AttributeValue::F32(0.5)),
            ("offset", AttributeValue::U32(2)),
        ]);
        assert_eq!(u, vec![VertexAttribute::new("size", 8), VertexAttribute::new("offset", 2)]);
        assert_eq!(f, vec![VertexAttribute::new("scale", 0.5)]);
    }
}
