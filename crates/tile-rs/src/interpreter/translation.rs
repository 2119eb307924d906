//! Translation rules from named element-wise operations to tile-mapped equations.
//!
//! A rule receives the operation name, the tiles it is mapped on, the per-tile shaped values
//! of its inputs and free-form scalar attributes, and returns the equation to instantiate.
//! Rules live in a process-global table seeded with the binary and scaled add/sub kernels
//! and the hardware cycle counter.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, OnceLock, RwLock};

use crate::error::{TileError, TileResult};
use crate::graph::{Graph, Sequence, Tensor};
use crate::tile::{TileMapEquation, TileMapEquationCall};
use crate::types::{
    split_vertex_attributes, vertex_inputs, vertex_outputs, AttributeValue, IpuType, JsonCodec,
    ShapedArray, TileIndex,
};

use super::sharded::{dispatch, TileShardedTensor};
use super::vertex_name::{make_vertex_name_templated, TemplateArg};

/// Named scalar attributes passed to a translation rule.
pub type TranslationAttributes = BTreeMap<String, AttributeValue>;

/// Builds the equation for one operation mapped over `tiles`.
pub type TileTranslation = Arc<
    dyn Fn(&str, &[TileIndex], &[ShapedArray], &TranslationAttributes) -> TileResult<TileMapEquation>
        + Send
        + Sync,
>;

/// Wraps a closure as a [`TileTranslation`].
pub fn translation_rule<F>(rule: F) -> TileTranslation
where
    F: Fn(&str, &[TileIndex], &[ShapedArray], &TranslationAttributes) -> TileResult<TileMapEquation>
        + Send
        + Sync
        + 'static,
{
    Arc::new(rule)
}

/// Binary element-wise operations backed by `popops::BinaryOp1D`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Atan2,
    Divide,
    Equal,
    GreaterThanEqual,
    GreaterThan,
    LessThanEqual,
    LessThan,
    Maximum,
    Minimum,
    Multiply,
    NotEqual,
    Power,
    Remainder,
    Subtract,
    ShiftLeft,
    ShiftRight,
    ShiftRightSignExtend,
}

impl BinaryOp {
    pub const ALL: [BinaryOp; 18] = [
        BinaryOp::Add,
        BinaryOp::Atan2,
        BinaryOp::Divide,
        BinaryOp::Equal,
        BinaryOp::GreaterThanEqual,
        BinaryOp::GreaterThan,
        BinaryOp::LessThanEqual,
        BinaryOp::LessThan,
        BinaryOp::Maximum,
        BinaryOp::Minimum,
        BinaryOp::Multiply,
        BinaryOp::NotEqual,
        BinaryOp::Power,
        BinaryOp::Remainder,
        BinaryOp::Subtract,
        BinaryOp::ShiftLeft,
        BinaryOp::ShiftRight,
        BinaryOp::ShiftRightSignExtend,
    ];

    /// Operation name used as the translation key.
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Atan2 => "atan2",
            BinaryOp::Divide => "div",
            BinaryOp::Equal => "eq",
            BinaryOp::GreaterThanEqual => "ge",
            BinaryOp::GreaterThan => "gt",
            BinaryOp::LessThanEqual => "le",
            BinaryOp::LessThan => "lt",
            BinaryOp::Maximum => "max",
            BinaryOp::Minimum => "min",
            BinaryOp::Multiply => "mul",
            BinaryOp::NotEqual => "ne",
            BinaryOp::Power => "pow",
            BinaryOp::Remainder => "rem",
            BinaryOp::Subtract => "sub",
            BinaryOp::ShiftLeft => "shift_left",
            BinaryOp::ShiftRight => "shift_right_logical",
            BinaryOp::ShiftRightSignExtend => "shift_right_arithmetic",
        }
    }

    /// `popops::expr::BinaryOpType` enumerator.
    pub fn kernel_op(self) -> &'static str {
        match self {
            BinaryOp::Add => "ADD",
            BinaryOp::Atan2 => "ATAN2",
            BinaryOp::Divide => "DIVIDE",
            BinaryOp::Equal => "EQUAL",
            BinaryOp::GreaterThanEqual => "GREATER_THAN_EQUAL",
            BinaryOp::GreaterThan => "GREATER_THAN",
            BinaryOp::LessThanEqual => "LESS_THAN_EQUAL",
            BinaryOp::LessThan => "LESS_THAN",
            BinaryOp::Maximum => "MAXIMUM",
            BinaryOp::Minimum => "MINIMUM",
            BinaryOp::Multiply => "MULTIPLY",
            BinaryOp::NotEqual => "NOT_EQUAL",
            BinaryOp::Power => "POWER",
            BinaryOp::Remainder => "REMAINDER",
            BinaryOp::Subtract => "SUBTRACT",
            BinaryOp::ShiftLeft => "SHIFT_LEFT",
            BinaryOp::ShiftRight => "SHIFT_RIGHT",
            BinaryOp::ShiftRightSignExtend => "SHIFT_RIGHT_SIGN_EXTEND",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        BinaryOp::ALL.iter().copied().find(|op| op.name() == name)
    }

    /// Parses either the bare enumerator or its `popops::expr::BinaryOpType::` path.
    pub fn from_kernel_op(op: &str) -> Option<Self> {
        let op = op.rsplit("::").next().unwrap_or(op);
        BinaryOp::ALL.iter().copied().find(|b| b.kernel_op() == op)
    }

    /// Comparisons produce booleans.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Equal
                | BinaryOp::NotEqual
                | BinaryOp::GreaterThan
                | BinaryOp::GreaterThanEqual
                | BinaryOp::LessThan
                | BinaryOp::LessThanEqual
        )
    }

    pub fn output_type(self, input: IpuType) -> IpuType {
        if self.is_comparison() {
            IpuType::Bool
        } else {
            input
        }
    }

    pub fn kernel_name(self, dtype: IpuType) -> String {
        make_vertex_name_templated(
            "popops::BinaryOp1D",
            &[
                TemplateArg::Name(format!("popops::expr::BinaryOpType::{}", self.kernel_op())),
                dtype.into(),
            ],
        )
    }
}

fn binary_translation(
    op: BinaryOp,
    name: &str,
    tiles: &[TileIndex],
    inavals: &[ShapedArray],
) -> TileResult<TileMapEquation> {
    let [lhs, rhs] = inavals else {
        return Err(TileError::input_arity(name, "2", inavals.len()));
    };
    if lhs != rhs {
        return Err(TileError::shape_mismatch(
            name,
            format!("operands {lhs:?} and {rhs:?} differ"),
        ));
    }
    let outaval = ShapedArray::new(lhs.shape.clone(), op.output_type(lhs.dtype));
    Ok(TileMapEquation::new(name, op.kernel_name(lhs.dtype), tiles.to_vec())
        .with_inputs(vertex_inputs([("in1", lhs.clone()), ("in2", rhs.clone())], &[]))
        .with_outputs(vertex_outputs([("out", outaval)], &[])))
}

/// `A <- A + scaleB * B` (or minus), updated in place.
fn scaled_translation(
    basename: &str,
    name: &str,
    tiles: &[TileIndex],
    inavals: &[ShapedArray],
) -> TileResult<TileMapEquation> {
    let [a, b, scale] = inavals else {
        return Err(TileError::input_arity(name, "3", inavals.len()));
    };
    if a != b {
        return Err(TileError::shape_mismatch(
            name,
            format!("A {a:?} and B {b:?} differ"),
        ));
    }
    if scale.size() != 1 {
        return Err(TileError::shape_mismatch(
            name,
            format!("scaleB must hold a single value, got shape {:?}", scale.shape),
        ));
    }
    let kernel = make_vertex_name_templated(
        &format!("popops::{basename}"),
        &[a.dtype.into(), a.dtype.into(), a.dtype.into(), false.into()],
    );
    let (attrs_u32, attrs_f32) =
        split_vertex_attributes([("size", AttributeValue::U32(a.size() as u32))]);
    Ok(TileMapEquation::new(name, kernel, tiles.to_vec())
        .with_inputs(vertex_inputs(
            [("A", a.clone()), ("B", b.clone()), ("scaleB", scale.clone())],
            &["A"],
        ))
        .with_outputs(vertex_outputs([("A", a.clone())], &["A"]))
        .with_attributes(attrs_u32, attrs_f32))
}

/// Kernel reading the tile cycle counter once `data` is available.
pub const CYCLE_COUNT_KERNEL: &str = "CycleCountBarrier";

/// Passes `data` through and outputs the 64-bit tile cycle count as two u32 words.
fn hw_cycle_count_translation(
    name: &str,
    tiles: &[TileIndex],
    inavals: &[ShapedArray],
    attrs: &TranslationAttributes,
) -> TileResult<TileMapEquation> {
    let [data] = inavals else {
        return Err(TileError::input_arity(name, "1", inavals.len()));
    };
    let sync = match attrs.get("sync") {
        None => 0,
        Some(AttributeValue::U32(value)) => u32::from(*value != 0),
        Some(other) => {
            return Err(TileError::contract(format!(
                "{name}: `sync` must be a u32 flag, got {other:?}"
            )))
        }
    };
    let counter = ShapedArray::new(vec![2], IpuType::UnsignedInt);
    let (attrs_u32, attrs_f32) = split_vertex_attributes([("sync", AttributeValue::U32(sync))]);
    Ok(TileMapEquation::new(
        name,
        make_vertex_name_templated(CYCLE_COUNT_KERNEL, &[data.dtype.into()]),
        tiles.to_vec(),
    )
    .with_inputs(vertex_inputs([("data", data.clone())], &["data"]))
    .with_outputs(vertex_outputs([("data", data.clone()), ("out", counter)], &["data"]))
    .with_attributes(attrs_u32, attrs_f32))
}

fn builtin_translations() -> HashMap<String, TileTranslation> {
    let mut rules: HashMap<String, TileTranslation> = HashMap::new();
    for op in BinaryOp::ALL {
        rules.insert(
            op.name().to_string(),
            translation_rule(move |name, tiles, inavals, _attrs| {
                binary_translation(op, name, tiles, inavals)
            }),
        );
    }
    rules.insert(
        "scaled_add".to_string(),
        translation_rule(|name, tiles, inavals, _attrs| {
            scaled_translation("ScaledAddSupervisor", name, tiles, inavals)
        }),
    );
    rules.insert(
        "scaled_sub".to_string(),
        translation_rule(|name, tiles, inavals, _attrs| {
            scaled_translation("ScaledSubtractSupervisor", name, tiles, inavals)
        }),
    );
    rules.insert(
        "hw_cycle_count".to_string(),
        translation_rule(hw_cycle_count_translation),
    );
    rules
}

static TRANSLATIONS: OnceLock<RwLock<HashMap<String, TileTranslation>>> = OnceLock::new();

fn translations() -> &'static RwLock<HashMap<String, TileTranslation>> {
    TRANSLATIONS.get_or_init(|| RwLock::new(builtin_translations()))
}

/// Registers (or replaces) the translation rule of operation `name`.
pub fn register_tile_translation(name: impl Into<String>, rule: TileTranslation) {
    translations()
        .write()
        .expect("translation registry poisoned")
        .insert(name.into(), rule);
}

pub fn tile_translation(name: &str) -> Option<TileTranslation> {
    translations()
        .read()
        .expect("translation registry poisoned")
        .get(name)
        .cloned()
}

/// Sorted names of every registered translation.
pub fn list_tile_translations() -> Vec<String> {
    let mut names: Vec<String> = translations()
        .read()
        .expect("translation registry poisoned")
        .keys()
        .cloned()
        .collect();
    names.sort();
    names
}

/// Maps operation `name` over the tiles of `inputs`, which must all share one tile list.
pub fn tile_map_primitive(
    graph: &mut Graph,
    seq: &mut Sequence,
    name: &str,
    inputs: &[TileShardedTensor],
    attributes: &TranslationAttributes,
) -> TileResult<Vec<TileShardedTensor>> {
    let Some(first) = inputs.first() else {
        return Err(TileError::input_arity(name, "at least 1", 0));
    };
    let tiles = first.tiles().to_vec();
    if let Some(other) = inputs.iter().find(|input| input.tiles() != tiles.as_slice()) {
        return Err(TileError::shape_mismatch(
            name,
            format!(
                "inputs mapped on different tiles: {:?} and {:?}",
                tiles,
                other.tiles()
            ),
        ));
    }
    let rule = tile_translation(name).ok_or_else(|| TileError::UnknownPrimitive(name.to_string()))?;
    let inavals: Vec<ShapedArray> = inputs.iter().map(TileShardedTensor::tile_aval).collect();
    let equation = rule(name, &tiles, &inavals, attributes)?;

    let tensors: Vec<Tensor> = inputs.iter().map(|input| input.tensor().clone()).collect();
    let outputs = dispatch(
        graph,
        seq,
        TileMapEquationCall::NAME,
        &tensors,
        &equation.to_json_str()?,
        name,
    )?;
    outputs
        .into_iter()
        .map(|tensor| TileShardedTensor::new(tensor, tiles.clone()))
        .collect()
}

/// Reads the cycle counter of every tile of `input` once its data is available.
///
/// Returns `input` unchanged and the `[len(tiles), 2]` u32 counters (low word first).
/// `sync` also synchronizes the tiles before reading.
pub fn tile_hw_cycle_count(
    graph: &mut Graph,
    seq: &mut Sequence,
    input: &TileShardedTensor,
    sync: bool,
) -> TileResult<(TileShardedTensor, TileShardedTensor)> {
    let attributes = TranslationAttributes::from([("sync".to_string(), AttributeValue::U32(sync.into()))]);
    let outputs = tile_map_primitive(graph, seq, "hw_cycle_count", std::slice::from_ref(input), &attributes)?;
    match <[TileShardedTensor; 2]>::try_from(outputs) {
        Ok([data, counter]) => Ok((data, counter)),
        Err(outputs) => Err(TileError::contract(format!(
            "hw_cycle_count returned {} outputs",
            outputs.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_ops_output_bool_kernels() {
        let aval = ShapedArray::new(vec![4], IpuType::Float);
        let eqn = binary_translation(BinaryOp::LessThan, "lt", &[0, 1], &[aval.clone(), aval]).unwrap();
        assert_eq!(
            eqn.kernel_name,
            "popops::BinaryOp1D<popops::expr::BinaryOpType::LESS_THAN,float>"
        );
        assert_eq!(eqn.outputs_info[0].dtype(), IpuType::Bool);
    }

    #[test]
    fn kernel_op_parsing_accepts_full_path() {
        assert_eq!(
            BinaryOp::from_kernel_op("popops::expr::BinaryOpType::SHIFT_RIGHT_SIGN_EXTEND"),
            Some(BinaryOp::ShiftRightSignExtend)
        );
        assert_eq!(BinaryOp::from_kernel_op("ADD"), Some(BinaryOp::Add));
        assert_eq!(BinaryOp::from_name("shift_right_logical"), Some(BinaryOp::ShiftRight));
    }

    #[test]
    fn cycle_count_outputs_two_words_per_tile() {
        let aval = ShapedArray::new(vec![3], IpuType::Half);
        let attrs = TranslationAttributes::from([("sync".to_string(), AttributeValue::U32(5))]);
        let eqn = hw_cycle_count_translation("hw_cycle_count", &[1, 2], &[aval], &attrs).unwrap();
        assert_eq!(eqn.kernel_name, "CycleCountBarrier<half>");
        assert_eq!(eqn.outputs_info[0].iotype, crate::types::VertexIOType::InOut);
        assert_eq!(eqn.outputs_info[1].shape(), &[2]);
        assert_eq!(eqn.outputs_info[1].dtype(), IpuType::UnsignedInt);
        assert_eq!(eqn.attributes_u32[0].value, 1);

        let bad = TranslationAttributes::from([("sync".to_string(), AttributeValue::F32(1.0))]);
        let aval = ShapedArray::new(vec![3], IpuType::Half);
        assert!(hw_cycle_count_translation("hw_cycle_count", &[1], &[aval], &bad).is_err());
    }

    #[test]
    fn scaled_add_requires_scalar_scale() {
        let a = ShapedArray::new(vec![3], IpuType::Half);
        let scale = ShapedArray::new(vec![2], IpuType::Half);
        assert!(matches!(
            scaled_translation("ScaledAddSupervisor", "scaled_add", &[0], &[a.clone(), a, scale]),
            Err(TileError::ShapeMismatch { .. })
        ));
    }
}
