//! Host implementations of per-tile kernels, keyed by kernel basename.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, ensure, Result};
use half::f16;
use tile_rs::graph::{Tensor, Vertex, VertexField};
use tile_rs::interpreter::{BinaryOp, CYCLE_COUNT_KERNEL};
use tile_rs::tile::TileDataBarrier;
use tile_rs::types::AttributeValue;
use tile_rs::IpuType;

use crate::memory::{decode_all, encode_all, HostValue, Memory};

/// View of one vertex's fields over engine memory.
pub struct VertexContext<'a> {
    vertex: &'a Vertex,
    memory: &'a mut Memory,
}

impl<'a> VertexContext<'a> {
    pub fn new(vertex: &'a Vertex, memory: &'a mut Memory) -> Self {
        Self { vertex, memory }
    }

    pub fn vertex(&self) -> &Vertex {
        self.vertex
    }

    pub fn tensor(&self, field: &str) -> Result<&'a Tensor> {
        match self.vertex.fields.get(field) {
            Some(VertexField::Tensor(tensor)) => Ok(tensor),
            Some(other) => bail!("field '{field}' of {} is not a tensor: {other:?}", self.vertex.codelet),
            None => bail!("field '{field}' of {} is not connected", self.vertex.codelet),
        }
    }

    pub fn read<T: HostValue>(&self, field: &str) -> Result<Vec<T>> {
        let tensor = self.tensor(field)?;
        self.memory.read(tensor)
    }

    pub fn write<T: HostValue>(&mut self, field: &str, values: &[T]) -> Result<()> {
        let tensor = self.tensor(field)?;
        self.memory.write(tensor, values)
    }

    pub fn read_bytes(&self, field: &str) -> Result<Vec<u8>> {
        self.memory.read_bytes(self.tensor(field)?)
    }

    pub fn write_bytes(&mut self, field: &str, data: &[u8]) -> Result<()> {
        let tensor = self.tensor(field)?;
        self.memory.write_bytes(tensor, data)
    }

    pub fn u32_attr(&self, field: &str) -> Result<u32> {
        match self.vertex.fields.get(field) {
            Some(VertexField::Value(AttributeValue::U32(value))) => Ok(*value),
            other => bail!("field '{field}' is not a u32 attribute: {other:?}"),
        }
    }

    pub fn f32_attr(&self, field: &str) -> Result<f32> {
        match self.vertex.fields.get(field) {
            Some(VertexField::Value(AttributeValue::F32(value))) => Ok(*value),
            other => bail!("field '{field}' is not an f32 attribute: {other:?}"),
        }
    }
}

/// Host kernel. `args` are the template arguments of the vertex kernel name.
pub trait Codelet: Send + Sync {
    fn execute(&self, ctx: &mut VertexContext<'_>, args: &[String]) -> Result<()>;
}

fn template_type(args: &[String], index: usize) -> Result<IpuType> {
    let name = args
        .get(index)
        .ok_or_else(|| anyhow!("missing template argument {index} in {args:?}"))?;
    IpuType::from_template_name(name).ok_or_else(|| anyhow!("unknown element type '{name}'"))
}

trait BinaryArith: HostValue {
    fn apply(op: BinaryOp, a: Self, b: Self) -> Result<Self>;
}

impl BinaryArith for f32 {
    fn apply(op: BinaryOp, a: f32, b: f32) -> Result<f32> {
        Ok(match op {
            BinaryOp::Add => a + b,
            BinaryOp::Subtract => a - b,
            BinaryOp::Multiply => a * b,
            BinaryOp::Divide => a / b,
            BinaryOp::Maximum => a.max(b),
            BinaryOp::Minimum => a.min(b),
            BinaryOp::Power => a.powf(b),
            BinaryOp::Remainder => a % b,
            BinaryOp::Atan2 => a.atan2(b),
            other => bail!("{other:?} is not supported on floating point values"),
        })
    }
}

impl BinaryArith for f16 {
    fn apply(op: BinaryOp, a: f16, b: f16) -> Result<f16> {
        f32::apply(op, a.to_f32(), b.to_f32()).map(f16::from_f32)
    }
}

impl BinaryArith for i32 {
    fn apply(op: BinaryOp, a: i32, b: i32) -> Result<i32> {
        Ok(match op {
            BinaryOp::Add => a.wrapping_add(b),
            BinaryOp::Subtract => a.wrapping_sub(b),
            BinaryOp::Multiply => a.wrapping_mul(b),
            BinaryOp::Divide => a.checked_div(b).ok_or_else(|| anyhow!("integer division by zero"))?,
            BinaryOp::Remainder => a.checked_rem(b).ok_or_else(|| anyhow!("integer remainder by zero"))?,
            BinaryOp::Maximum => a.max(b),
            BinaryOp::Minimum => a.min(b),
            BinaryOp::Power => {
                let exp = u32::try_from(b).map_err(|_| anyhow!("negative integer exponent {b}"))?;
                a.wrapping_pow(exp)
            }
            BinaryOp::ShiftLeft => a.wrapping_shl(b as u32),
            BinaryOp::ShiftRight => ((a as u32).wrapping_shr(b as u32)) as i32,
            BinaryOp::ShiftRightSignExtend => a.wrapping_shr(b as u32),
            other => bail!("{other:?} is not supported on int values"),
        })
    }
}

impl BinaryArith for u32 {
    fn apply(op: BinaryOp, a: u32, b: u32) -> Result<u32> {
        Ok(match op {
            BinaryOp::Add => a.wrapping_add(b),
            BinaryOp::Subtract => a.wrapping_sub(b),
            BinaryOp::Multiply => a.wrapping_mul(b),
            BinaryOp::Divide => a.checked_div(b).ok_or_else(|| anyhow!("integer division by zero"))?,
            BinaryOp::Remainder => a.checked_rem(b).ok_or_else(|| anyhow!("integer remainder by zero"))?,
            BinaryOp::Maximum => a.max(b),
            BinaryOp::Minimum => a.min(b),
            BinaryOp::Power => a.wrapping_pow(b),
            BinaryOp::ShiftLeft => a.wrapping_shl(b),
            BinaryOp::ShiftRight => a.wrapping_shr(b),
            BinaryOp::ShiftRightSignExtend => ((a as i32).wrapping_shr(b)) as u32,
            other => bail!("{other:?} is not supported on unsigned int values"),
        })
    }
}

fn compare<T: PartialOrd>(op: BinaryOp, a: T, b: T) -> Result<bool> {
    Ok(match op {
        BinaryOp::Equal => a == b,
        BinaryOp::NotEqual => a != b,
        BinaryOp::GreaterThan => a > b,
        BinaryOp::GreaterThanEqual => a >= b,
        BinaryOp::LessThan => a < b,
        BinaryOp::LessThanEqual => a <= b,
        other => bail!("{other:?} is not a comparison"),
    })
}

fn binary_typed<T: BinaryArith>(ctx: &mut VertexContext<'_>, op: BinaryOp) -> Result<()> {
    let lhs = decode_all::<T>(&ctx.read_bytes("in1")?);
    let rhs = decode_all::<T>(&ctx.read_bytes("in2")?);
    ensure!(
        lhs.len() == rhs.len(),
        "operand sizes differ: {} vs {}",
        lhs.len(),
        rhs.len()
    );
    if op.is_comparison() {
        let out = lhs
            .iter()
            .zip(&rhs)
            .map(|(&a, &b)| compare(op, a, b).map(u8::from))
            .collect::<Result<Vec<u8>>>()?;
        ctx.write_bytes("out", &out)
    } else {
        let out = lhs
            .iter()
            .zip(&rhs)
            .map(|(&a, &b)| T::apply(op, a, b))
            .collect::<Result<Vec<T>>>()?;
        ctx.write_bytes("out", &encode_all(&out))
    }
}

/// `popops::BinaryOp1D<OP, T>`: `out = in1 OP in2`.
pub struct BinaryOp1D;

impl Codelet for BinaryOp1D {
    fn execute(&self, ctx: &mut VertexContext<'_>, args: &[String]) -> Result<()> {
        let op_name = args
            .first()
            .ok_or_else(|| anyhow!("BinaryOp1D without operation argument"))?;
        let op = BinaryOp::from_kernel_op(op_name)
            .ok_or_else(|| anyhow!("unknown binary operation '{op_name}'"))?;
        match template_type(args, 1)? {
            IpuType::Float => binary_typed::<f32>(ctx, op),
            IpuType::Half => binary_typed::<f16>(ctx, op),
            IpuType::Int => binary_typed::<i32>(ctx, op),
            IpuType::UnsignedInt => binary_typed::<u32>(ctx, op),
            other => bail!("BinaryOp1D does not support {other}"),
        }
    }
}

/// `popops::ScaledAddSupervisor<T,T,T,false>` (or the subtracting variant): `A += sign * scaleB * B`.
pub struct ScaledUpdate {
    sign: f32,
}

impl ScaledUpdate {
    pub fn add() -> Self {
        Self { sign: 1.0 }
    }

    pub fn subtract() -> Self {
        Self { sign: -1.0 }
    }

    fn run<T: HostValue>(
        &self,
        ctx: &mut VertexContext<'_>,
        to_f32: fn(T) -> f32,
        from_f32: fn(f32) -> T,
    ) -> Result<()> {
        let size = ctx.u32_attr("size")? as usize;
        let a: Vec<T> = ctx.read("A")?;
        let b: Vec<T> = ctx.read("B")?;
        let scale: Vec<T> = ctx.read("scaleB")?;
        ensure!(
            a.len() == size && b.len() == size,
            "scaled update of size {size} over A[{}] and B[{}]",
            a.len(),
            b.len()
        );
        let scale = to_f32(*scale.first().ok_or_else(|| anyhow!("empty scaleB"))?) * self.sign;
        let out: Vec<T> = a
            .iter()
            .zip(&b)
            .map(|(&x, &y)| from_f32(to_f32(x) + scale * to_f32(y)))
            .collect();
        ctx.write("A", &out)
    }
}

impl Codelet for ScaledUpdate {
    fn execute(&self, ctx: &mut VertexContext<'_>, args: &[String]) -> Result<()> {
        match template_type(args, 0)? {
            IpuType::Float => self.run::<f32>(ctx, |v| v, |v| v),
            IpuType::Half => self.run::<f16>(ctx, f16::to_f32, f16::from_f32),
            other => bail!("scaled update does not support {other}"),
        }
    }
}

/// Data barrier kernel: touches nothing.
pub struct DataBarrier;

impl Codelet for DataBarrier {
    fn execute(&self, ctx: &mut VertexContext<'_>, _args: &[String]) -> Result<()> {
        match ctx.vertex().fields.get("data") {
            Some(VertexField::Vector(_)) => Ok(()),
            other => bail!("barrier vertex without data vector: {other:?}"),
        }
    }
}

/// Cycle counter read: the host has no clock, so both words are zero.
pub struct CycleCountBarrier;

impl Codelet for CycleCountBarrier {
    fn execute(&self, ctx: &mut VertexContext<'_>, _args: &[String]) -> Result<()> {
        ctx.tensor("data")?;
        ctx.u32_attr("sync")?;
        let words: Vec<u32> = ctx.read("out")?;
        ensure!(words.len() == 2, "cycle counter of {} words", words.len());
        ctx.write("out", &[0u32, 0])
    }
}

/// Basename -> host kernel table.
#[derive(Clone, Default)]
pub struct CodeletRegistry {
    codelets: HashMap<String, Arc<dyn Codelet>>,
}

impl CodeletRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("popops::BinaryOp1D", Arc::new(BinaryOp1D));
        registry.register("popops::ScaledAddSupervisor", Arc::new(ScaledUpdate::add()));
        registry.register(
            "popops::ScaledSubtractSupervisor",
            Arc::new(ScaledUpdate::subtract()),
        );
        registry.register(TileDataBarrier::DEFAULT_KERNEL, Arc::new(DataBarrier));
        registry.register(CYCLE_COUNT_KERNEL, Arc::new(CycleCountBarrier));
        registry
    }

    pub fn register(&mut self, basename: impl Into<String>, codelet: Arc<dyn Codelet>) {
        self.codelets.insert(basename.into(), codelet);
    }

    pub fn get(&self, basename: &str) -> Option<Arc<dyn Codelet>> {
        self.codelets.get(basename).cloned()
    }
}
