use crate::error::{TileError, TileResult};
use crate::graph::{Graph, Sequence, Tensor};
use crate::primitive::registry::primitive_program;
use crate::primitive::PrimitiveOutput;
use crate::tile::{
    TileDataBarrier, TileDataBarrierParams, TileGather, TileGatherParams, TilePutReplicated,
    TilePutSharded,
};
use crate::types::{JsonCodec, ShapedArray, TileIndex};

/// Tensor whose leading-axis item `i` lives on `tiles[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TileShardedTensor {
    tensor: Tensor,
    tiles: Vec<TileIndex>,
}

impl TileShardedTensor {
    pub fn new(tensor: Tensor, tiles: Vec<TileIndex>) -> TileResult<Self> {
        if tensor.leading_dim() != Some(tiles.len()) {
            return Err(TileError::shape_mismatch(
                "tile_sharded_tensor",
                format!(
                    "shape {:?} is not sharded over {} tiles",
                    tensor.shape(),
                    tiles.len()
                ),
            ));
        }
        Ok(Self { tensor, tiles })
    }

    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    pub fn into_tensor(self) -> Tensor {
        self.tensor
    }

    pub fn tiles(&self) -> &[TileIndex] {
        &self.tiles
    }

    pub fn num_tiles(&self) -> usize {
        self.tiles.len()
    }

    pub fn shape(&self) -> &[usize] {
        self.tensor.shape()
    }

    /// Shaped value of a single per-tile item.
    pub fn tile_aval(&self) -> ShapedArray {
        ShapedArray::new(self.tensor.shape()[1..].to_vec(), self.tensor.element_type())
    }
}

/// Runs a registered primitive, appends its program to `seq` and returns its outputs.
pub(crate) fn dispatch(
    graph: &mut Graph,
    seq: &mut Sequence,
    name: &str,
    inputs: &[Tensor],
    attributes: &str,
    debug_prefix: &str,
) -> TileResult<Vec<Tensor>> {
    let PrimitiveOutput { outputs, program } =
        primitive_program(name, graph, inputs, attributes, debug_prefix)?;
    seq.add(program);
    Ok(outputs)
}

fn single_output(name: &str, outputs: Vec<Tensor>) -> TileResult<Tensor> {
    let got = outputs.len();
    outputs.into_iter().next().filter(|_| got == 1).ok_or_else(|| {
        TileError::contract(format!("{name} returned {got} outputs instead of 1"))
    })
}

/// Shards `tensor` over `tiles` along its leading axis.
pub fn tile_put_sharded(
    graph: &mut Graph,
    seq: &mut Sequence,
    tensor: &Tensor,
    tiles: &[TileIndex],
) -> TileResult<TileShardedTensor> {
    let attributes = serde_json::to_string(tiles)?;
    let outputs = dispatch(
        graph,
        seq,
        TilePutSharded::NAME,
        std::slice::from_ref(tensor),
        &attributes,
        TilePutSharded::NAME,
    )?;
    TileShardedTensor::new(single_output(TilePutSharded::NAME, outputs)?, tiles.to_vec())
}

/// Replicates `tensor` on every tile of `tiles`.
pub fn tile_put_replicated(
    graph: &mut Graph,
    seq: &mut Sequence,
    tensor: &Tensor,
    tiles: &[TileIndex],
) -> TileResult<TileShardedTensor> {
    let attributes = serde_json::to_string(tiles)?;
    let outputs = dispatch(
        graph,
        seq,
        TilePutReplicated::NAME,
        std::slice::from_ref(tensor),
        &attributes,
        TilePutReplicated::NAME,
    )?;
    TileShardedTensor::new(single_output(TilePutReplicated::NAME, outputs)?, tiles.to_vec())
}

/// Output item `k` is input item `indices[k]`, resident on `tiles[k]`.
pub fn tile_gather(
    graph: &mut Graph,
    seq: &mut Sequence,
    input: &TileShardedTensor,
    indices: &[u32],
    tiles: &[TileIndex],
) -> TileResult<TileShardedTensor> {
    let params = TileGatherParams::new(input.tiles.clone(), indices.to_vec(), tiles.to_vec());
    let outputs = dispatch(
        graph,
        seq,
        TileGather::NAME,
        std::slice::from_ref(&input.tensor),
        &params.to_json_str()?,
        TileGather::NAME,
    )?;
    TileShardedTensor::new(single_output(TileGather::NAME, outputs)?, tiles.to_vec())
}

/// Data barrier across `inputs`; returns them unchanged.
pub fn tile_data_barrier(
    graph: &mut Graph,
    seq: &mut Sequence,
    inputs: &[TileShardedTensor],
) -> TileResult<Vec<TileShardedTensor>> {
    let params = TileDataBarrierParams::new(
        TileDataBarrier::DEFAULT_KERNEL,
        inputs.iter().map(|input| input.tiles.clone()).collect(),
    );
    let tensors: Vec<Tensor> = inputs.iter().map(|input| input.tensor.clone()).collect();
    let outputs = dispatch(
        graph,
        seq,
        TileDataBarrier::NAME,
        &tensors,
        &params.to_json_str()?,
        TileDataBarrier::NAME,
    )?;
    outputs
        .into_iter()
        .zip(inputs)
        .map(|(tensor, input)| TileShardedTensor::new(tensor, input.tiles.clone()))
        .collect()
}
