use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::env;
use crate::error::{TileError, TileResult};
use crate::graph::{Graph, Program, Sequence, Tensor};
use crate::primitive::{PrimitiveMetadata, PrimitiveOutput, TilePrimitive};
use crate::types::{IpuType, JsonCodec, TileIndex};

/// Parameters of a data barrier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TileDataBarrierParams {
    /// Barrier kernel instantiated on each tile.
    #[serde(alias = "vname")]
    pub kernel_name: String,
    /// Tile of each leading-axis item, per input.
    pub inputs_tiles: Vec<Vec<TileIndex>>,
    /// Largest tile index used by any input.
    pub max_tile: TileIndex,
}

impl TileDataBarrierParams {
    pub fn new(kernel_name: impl Into<String>, inputs_tiles: Vec<Vec<TileIndex>>) -> Self {
        let max_tile = inputs_tiles.iter().flatten().copied().max().unwrap_or(0);
        Self {
            kernel_name: kernel_name.into(),
            inputs_tiles,
            max_tile,
        }
    }
}

impl JsonCodec for TileDataBarrierParams {}

/// Same-width unsigned type a tensor is viewed as inside the barrier kernel.
pub fn barrier_reinterpret_type(dtype: IpuType) -> TileResult<IpuType> {
    match dtype.bitwidth() {
        8 => Ok(IpuType::UnsignedChar),
        16 => Ok(IpuType::UnsignedShort),
        32 => Ok(IpuType::UnsignedInt),
        _ => Err(TileError::UnsupportedType {
            primitive: TileDataBarrier::NAME.to_string(),
            dtype,
        }),
    }
}

/// Forces a joint scheduling point across tile-sharded tensors.
///
/// One barrier vertex per non-empty tile, all in a single compute set. Outputs are the inputs
/// themselves (zero-copy), which the metadata declares as identity aliasing.
#[derive(Debug, Clone, Copy, Default)]
pub struct TileDataBarrier;

impl TileDataBarrier {
    pub const NAME: &'static str = "tile_data_barrier";
    /// Barrier kernel used when the caller does not provide one.
    pub const DEFAULT_KERNEL: &'static str = "TileDataBarrierVertex";

    pub fn build(
        graph: &mut Graph,
        inputs: &[Tensor],
        params: &TileDataBarrierParams,
        debug_prefix: &str,
    ) -> TileResult<PrimitiveOutput> {
        if inputs.is_empty() {
            return Err(TileError::input_arity(Self::NAME, "at least 1", 0));
        }
        if params.inputs_tiles.len() != inputs.len() {
            return Err(TileError::shape_mismatch(
                Self::NAME,
                format!(
                    "{} tile lists for {} inputs",
                    params.inputs_tiles.len(),
                    inputs.len()
                ),
            ));
        }
        let target = graph.target();

        let mut per_tile: BTreeMap<TileIndex, Vec<Tensor>> = BTreeMap::new();
        for (idx, (input, tiles)) in inputs.iter().zip(&params.inputs_tiles).enumerate() {
            if input.leading_dim() != Some(tiles.len()) {
                return Err(TileError::shape_mismatch(
                    Self::NAME,
                    format!(
                        "input {idx} of shape {:?} has {} tiles",
                        input.shape(),
                        tiles.len()
                    ),
                ));
            }
            let reinterpreted = input.reinterpret(barrier_reinterpret_type(input.element_type())?)?;
            for (k, &tile) in tiles.iter().enumerate() {
                if tile > params.max_tile {
                    return Err(TileError::InvalidTile {
                        tile,
                        num_tiles: params.max_tile.saturating_add(1),
                    });
                }
                target.check_tile(tile)?;
                per_tile.entry(tile).or_default().push(reinterpreted.index(k)?);
            }
        }

        let perf_estimate = env::barrier_perf_estimate();
        let cs = graph.add_compute_set(debug_prefix);
        for (tile, tensors) in per_tile {
            let vertex = graph.add_vertex(cs, &params.kernel_name)?;
            graph.set_vertex_tile(vertex, tile)?;
            graph.set_perf_estimate(vertex, perf_estimate)?;
            log::trace!("barrier vertex on tile {tile}: {} items", tensors.len());
            graph.connect_vector(vertex, "data", tensors)?;
        }
        log::debug!(
            "{}: {} inputs, {} vertices",
            Self::NAME,
            inputs.len(),
            graph.compute_set(cs).map_or(0, |c| c.vertices.len())
        );

        let mut seq = Sequence::new();
        seq.add(Program::execute(cs, debug_prefix));
        Ok(PrimitiveOutput::new(inputs.to_vec(), seq))
    }
}

impl TilePrimitive for TileDataBarrier {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn metadata(&self, num_inputs: u32) -> PrimitiveMetadata {
        (0..num_inputs).fold(PrimitiveMetadata::new(num_inputs), |meta, idx| {
            meta.with_aliasing(idx, idx)
        })
    }

    fn program(
        &self,
        graph: &mut Graph,
        inputs: &[Tensor],
        attributes: &str,
        debug_prefix: &str,
    ) -> TileResult<PrimitiveOutput> {
        let params = TileDataBarrierParams::from_json_str(attributes)?;
        Self::build(graph, inputs, &params, debug_prefix)
    }
}
