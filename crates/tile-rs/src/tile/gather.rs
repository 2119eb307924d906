use serde::{Deserialize, Serialize};

use crate::error::{TileError, TileResult};
use crate::graph::{Graph, Program, Sequence, Tensor};
use crate::primitive::{PrimitiveMetadata, PrimitiveOutput, TilePrimitive};
use crate::types::{JsonCodec, TileIndex};

/// Parameters of a gather across tiles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TileGatherParams {
    /// Tile of each input item.
    pub previous_tiles: Vec<TileIndex>,
    /// Input item selected for each output item.
    pub indices: Vec<u32>,
    /// Tile of each output item.
    pub tiles: Vec<TileIndex>,
}

impl TileGatherParams {
    pub fn new(previous_tiles: Vec<TileIndex>, indices: Vec<u32>, tiles: Vec<TileIndex>) -> Self {
        Self {
            previous_tiles,
            indices,
            tiles,
        }
    }

    /// Number of output items that need fresh storage and a copy.
    pub fn num_copies(&self) -> usize {
        self.indices
            .iter()
            .zip(&self.tiles)
            .filter(|&(&index, &tile)| self.previous_tiles.get(index as usize) != Some(&tile))
            .count()
    }

    fn validate(&self, graph: &Graph, input: &Tensor) -> TileResult<()> {
        let name = TileGather::NAME;
        let Some(leading) = input.leading_dim() else {
            return Err(TileError::shape_mismatch(name, "cannot gather from a scalar tensor"));
        };
        if leading != self.previous_tiles.len() {
            return Err(TileError::shape_mismatch(
                name,
                format!(
                    "input leading dimension {leading} does not match {} previous tiles",
                    self.previous_tiles.len()
                ),
            ));
        }
        if self.indices.len() != self.tiles.len() {
            return Err(TileError::shape_mismatch(
                name,
                format!(
                    "{} gather indices for {} output tiles",
                    self.indices.len(),
                    self.tiles.len()
                ),
            ));
        }
        for &index in &self.indices {
            if index as usize >= self.previous_tiles.len() {
                return Err(TileError::IndexOutOfRange {
                    primitive: name.to_string(),
                    index: index as usize,
                    len: self.previous_tiles.len(),
                });
            }
        }
        let target = graph.target();
        for &tile in self.previous_tiles.iter().chain(&self.tiles) {
            target.check_tile(tile)?;
        }
        Ok(())
    }
}

impl JsonCodec for TileGatherParams {}

/// Gathers items of a tile-sharded tensor onto new tiles.
///
/// An output item whose source already lives on the requested tile is a view of the source
/// storage; every other item gets a fresh variable on its tile and a copy. Outputs therefore
/// may alias the input and must be treated as read-only by callers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TileGather;

impl TileGather {
    pub const NAME: &'static str = "tile_gather";

    pub fn build(
        graph: &mut Graph,
        inputs: &[Tensor],
        params: &TileGatherParams,
        debug_prefix: &str,
    ) -> TileResult<PrimitiveOutput> {
        let [input] = inputs else {
            return Err(TileError::input_arity(Self::NAME, "1", inputs.len()));
        };
        params.validate(graph, input)?;
        log::debug!(
            "{}: {} items, {} copies",
            Self::NAME,
            params.indices.len(),
            params.num_copies()
        );

        let item_shape = input.shape()[1..].to_vec();
        let mut seq = Sequence::new();
        let mut slices = Vec::with_capacity(params.tiles.len());
        for (&index, &tile) in params.indices.iter().zip(&params.tiles) {
            let index = index as usize;
            let item = input.index(index)?;
            if params.previous_tiles[index] == tile {
                slices.push(item.expand(0)?);
            } else {
                let fresh = graph.add_variable(input.element_type(), &item_shape, debug_prefix);
                graph.set_tile_mapping(&fresh, tile)?;
                seq.add(Program::copy(&item, &fresh)?);
                slices.push(fresh.expand(0)?);
            }
        }
        let output = if slices.is_empty() {
            input.slice(0, 0)?
        } else {
            Tensor::concat(&slices)?
        };
        Ok(PrimitiveOutput::new(vec![output], seq))
    }
}

impl TilePrimitive for TileGather {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn metadata(&self, num_inputs: u32) -> PrimitiveMetadata {
        PrimitiveMetadata::new(num_inputs).elementwise(true)
    }

    fn program(
        &self,
        graph: &mut Graph,
        inputs: &[Tensor],
        attributes: &str,
        debug_prefix: &str,
    ) -> TileResult<PrimitiveOutput> {
        let params = TileGatherParams::from_json_str(attributes)?;
        Self::build(graph, inputs, &params, debug_prefix)
    }
}
