use crate::error::{TileError, TileResult};
use crate::graph::{Graph, Program, Tensor};
use crate::primitive::{PrimitiveMetadata, PrimitiveOutput, TilePrimitive};
use crate::types::TileIndex;

use super::create_sharded_variable;

/// Tile list passed as a bare JSON array.
fn parse_tiles(attributes: &str) -> TileResult<Vec<TileIndex>> {
    Ok(serde_json::from_str(attributes)?)
}

fn single_input<'a>(primitive: &str, inputs: &'a [Tensor]) -> TileResult<&'a Tensor> {
    match inputs {
        [input] => Ok(input),
        _ => Err(TileError::input_arity(primitive, "1", inputs.len())),
    }
}

/// Shards a tensor over tiles along its leading axis.
#[derive(Debug, Clone, Copy, Default)]
pub struct TilePutSharded;

impl TilePutSharded {
    pub const NAME: &'static str = "tile_put_sharded";

    pub fn build(
        graph: &mut Graph,
        inputs: &[Tensor],
        tiles: &[TileIndex],
        debug_prefix: &str,
    ) -> TileResult<PrimitiveOutput> {
        let input = single_input(Self::NAME, inputs)?;
        let Some(leading) = input.leading_dim() else {
            return Err(TileError::shape_mismatch(
                Self::NAME,
                "cannot shard a scalar tensor",
            ));
        };
        if leading != tiles.len() {
            return Err(TileError::shape_mismatch(
                Self::NAME,
                format!(
                    "inconsistent input size {leading} and tiles length {}",
                    tiles.len()
                ),
            ));
        }
        log::debug!("{}: {:?} over {} tiles", Self::NAME, input.shape(), tiles.len());
        let output = create_sharded_variable(
            graph,
            input.element_type(),
            &input.shape()[1..],
            tiles,
            debug_prefix,
        )?;
        let copy = Program::copy(input, &output)?;
        Ok(PrimitiveOutput::new(vec![output], copy))
    }
}

impl TilePrimitive for TilePutSharded {
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
        let tiles = parse_tiles(attributes)?;
        Self::build(graph, inputs, &tiles, debug_prefix)
    }
}

/// Replicates a tensor on every listed tile, stacking copies on a new leading axis.
#[derive(Debug, Clone, Copy, Default)]
pub struct TilePutReplicated;

impl TilePutReplicated {
    pub const NAME: &'static str = "tile_put_replicated";

    pub fn build(
        graph: &mut Graph,
        inputs: &[Tensor],
        tiles: &[TileIndex],
        debug_prefix: &str,
    ) -> TileResult<PrimitiveOutput> {
        let input = single_input(Self::NAME, inputs)?;
        log::debug!("{}: {:?} on tiles {:?}", Self::NAME, input.shape(), tiles);
        // Broadcast view: replication allocates nothing until the output copy.
        let broadcasted = input.expand(0)?.broadcast(tiles.len(), 0)?;
        let output = create_sharded_variable(
            graph,
            input.element_type(),
            input.shape(),
            tiles,
            debug_prefix,
        )?;
        let copy = Program::copy(&broadcasted, &output)?;
        Ok(PrimitiveOutput::new(vec![output], copy))
    }
}

impl TilePrimitive for TilePutReplicated {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn metadata(&self, num_inputs: u32) -> PrimitiveMetadata {
        PrimitiveMetadata::new(num_inputs)
    }

    fn program(
        &self,
        graph: &mut Graph,
        inputs: &[Tensor],
        attributes: &str,
        debug_prefix: &str,
    ) -> TileResult<PrimitiveOutput> {
        let tiles = parse_tiles(attributes)?;
        Self::build(graph, inputs, &tiles, debug_prefix)
    }
}
