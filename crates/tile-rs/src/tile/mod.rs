//! Tile placement primitives and the tile-mapped equation.
//!
//! Placement primitives (`put`, `gather`, `barrier`) are built directly on the graph API.
//! [`TileMapEquation`] instantiates one kernel per tile from a declarative description.

mod barrier;
mod equation;
mod gather;
mod put;

pub use barrier::{barrier_reinterpret_type, TileDataBarrier, TileDataBarrierParams};
pub use equation::{TileMapEquation, TileMapEquationCall};
pub use gather::{TileGather, TileGatherParams};
pub use put::{TilePutReplicated, TilePutSharded};

use crate::error::TileResult;
use crate::graph::{Graph, Tensor};
use crate::types::{IpuType, TileIndex};

/// Allocates `[tiles.len(), *item_shape]` with item `i` resident on `tiles[i]`.
///
/// Every tile is checked before the variable is added, so an invalid tile leaves the graph
/// untouched.
pub fn create_sharded_variable(
    graph: &mut Graph,
    dtype: IpuType,
    item_shape: &[usize],
    tiles: &[TileIndex],
    debug_name: &str,
) -> TileResult<Tensor> {
    let target = graph.target();
    for &tile in tiles {
        target.check_tile(tile)?;
    }
    let mut shape = Vec::with_capacity(item_shape.len() + 1);
    shape.push(tiles.len());
    shape.extend_from_slice(item_shape);
    let tensor = graph.add_variable(dtype, &shape, debug_name);
    for (idx, &tile) in tiles.iter().enumerate() {
        graph.set_tile_mapping(&tensor.index(idx)?, tile)?;
    }
    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TileError;
    use crate::graph::Target;

    #[test]
    fn sharded_variable_maps_items_in_order() {
        let mut graph = Graph::new(Target::new(8));
        let t = create_sharded_variable(&mut graph, IpuType::Half, &[2], &[3, 0, 3], "v").unwrap();
        assert_eq!(t.shape(), &[3, 2]);
        assert_eq!(
            graph.tile_mapping(&t).unwrap(),
            vec![Some(3), Some(3), Some(0), Some(0), Some(3), Some(3)]
        );
    }

    #[test]
    fn invalid_tile_allocates_nothing() {
        let mut graph = Graph::new(Target::new(4));
        let err = create_sharded_variable(&mut graph, IpuType::Float, &[], &[1, 9], "v");
        assert!(matches!(err, Err(TileError::InvalidTile { tile: 9, .. })));
        assert_eq!(graph.stats().variables, 0);
    }
}
