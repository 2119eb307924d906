//! High-level tile programming layer.
//!
//! Works on [`TileShardedTensor`]s and routes every call through the JSON parameter boundary
//! and the primitive registry, exactly as a host runtime would.

mod sharded;
mod translation;
mod vertex_name;

pub use sharded::{
    tile_data_barrier, tile_gather, tile_put_replicated, tile_put_sharded, TileShardedTensor,
};
pub use translation::{
    list_tile_translations, register_tile_translation, tile_hw_cycle_count, tile_map_primitive,
    tile_translation, translation_rule, BinaryOp, TileTranslation, TranslationAttributes,
    CYCLE_COUNT_KERNEL,
};
pub use vertex_name::{make_vertex_name_templated, parse_vertex_name, TemplateArg};
