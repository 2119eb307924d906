pub mod env;
pub mod error;
pub mod graph;
pub mod interpreter;
pub mod primitive;
pub mod tile;
pub mod types;

pub use error::{TileError, TileResult};
pub use graph::{Graph, Program, Sequence, Target, Tensor};
pub use primitive::{PrimitiveMetadata, PrimitiveOutput, TilePrimitive};
pub use tile::{TileDataBarrierParams, TileGatherParams, TileMapEquation};
pub use types::{
    vertex_inputs, vertex_outputs, ConstantData, IpuType, JsonCodec, ShapedArray, TileIndex,
    VertexAttributeF32, VertexAttributeU32, VertexIOInfo, VertexIOType,
};
