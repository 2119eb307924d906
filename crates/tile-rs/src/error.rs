//! Error taxonomy shared by every primitive and the graph model.

use thiserror::Error;

use crate::types::{IpuType, TileIndex};

/// Failure raised while building a tile-mapped program.
///
/// Every variant aborts the current construction call. Nothing is retried internally, and
/// the graph may hold partially added objects when the failure happens after validation.
#[derive(Debug, Error)]
pub enum TileError {
    #[error("{primitive}: expected {expected} input tensor(s), got {got}")]
    InputArity {
        primitive: String,
        expected: &'static str,
        got: usize,
    },
    #[error("{primitive}: shape mismatch: {detail}")]
    ShapeMismatch { primitive: String, detail: String },
    #[error("{primitive}: in/out tensor '{name}' does not name any input")]
    NameResolution { primitive: String, name: String },
    #[error("{primitive}: unsupported element type {dtype:?}")]
    UnsupportedType { primitive: String, dtype: IpuType },
    #[error("contract violation: {0}")]
    ContractViolation(String),
    #[error("design error: {0}")]
    Design(String),
    #[error("tile {tile} is out of range for a target with {num_tiles} tiles")]
    InvalidTile { tile: TileIndex, num_tiles: u32 },
    #[error("{primitive}: index {index} out of range for length {len}")]
    IndexOutOfRange {
        primitive: String,
        index: usize,
        len: usize,
    },
    #[error("invalid tensor view: {0}")]
    InvalidView(String),
    #[error("unknown primitive '{0}'")]
    UnknownPrimitive(String),
    #[error("invalid primitive parameters: {0}")]
    InvalidParams(#[from] serde_json::Error),
}

impl TileError {
    pub fn input_arity(primitive: impl Into<String>, expected: &'static str, got: usize) -> Self {
        TileError::InputArity {
            primitive: primitive.into(),
            expected,
            got,
        }
    }

    pub fn shape_mismatch(primitive: impl Into<String>, detail: impl Into<String>) -> Self {
        TileError::ShapeMismatch {
            primitive: primitive.into(),
            detail: detail.into(),
        }
    }

    pub fn contract(message: impl Into<String>) -> Self {
        TileError::ContractViolation(message.into())
    }

    pub fn design(message: impl Into<String>) -> Self {
        TileError::Design(message.into())
    }

    pub fn invalid_view(message: impl Into<String>) -> Self {
        TileError::InvalidView(message.into())
    }
}

/// Convenience alias for results returned by graph construction routines.
pub type TileResult<T> = Result<T, TileError>;
