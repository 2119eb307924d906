//! Host reference engine for tile-rs graphs.
//!
//! Holds one byte buffer per graph variable, runs copies and compute sets in program order and
//! dispatches each vertex to a host [`Codelet`] chosen by kernel basename. Vertices may only
//! touch tensors resident on their own tile.

pub mod codelet;
pub mod engine;
pub mod memory;

pub use codelet::{Codelet, CodeletRegistry, VertexContext};
pub use engine::{EngineStats, HostEngine};
pub use memory::{HostValue, Memory};
