//! Host-facing primitive interface.
//!
//! Every custom operator exposed to the host runtime implements [`TilePrimitive`]: a metadata
//! query used for shape/aliasing/caching decisions, and a program entry point that mutates
//! the graph and returns output tensors with the program fragment to splice into the caller's
//! execution program. Primitives are discovered by name through [`registry`].

pub mod registry;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::TileResult;
use crate::graph::{Graph, Program, Sequence, Tensor};
use crate::types::JsonCodec;

/// Static properties of a primitive reported to the host runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimitiveMetadata {
    pub num_inputs: u32,
    pub is_elementwise: bool,
    pub is_stateless: bool,
    pub is_hashable: bool,
    /// Input index -> output index sharing the same storage.
    #[serde(default)]
    pub input_to_output_tensor_aliasing: BTreeMap<u32, u32>,
    #[serde(default)]
    pub allocating_indices: Vec<u32>,
}

impl PrimitiveMetadata {
    /// Stateless, hashable, non-elementwise primitive without aliasing.
    pub fn new(num_inputs: u32) -> Self {
        Self {
            num_inputs,
            is_elementwise: false,
            is_stateless: true,
            is_hashable: true,
            input_to_output_tensor_aliasing: BTreeMap::new(),
            allocating_indices: Vec::new(),
        }
    }

    pub fn elementwise(mut self, is_elementwise: bool) -> Self {
        self.is_elementwise = is_elementwise;
        self
    }

    pub fn with_aliasing(mut self, input: u32, output: u32) -> Self {
        self.input_to_output_tensor_aliasing.insert(input, output);
        self
    }
}

impl JsonCodec for PrimitiveMetadata {}

/// Result of a primitive program call.
#[derive(Debug, Clone)]
pub struct PrimitiveOutput {
    pub outputs: Vec<Tensor>,
    pub program: Program,
}

impl PrimitiveOutput {
    pub fn new(outputs: Vec<Tensor>, program: impl Into<Program>) -> Self {
        Self {
            outputs,
            program: program.into(),
        }
    }

    /// Output with no program steps.
    pub fn passthrough(outputs: Vec<Tensor>) -> Self {
        Self::new(outputs, Sequence::new())
    }
}

/// Custom operator callable by the host runtime.
pub trait TilePrimitive: Send + Sync {
    /// Registry name of the primitive.
    fn name(&self) -> &'static str;

    fn metadata(&self, num_inputs: u32) -> PrimitiveMetadata;

    /// Builds the primitive program.
    ///
    /// `attributes` is the JSON-serialized parameter blob; `debug_prefix` names the objects
    /// added to the graph.
    fn program(
        &self,
        graph: &mut Graph,
        inputs: &[Tensor],
        attributes: &str,
        debug_prefix: &str,
    ) -> TileResult<PrimitiveOutput>;
}
