//! In-memory model of the mutable hardware graph.
//!
//! The graph owns variables (storage with a per-element tile mapping), compute sets and the
//! vertices inside them. It is exclusively borrowed by one program build at a time; all
//! placement primitives and tile-mapped equations mutate it through `&mut Graph`.
//!
//! ```text
//! Graph
//!   +-- Target (tile count)
//!   +-- variables[VariableId]   dtype, shape, tile mapping per element
//!   +-- compute_sets[ComputeSetId] -> vertices
//!   +-- vertices[VertexId]      codelet, tile, fields, perf estimate
//!   +-- codelets                external kernel sources
//! ```

mod program;
mod tensor;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use program::{Program, Sequence};
pub use tensor::{Interval, Tensor, VariableId};

use crate::env;
use crate::error::{TileError, TileResult};
use crate::types::{AttributeValue, IpuType, TileIndex};

/// Accelerator description the graph is built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub num_tiles: u32,
}

impl Target {
    pub fn new(num_tiles: u32) -> Self {
        Self { num_tiles }
    }

    /// Target sized by `TILE_RS_NUM_TILES`, defaulting to a full IPU.
    pub fn from_env() -> Self {
        Self::new(env::num_tiles())
    }

    pub fn check_tile(&self, tile: TileIndex) -> TileResult<()> {
        if tile < self.num_tiles {
            Ok(())
        } else {
            Err(TileError::InvalidTile {
                tile,
                num_tiles: self.num_tiles,
            })
        }
    }
}

impl Default for Target {
    fn default() -> Self {
        Self::from_env()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComputeSetId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(pub u32);

/// Storage allocated by [`Graph::add_variable`].
#[derive(Debug, Clone)]
pub struct Variable {
    pub id: VariableId,
    pub dtype: IpuType,
    pub shape: Vec<usize>,
    pub debug_name: String,
    tile_mapping: Vec<Option<TileIndex>>,
    initial_data: Option<Vec<u8>>,
}

impl Variable {
    pub fn num_elements(&self) -> usize {
        self.tile_mapping.len()
    }

    pub fn tile_mapping(&self) -> &[Option<TileIndex>] {
        &self.tile_mapping
    }

    /// Little-endian contents of a constant, `None` for plain variables.
    pub fn initial_data(&self) -> Option<&[u8]> {
        self.initial_data.as_deref()
    }
}

#[derive(Debug, Clone)]
pub struct ComputeSet {
    pub id: ComputeSetId,
    pub debug_name: String,
    pub vertices: Vec<VertexId>,
}

/// Value bound to a named vertex field.
#[derive(Debug, Clone, PartialEq)]
pub enum VertexField {
    Tensor(Tensor),
    Vector(Vec<Tensor>),
    Value(AttributeValue),
}

#[derive(Debug, Clone)]
pub struct Vertex {
    pub id: VertexId,
    pub codelet: String,
    pub compute_set: ComputeSetId,
    pub tile: Option<TileIndex>,
    pub perf_estimate: Option<u64>,
    pub fields: BTreeMap<String, VertexField>,
}

impl Vertex {
    pub fn field(&self, name: &str) -> Option<&VertexField> {
        self.fields.get(name)
    }
}

/// Object counts, used to check whether a call mutated the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GraphStats {
    pub variables: usize,
    pub vertices: usize,
    pub compute_sets: usize,
    pub codelets: usize,
}

#[derive(Debug, Clone)]
pub struct Graph {
    target: Target,
    variables: Vec<Variable>,
    compute_sets: Vec<ComputeSet>,
    vertices: Vec<Vertex>,
    codelets: Vec<String>,
}

impl Graph {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            variables: Vec::new(),
            compute_sets: Vec::new(),
            vertices: Vec::new(),
            codelets: Vec::new(),
        }
    }

    pub fn target(&self) -> Target {
        self.target
    }

    pub fn num_tiles(&self) -> u32 {
        self.target.num_tiles
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            variables: self.variables.len(),
            vertices: self.vertices.len(),
            compute_sets: self.compute_sets.len(),
            codelets: self.codelets.len(),
        }
    }

    /// Allocates fresh, unmapped storage.
    pub fn add_variable(&mut self, dtype: IpuType, shape: &[usize], debug_name: &str) -> Tensor {
        let id = VariableId(self.variables.len() as u32);
        let count: usize = shape.iter().product();
        log::trace!("add variable {id:?} {debug_name}: {dtype:?} {shape:?}");
        self.variables.push(Variable {
            id,
            dtype,
            shape: shape.to_vec(),
            debug_name: debug_name.to_string(),
            tile_mapping: vec![None; count],
            initial_data: None,
        });
        Tensor::from_variable(id, dtype, shape.to_vec())
    }

    /// Allocates unmapped storage initialized with `data`, the little-endian bytes of the array.
    pub fn add_constant(
        &mut self,
        dtype: IpuType,
        shape: &[usize],
        data: &[u8],
        debug_name: &str,
    ) -> TileResult<Tensor> {
        let count: usize = shape.iter().product();
        let expected = count * dtype.size_in_bytes();
        if data.len() != expected {
            return Err(TileError::contract(format!(
                "constant '{debug_name}' holds {} bytes, {dtype:?} {shape:?} needs {expected}",
                data.len()
            )));
        }
        let id = VariableId(self.variables.len() as u32);
        let tensor = self.add_variable(dtype, shape, debug_name);
        self.variable_mut(id)?.initial_data = Some(data.to_vec());
        Ok(tensor)
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, id: VariableId) -> Option<&Variable> {
        self.variables.get(id.0 as usize)
    }

    fn variable_mut(&mut self, id: VariableId) -> TileResult<&mut Variable> {
        self.variables
            .get_mut(id.0 as usize)
            .ok_or_else(|| TileError::invalid_view(format!("unknown variable {id:?}")))
    }

    /// Maps every element of `tensor` onto `tile`.
    pub fn set_tile_mapping(&mut self, tensor: &Tensor, tile: TileIndex) -> TileResult<()> {
        self.target.check_tile(tile)?;
        for iv in tensor.intervals() {
            let variable = self.variable_mut(iv.variable)?;
            for slot in &mut variable.tile_mapping[iv.begin..iv.end] {
                *slot = Some(tile);
            }
        }
        Ok(())
    }

    /// Tile of each element of `tensor`, in row-major order.
    pub fn tile_mapping(&self, tensor: &Tensor) -> TileResult<Vec<Option<TileIndex>>> {
        let mut mapping = Vec::with_capacity(tensor.num_elements());
        for iv in tensor.intervals() {
            let variable = self
                .variable(iv.variable)
                .ok_or_else(|| TileError::invalid_view(format!("unknown variable {:?}", iv.variable)))?;
            mapping.extend_from_slice(&variable.tile_mapping[iv.begin..iv.end]);
        }
        Ok(mapping)
    }

    /// Single tile holding every element of `tensor`, if there is one.
    pub fn tile_of(&self, tensor: &Tensor) -> TileResult<Option<TileIndex>> {
        let mapping = self.tile_mapping(tensor)?;
        let Some(first) = mapping.first().copied().flatten() else {
            return Ok(None);
        };
        if mapping.iter().all(|tile| *tile == Some(first)) {
            Ok(Some(first))
        } else {
            Ok(None)
        }
    }

    pub fn add_compute_set(&mut self, debug_name: &str) -> ComputeSetId {
        let id = ComputeSetId(self.compute_sets.len() as u32);
        self.compute_sets.push(ComputeSet {
            id,
            debug_name: debug_name.to_string(),
            vertices: Vec::new(),
        });
        id
    }

    pub fn compute_sets(&self) -> &[ComputeSet] {
        &self.compute_sets
    }

    pub fn compute_set(&self, id: ComputeSetId) -> Option<&ComputeSet> {
        self.compute_sets.get(id.0 as usize)
    }

    pub fn add_vertex(&mut self, compute_set: ComputeSetId, codelet: &str) -> TileResult<VertexId> {
        let id = VertexId(self.vertices.len() as u32);
        let cs = self
            .compute_sets
            .get_mut(compute_set.0 as usize)
            .ok_or_else(|| TileError::design(format!("unknown compute set {compute_set:?}")))?;
        cs.vertices.push(id);
        self.vertices.push(Vertex {
            id,
            codelet: codelet.to_string(),
            compute_set,
            tile: None,
            perf_estimate: None,
            fields: BTreeMap::new(),
        });
        Ok(id)
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn vertex(&self, id: VertexId) -> Option<&Vertex> {
        self.vertices.get(id.0 as usize)
    }

    fn vertex_mut(&mut self, id: VertexId) -> TileResult<&mut Vertex> {
        self.vertices
            .get_mut(id.0 as usize)
            .ok_or_else(|| TileError::design(format!("unknown vertex {id:?}")))
    }

    pub fn set_vertex_tile(&mut self, vertex: VertexId, tile: TileIndex) -> TileResult<()> {
        self.target.check_tile(tile)?;
        self.vertex_mut(vertex)?.tile = Some(tile);
        Ok(())
    }

    pub fn set_perf_estimate(&mut self, vertex: VertexId, cycles: u64) -> TileResult<()> {
        self.vertex_mut(vertex)?.perf_estimate = Some(cycles);
        Ok(())
    }

    fn bind_field(&mut self, vertex: VertexId, field: &str, value: VertexField) -> TileResult<()> {
        let v = self.vertex_mut(vertex)?;
        if v.fields.contains_key(field) {
            return Err(TileError::design(format!(
                "field '{field}' of vertex {} ({vertex:?}) is already connected",
                v.codelet
            )));
        }
        v.fields.insert(field.to_string(), value);
        Ok(())
    }

    fn check_known(&self, tensor: &Tensor) -> TileResult<()> {
        for id in tensor.variables() {
            if self.variable(id).is_none() {
                return Err(TileError::invalid_view(format!("unknown variable {id:?}")));
            }
        }
        Ok(())
    }

    pub fn connect(&mut self, vertex: VertexId, field: &str, tensor: &Tensor) -> TileResult<()> {
        self.check_known(tensor)?;
        self.bind_field(vertex, field, VertexField::Tensor(tensor.clone()))
    }

    /// Connects a variable-length list of tensors to a vector field.
    pub fn connect_vector(
        &mut self,
        vertex: VertexId,
        field: &str,
        tensors: Vec<Tensor>,
    ) -> TileResult<()> {
        for tensor in &tensors {
            self.check_known(tensor)?;
        }
        self.bind_field(vertex, field, VertexField::Vector(tensors))
    }

    pub fn set_initial_value(
        &mut self,
        vertex: VertexId,
        field: &str,
        value: impl Into<AttributeValue>,
    ) -> TileResult<()> {
        self.bind_field(vertex, field, VertexField::Value(value.into()))
    }

    /// Registers an external kernel source; returns false when it was already present.
    pub fn add_codelets(&mut self, source: &str) -> bool {
        if self.codelets.iter().any(|c| c == source) {
            return false;
        }
        self.codelets.push(source.to_string());
        true
    }

    pub fn codelets(&self) -> &[String] {
        &self.codelets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_mapping_tracks_views() {
        let mut graph = Graph::new(Target::new(4));
        let t = graph.add_variable(IpuType::Float, &[2, 3], "t");
        graph.set_tile_mapping(&t.index(0).unwrap(), 1).unwrap();
        graph.set_tile_mapping(&t.index(1).unwrap(), 3).unwrap();
        assert_eq!(graph.tile_of(&t.index(1).unwrap()).unwrap(), Some(3));
        assert_eq!(graph.tile_of(&t).unwrap(), None);
        assert!(matches!(
            graph.set_tile_mapping(&t, 4),
            Err(TileError::InvalidTile {
                tile: 4,
                num_tiles: 4
            })
        ));
    }

    #[test]
    fn constants_carry_their_bytes() {
        let mut graph = Graph::new(Target::new(2));
        let data = [1u8, 0, 0, 0, 2, 0, 0, 0];
        let c = graph.add_constant(IpuType::Int, &[2], &data, "c").unwrap();
        graph.set_tile_mapping(&c, 1).unwrap();
        let variable = &graph.variables()[0];
        assert_eq!(variable.initial_data(), Some(&data[..]));
        assert_eq!(graph.tile_of(&c).unwrap(), Some(1));

        assert!(graph.add_constant(IpuType::Int, &[3], &data, "short").is_err());
        assert_eq!(graph.stats().variables, 1);
    }

    #[test]
    fn fields_cannot_be_connected_twice() {
        let mut graph = Graph::new(Target::new(2));
        let t = graph.add_variable(IpuType::Int, &[4], "t");
        let cs = graph.add_compute_set("cs");
        let v = graph.add_vertex(cs, "Kernel").unwrap();
        graph.connect(v, "in", &t).unwrap();
        assert!(graph.connect(v, "in", &t).is_err());
        assert_eq!(graph.compute_set(cs).unwrap().vertices, vec![v]);
    }
}
