use std::sync::Arc;

use anyhow::{anyhow, bail, ensure, Context, Result};
use half::f16;
use tile_rs::graph::{ComputeSetId, Graph, Program, Tensor, Vertex, VertexField};
use tile_rs::interpreter::parse_vertex_name;

use crate::codelet::{Codelet, CodeletRegistry, VertexContext};
use crate::memory::{HostValue, Memory};

/// Counters accumulated over every `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EngineStats {
    pub copies: usize,
    pub copied_bytes: usize,
    pub compute_sets: usize,
    pub vertices: usize,
}

/// Executes programs of one graph on host memory.
pub struct HostEngine<'g> {
    graph: &'g Graph,
    memory: Memory,
    codelets: CodeletRegistry,
    stats: EngineStats,
}

impl<'g> HostEngine<'g> {
    pub fn new(graph: &'g Graph) -> Self {
        Self::with_codelets(graph, CodeletRegistry::with_builtins())
    }

    pub fn with_codelets(graph: &'g Graph, codelets: CodeletRegistry) -> Self {
        let memory = Memory::new(graph);
        log::debug!(
            "host engine: {} variables, {} bytes",
            graph.variables().len(),
            memory.total_bytes()
        );
        Self {
            graph,
            memory,
            codelets,
            stats: EngineStats::default(),
        }
    }

    pub fn register_codelet(&mut self, basename: impl Into<String>, codelet: Arc<dyn Codelet>) {
        self.codelets.register(basename, codelet);
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn write_bytes(&mut self, tensor: &Tensor, data: &[u8]) -> Result<()> {
        self.memory.write_bytes(tensor, data)
    }

    pub fn read_bytes(&self, tensor: &Tensor) -> Result<Vec<u8>> {
        self.memory.read_bytes(tensor)
    }

    pub fn write<T: HostValue>(&mut self, tensor: &Tensor, values: &[T]) -> Result<()> {
        self.memory.write(tensor, values)
    }

    pub fn read<T: HostValue>(&self, tensor: &Tensor) -> Result<Vec<T>> {
        self.memory.read(tensor)
    }

    pub fn write_f32(&mut self, tensor: &Tensor, values: &[f32]) -> Result<()> {
        self.write(tensor, values)
    }

    pub fn read_f32(&self, tensor: &Tensor) -> Result<Vec<f32>> {
        self.read(tensor)
    }

    pub fn write_f16(&mut self, tensor: &Tensor, values: &[f32]) -> Result<()> {
        let halves: Vec<f16> = values.iter().copied().map(f16::from_f32).collect();
        self.write(tensor, &halves)
    }

    pub fn read_f16(&self, tensor: &Tensor) -> Result<Vec<f32>> {
        Ok(self.read::<f16>(tensor)?.into_iter().map(f16::to_f32).collect())
    }

    pub fn write_i32(&mut self, tensor: &Tensor, values: &[i32]) -> Result<()> {
        self.write(tensor, values)
    }

    pub fn read_i32(&self, tensor: &Tensor) -> Result<Vec<i32>> {
        self.read(tensor)
    }

    pub fn write_u32(&mut self, tensor: &Tensor, values: &[u32]) -> Result<()> {
        self.write(tensor, values)
    }

    pub fn read_u32(&self, tensor: &Tensor) -> Result<Vec<u32>> {
        self.read(tensor)
    }

    pub fn run(&mut self, program: &Program) -> Result<()> {
        match program {
            Program::Sequence(seq) => {
                for step in seq.programs() {
                    self.run(step)?;
                }
                Ok(())
            }
            Program::Copy { src, dst } => {
                // Read fully before writing so overlapping views see the old values.
                let data = self.memory.read_bytes(src)?;
                self.memory.write_bytes(dst, &data)?;
                self.stats.copies += 1;
                self.stats.copied_bytes += data.len();
                Ok(())
            }
            Program::Execute {
                compute_set,
                debug_name,
            } => self
                .execute(*compute_set)
                .with_context(|| format!("executing compute set '{debug_name}'")),
        }
    }

    fn execute(&mut self, id: ComputeSetId) -> Result<()> {
        let graph = self.graph;
        let cs = graph
            .compute_set(id)
            .ok_or_else(|| anyhow!("unknown compute set {id:?}"))?;
        log::trace!("execute {:?} '{}' ({} vertices)", id, cs.debug_name, cs.vertices.len());
        for &vid in &cs.vertices {
            let vertex = graph
                .vertex(vid)
                .ok_or_else(|| anyhow!("unknown vertex {vid:?}"))?;
            self.check_locality(vertex)?;
            let (basename, args) = parse_vertex_name(&vertex.codelet)?;
            let codelet = self
                .codelets
                .get(&basename)
                .ok_or_else(|| anyhow!("no host codelet for '{}'", vertex.codelet))?;
            let mut ctx = VertexContext::new(vertex, &mut self.memory);
            codelet
                .execute(&mut ctx, &args)
                .with_context(|| format!("vertex {:?} '{}'", vid, vertex.codelet))?;
            self.stats.vertices += 1;
        }
        self.stats.compute_sets += 1;
        Ok(())
    }

    /// Every tensor a vertex touches must live on the vertex's tile.
    fn check_locality(&self, vertex: &Vertex) -> Result<()> {
        let tile = vertex
            .tile
            .ok_or_else(|| anyhow!("vertex {:?} has no tile", vertex.id))?;
        for (name, field) in &vertex.fields {
            let tensors: &[Tensor] = match field {
                VertexField::Tensor(t) => std::slice::from_ref(t),
                VertexField::Vector(ts) => ts,
                VertexField::Value(_) => continue,
            };
            for tensor in tensors {
                let mapping = self.graph.tile_mapping(tensor)?;
                if let Some(other) = mapping.iter().find(|m| **m != Some(tile)) {
                    bail!(
                        "field '{name}' of vertex {:?} on tile {tile} is mapped to {other:?}",
                        vertex.id
                    );
                }
            }
        }
        ensure!(
            tile < self.graph.num_tiles(),
            "vertex {:?} placed on tile {tile} outside the target",
            vertex.id
        );
        Ok(())
    }
}
