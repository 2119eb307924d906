//! Runtime primitive registry for name-based dispatch.
//!
//! The host runtime looks primitives up by name instead of relying on link-time exports.
//! The global registry is populated with the built-in primitives on first use; other crates
//! can add their own through [`register_primitive`].

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use super::{PrimitiveMetadata, PrimitiveOutput, TilePrimitive};
use crate::error::{TileError, TileResult};
use crate::graph::{Graph, Tensor};
use crate::tile::{TileDataBarrier, TileGather, TileMapEquationCall, TilePutReplicated, TilePutSharded};

/// Name -> primitive table.
pub struct PrimitiveRegistry {
    primitives: RwLock<HashMap<String, Arc<dyn TilePrimitive>>>,
}

impl PrimitiveRegistry {
    pub fn new() -> Self {
        Self {
            primitives: RwLock::new(HashMap::new()),
        }
    }

    /// Registry holding every built-in primitive.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(TilePutSharded));
        registry.register(Arc::new(TilePutReplicated));
        registry.register(Arc::new(TileGather));
        registry.register(Arc::new(TileDataBarrier));
        registry.register(Arc::new(TileMapEquationCall));
        registry
    }

    /// Registers `primitive` under its own name, replacing any previous entry.
    pub fn register(&self, primitive: Arc<dyn TilePrimitive>) {
        let name = primitive.name().to_string();
        log::debug!("registering tile primitive {name}");
        self.primitives
            .write()
            .expect("primitive registry poisoned")
            .insert(name, primitive);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TilePrimitive>> {
        self.primitives
            .read()
            .expect("primitive registry poisoned")
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.primitives
            .read()
            .expect("primitive registry poisoned")
            .contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .primitives
            .read()
            .expect("primitive registry poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn metadata(&self, name: &str, num_inputs: u32) -> TileResult<PrimitiveMetadata> {
        let primitive = self.lookup(name)?;
        Ok(primitive.metadata(num_inputs))
    }

    pub fn program(
        &self,
        name: &str,
        graph: &mut Graph,
        inputs: &[Tensor],
        attributes: &str,
        debug_prefix: &str,
    ) -> TileResult<PrimitiveOutput> {
        let primitive = self.lookup(name)?;
        primitive.program(graph, inputs, attributes, debug_prefix)
    }

    fn lookup(&self, name: &str) -> TileResult<Arc<dyn TilePrimitive>> {
        self.get(name)
            .ok_or_else(|| TileError::UnknownPrimitive(name.to_string()))
    }
}

impl Default for PrimitiveRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

static GLOBAL_REGISTRY: OnceLock<PrimitiveRegistry> = OnceLock::new();

fn global_registry() -> &'static PrimitiveRegistry {
    GLOBAL_REGISTRY.get_or_init(PrimitiveRegistry::with_builtins)
}

/// Registers a primitive in the global registry.
///
/// # Example
/// ```ignore
/// use std::sync::Arc;
/// use tile_rs::primitive::registry::register_primitive;
///
/// register_primitive(Arc::new(MyPrimitive));
/// ```
pub fn register_primitive(primitive: Arc<dyn TilePrimitive>) {
    global_registry().register(primitive);
}

/// Looks up a primitive by name.
pub fn get_primitive(name: &str) -> Option<Arc<dyn TilePrimitive>> {
    global_registry().get(name)
}

pub fn has_primitive(name: &str) -> bool {
    global_registry().contains(name)
}

/// Sorted names of every registered primitive.
pub fn list_primitives() -> Vec<String> {
    global_registry().names()
}

pub fn primitive_metadata(name: &str, num_inputs: u32) -> TileResult<PrimitiveMetadata> {
    global_registry().metadata(name, num_inputs)
}

/// Dispatches a program call to the named primitive.
pub fn primitive_program(
    name: &str,
    graph: &mut Graph,
    inputs: &[Tensor],
    attributes: &str,
    debug_prefix: &str,
) -> TileResult<PrimitiveOutput> {
    global_registry().program(name, graph, inputs, attributes, debug_prefix)
}
