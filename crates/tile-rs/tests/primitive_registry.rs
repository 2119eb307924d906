use std::sync::Arc;

use tile_rs::graph::{Graph, Target, Tensor};
use tile_rs::primitive::registry::{
    get_primitive, has_primitive, list_primitives, primitive_metadata, primitive_program,
    register_primitive, PrimitiveRegistry,
};
use tile_rs::{IpuType, PrimitiveMetadata, PrimitiveOutput, TileError, TilePrimitive, TileResult};

struct Identity;

impl TilePrimitive for Identity {
    fn name(&self) -> &'static str {
        "identity_for_registry_test"
    }

    fn metadata(&self, num_inputs: u32) -> PrimitiveMetadata {
        PrimitiveMetadata::new(num_inputs).elementwise(true)
    }

    fn program(
        &self,
        _graph: &mut Graph,
        inputs: &[Tensor],
        _attributes: &str,
        _debug_prefix: &str,
    ) -> TileResult<PrimitiveOutput> {
        Ok(PrimitiveOutput::passthrough(inputs.to_vec()))
    }
}

#[test]
fn builtins_are_registered() {
    let names = list_primitives();
    for name in [
        "tile_data_barrier",
        "tile_gather",
        "tile_map_equation_call",
        "tile_put_replicated",
        "tile_put_sharded",
    ] {
        assert!(has_primitive(name), "{name} missing from {names:?}");
    }
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
}

#[test]
fn custom_primitives_dispatch_by_name() {
    register_primitive(Arc::new(Identity));
    assert!(get_primitive("identity_for_registry_test").is_some());

    let meta = primitive_metadata("identity_for_registry_test", 2).unwrap();
    assert_eq!(meta.num_inputs, 2);
    assert!(meta.is_elementwise);

    let mut graph = Graph::new(Target::new(4));
    let x = graph.add_variable(IpuType::Float, &[4], "x");
    let out = primitive_program("identity_for_registry_test", &mut graph, &[x.clone()], "", "id").unwrap();
    assert_eq!(out.outputs, vec![x]);
}

#[test]
fn unknown_names_are_reported() {
    let err = primitive_metadata("no_such_primitive", 1).unwrap_err();
    assert!(matches!(err, TileError::UnknownPrimitive(ref name) if name == "no_such_primitive"));

    let local = PrimitiveRegistry::new();
    assert!(local.names().is_empty());
    assert!(!local.contains("tile_put_sharded"));
    assert!(PrimitiveRegistry::default().contains("tile_put_sharded"));
}
