use tile_rs::graph::{Graph, Sequence, Target};
use tile_rs::interpreter::{
    list_tile_translations, register_tile_translation, tile_data_barrier, tile_gather,
    tile_map_primitive, tile_put_replicated, tile_put_sharded, tile_translation, translation_rule,
    TranslationAttributes,
};
use tile_rs::types::AttributeValue;
use tile_rs::{IpuType, TileError, TileMapEquation, VertexIOInfo};

#[test]
fn helpers_chain_through_the_registry() {
    let mut graph = Graph::new(Target::new(8));
    let mut seq = Sequence::new();
    let x = graph.add_variable(IpuType::Float, &[3, 4], "x");

    let sharded = tile_put_sharded(&mut graph, &mut seq, &x, &[0, 1, 2]).unwrap();
    assert_eq!(sharded.tiles(), &[0, 1, 2]);
    assert_eq!(sharded.tile_aval().shape, vec![4]);

    let gathered = tile_gather(&mut graph, &mut seq, &sharded, &[1, 1, 0], &[1, 5, 0]).unwrap();
    assert_eq!(gathered.shape(), &[3, 4]);
    assert_eq!(gathered.tiles(), &[1, 5, 0]);

    let scale = graph.add_variable(IpuType::Half, &[], "scale");
    let replicated = tile_put_replicated(&mut graph, &mut seq, &scale, &[1, 5, 0]).unwrap();
    assert_eq!(replicated.shape(), &[3]);

    let synced = tile_data_barrier(&mut graph, &mut seq, &[gathered.clone(), replicated.clone()]).unwrap();
    assert_eq!(synced, vec![gathered, replicated]);

    // shard copy, one gather copy, replicate copy, barrier execute.
    assert_eq!(seq.len(), 4);
}

#[test]
fn binary_translation_produces_an_elementwise_equation() {
    let mut graph = Graph::new(Target::new(8));
    let mut seq = Sequence::new();
    let a = graph.add_variable(IpuType::Int, &[2, 6], "a");
    let b = graph.add_variable(IpuType::Int, &[2, 6], "b");
    let a = tile_put_sharded(&mut graph, &mut seq, &a, &[3, 4]).unwrap();
    let b = tile_put_sharded(&mut graph, &mut seq, &b, &[3, 4]).unwrap();

    let outputs = tile_map_primitive(&mut graph, &mut seq, "ge", &[a, b], &TranslationAttributes::new()).unwrap();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].tensor().element_type(), IpuType::Bool);
    assert_eq!(outputs[0].tiles(), &[3, 4]);

    let codelets: Vec<&str> = graph.vertices().iter().map(|v| v.codelet.as_str()).collect();
    assert_eq!(
        codelets,
        vec!["popops::BinaryOp1D<popops::expr::BinaryOpType::GREATER_THAN_EQUAL,int>"; 2]
    );
}

#[test]
fn mismatched_tiles_and_unknown_ops_fail() {
    let mut graph = Graph::new(Target::new(8));
    let mut seq = Sequence::new();
    let x = graph.add_variable(IpuType::Float, &[2], "x");
    let a = tile_put_sharded(&mut graph, &mut seq, &x, &[0, 1]).unwrap();
    let b = tile_put_sharded(&mut graph, &mut seq, &x, &[1, 0]).unwrap();

    let attrs = TranslationAttributes::new();
    let err = tile_map_primitive(&mut graph, &mut seq, "add", &[a.clone(), b], &attrs).unwrap_err();
    assert!(matches!(err, TileError::ShapeMismatch { .. }), "{err}");

    let err = tile_map_primitive(&mut graph, &mut seq, "cosh", &[a], &attrs).unwrap_err();
    assert!(matches!(err, TileError::UnknownPrimitive(_)), "{err}");

    let err = tile_map_primitive(&mut graph, &mut seq, "add", &[], &attrs).unwrap_err();
    assert!(matches!(err, TileError::InputArity { got: 0, .. }), "{err}");
}

#[test]
fn custom_translations_receive_attributes() {
    register_tile_translation(
        "fill_for_interpreter_test",
        translation_rule(|name, tiles, inavals, attrs| {
            let mut eqn = TileMapEquation::new(name, "Fill<float>", tiles.to_vec())
                .with_outputs(vec![VertexIOInfo::output("out", inavals[0].clone())]);
            if let Some(AttributeValue::F32(value)) = attrs.get("value") {
                eqn.attributes_f32.push(tile_rs::VertexAttributeF32::new("value", *value));
            }
            eqn.inputs_info.push(VertexIOInfo::input("like", inavals[0].clone()));
            Ok(eqn)
        }),
    );
    assert!(tile_translation("fill_for_interpreter_test").is_some());
    assert!(list_tile_translations().contains(&"scaled_add".to_string()));

    let mut graph = Graph::new(Target::new(4));
    let mut seq = Sequence::new();
    let x = graph.add_variable(IpuType::Float, &[2, 3], "x");
    let x = tile_put_sharded(&mut graph, &mut seq, &x, &[2, 3]).unwrap();
    let mut attrs = TranslationAttributes::new();
    attrs.insert("value".to_string(), AttributeValue::F32(1.5));

    let out = tile_map_primitive(&mut graph, &mut seq, "fill_for_interpreter_test", &[x], &attrs).unwrap();
    assert_eq!(out[0].shape(), &[2, 3]);
    let vertex = graph.vertices().last().unwrap();
    assert!(vertex.field("value").is_some());
}
