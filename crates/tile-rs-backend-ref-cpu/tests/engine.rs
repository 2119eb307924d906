use half::f16;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tile_rs::graph::{Graph, Program, Sequence, Target};
use tile_rs::interpreter::{
    tile_data_barrier, tile_gather, tile_hw_cycle_count, tile_map_primitive, tile_put_replicated,
    tile_put_sharded, BinaryOp, TranslationAttributes,
};
use tile_rs::{IpuType, ShapedArray, TileMapEquation, VertexIOInfo};
use tile_rs_backend_ref_cpu::memory::encode_all;
use tile_rs_backend_ref_cpu::HostEngine;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn random_f32(rng: &mut StdRng, n: usize) -> Vec<f32> {
    (0..n).map(|_| rng.gen_range(-4.0f32..4.0)).collect()
}

#[test]
fn sharded_values_read_back_in_order() {
    init_logging();
    let mut rng = StdRng::seed_from_u64(42);
    let mut graph = Graph::new(Target::new(8));
    let mut seq = Sequence::new();
    let x = graph.add_variable(IpuType::Float, &[4, 3], "x");
    let sharded = tile_put_sharded(&mut graph, &mut seq, &x, &[2, 5, 7, 1]).unwrap();

    let values = random_f32(&mut rng, 12);
    let program = Program::from(seq);
    let mut engine = HostEngine::new(&graph);
    engine.write_f32(&x, &values).unwrap();
    engine.run(&program).unwrap();

    assert_eq!(engine.read_f32(sharded.tensor()).unwrap(), values);
    let row = engine.read_f32(&sharded.tensor().index(2).unwrap()).unwrap();
    assert_eq!(row, values[6..9].to_vec());
    let stats = engine.stats();
    assert_eq!(stats.copies, 1);
    assert_eq!(stats.copied_bytes, 48);
}

#[test]
fn replicated_items_hold_the_input() {
    init_logging();
    let mut graph = Graph::new(Target::new(4));
    let mut seq = Sequence::new();
    let x = graph.add_variable(IpuType::Int, &[2], "x");
    let replicated = tile_put_replicated(&mut graph, &mut seq, &x, &[3, 3, 0]).unwrap();

    let program = Program::from(seq);
    let mut engine = HostEngine::new(&graph);
    engine.write_i32(&x, &[-7, 11]).unwrap();
    engine.run(&program).unwrap();

    assert_eq!(engine.read_i32(replicated.tensor()).unwrap(), vec![-7, 11, -7, 11, -7, 11]);
}

#[test]
fn gather_moves_items_between_tiles() {
    init_logging();
    let mut graph = Graph::new(Target::new(8));
    let mut seq = Sequence::new();
    let x = graph.add_variable(IpuType::UnsignedInt, &[3, 2], "x");
    let sharded = tile_put_sharded(&mut graph, &mut seq, &x, &[0, 1, 2]).unwrap();
    let gathered = tile_gather(&mut graph, &mut seq, &sharded, &[2, 0, 1], &[2, 3, 0]).unwrap();

    let program = Program::from(seq);
    let mut engine = HostEngine::new(&graph);
    engine.write_u32(&x, &[10, 11, 20, 21, 30, 31]).unwrap();
    engine.run(&program).unwrap();

    assert_eq!(engine.read_u32(gathered.tensor()).unwrap(), vec![30, 31, 10, 11, 20, 21]);
    for (item, tile) in [2, 3, 0].into_iter().enumerate() {
        let item = gathered.tensor().index(item).unwrap();
        assert_eq!(graph.tile_of(&item).unwrap(), Some(tile));
    }
}

#[test]
fn barrier_leaves_every_bit_untouched() {
    init_logging();
    let mut rng = StdRng::seed_from_u64(7);
    let dtypes = [
        IpuType::Bool,
        IpuType::SignedChar,
        IpuType::UnsignedChar,
        IpuType::Short,
        IpuType::UnsignedShort,
        IpuType::Int,
        IpuType::UnsignedInt,
        IpuType::Half,
        IpuType::Float,
    ];

    let mut graph = Graph::new(Target::new(8));
    let mut seq = Sequence::new();
    let mut sources = Vec::new();
    let mut sharded = Vec::new();
    for (idx, dtype) in dtypes.into_iter().enumerate() {
        let x = graph.add_variable(dtype, &[2, 5], &format!("x{idx}"));
        let tiles = [idx as u32 % 8, (idx as u32 + 3) % 8];
        sharded.push(tile_put_sharded(&mut graph, &mut seq, &x, &tiles).unwrap());
        sources.push(x);
    }
    let synced = tile_data_barrier(&mut graph, &mut seq, &sharded).unwrap();
    assert_eq!(synced, sharded);

    let program = Program::from(seq);
    let mut engine = HostEngine::new(&graph);
    let mut payloads = Vec::new();
    for x in &sources {
        let width = x.element_type().size_in_bytes();
        let mut bytes: Vec<u8> = (0..10 * width).map(|_| rng.gen()).collect();
        if x.element_type() == IpuType::Bool {
            bytes.iter_mut().for_each(|b| *b &= 1);
        }
        engine.write_bytes(x, &bytes).unwrap();
        payloads.push(bytes);
    }
    engine.run(&program).unwrap();

    for (tensor, bytes) in synced.iter().zip(&payloads) {
        assert_eq!(&engine.read_bytes(tensor.tensor()).unwrap(), bytes);
    }
    let stats = engine.stats();
    assert_eq!(stats.compute_sets, 1);
    assert_eq!(stats.vertices, graph.vertices().len());
}

#[test]
fn binary_translations_execute_per_tile() {
    init_logging();
    let mut rng = StdRng::seed_from_u64(3);
    let mut graph = Graph::new(Target::new(4));
    let mut seq = Sequence::new();
    let a = graph.add_variable(IpuType::Float, &[3, 4], "a");
    let b = graph.add_variable(IpuType::Float, &[3, 4], "b");
    let tiles = [1, 3, 0];
    let sa = tile_put_sharded(&mut graph, &mut seq, &a, &tiles).unwrap();
    let sb = tile_put_sharded(&mut graph, &mut seq, &b, &tiles).unwrap();
    let attrs = TranslationAttributes::new();
    let sum = tile_map_primitive(&mut graph, &mut seq, "add", &[sa.clone(), sb.clone()], &attrs).unwrap();
    let less = tile_map_primitive(&mut graph, &mut seq, "lt", &[sa, sb], &attrs).unwrap();

    let lhs = random_f32(&mut rng, 12);
    let rhs = random_f32(&mut rng, 12);
    let program = Program::from(seq);
    let mut engine = HostEngine::new(&graph);
    engine.write_f32(&a, &lhs).unwrap();
    engine.write_f32(&b, &rhs).unwrap();
    engine.run(&program).unwrap();

    let expected: Vec<f32> = lhs.iter().zip(&rhs).map(|(x, y)| x + y).collect();
    assert_eq!(engine.read_f32(sum[0].tensor()).unwrap(), expected);
    let expected: Vec<u8> = lhs.iter().zip(&rhs).map(|(x, y)| u8::from(x < y)).collect();
    assert_eq!(engine.read_bytes(less[0].tensor()).unwrap(), expected);
    assert_eq!(engine.stats().vertices, 6);
}

#[test]
fn integer_binary_ops_wrap() {
    init_logging();
    let mut graph = Graph::new(Target::new(2));
    let mut seq = Sequence::new();
    let a = graph.add_variable(IpuType::Int, &[2, 2], "a");
    let b = graph.add_variable(IpuType::Int, &[2, 2], "b");
    let sa = tile_put_sharded(&mut graph, &mut seq, &a, &[0, 1]).unwrap();
    let sb = tile_put_sharded(&mut graph, &mut seq, &b, &[0, 1]).unwrap();
    let attrs = TranslationAttributes::new();
    let prod = tile_map_primitive(&mut graph, &mut seq, "mul", &[sa, sb], &attrs).unwrap();

    let program = Program::from(seq);
    let mut engine = HostEngine::new(&graph);
    engine.write_i32(&a, &[i32::MAX, -3, 6, 0]).unwrap();
    engine.write_i32(&b, &[2, 5, -7, 9]).unwrap();
    engine.run(&program).unwrap();

    assert_eq!(engine.read_i32(prod[0].tensor()).unwrap(), vec![-2, -15, -42, 0]);
}

#[test]
fn scaled_add_updates_in_place() {
    init_logging();
    let mut graph = Graph::new(Target::new(4));
    let mut seq = Sequence::new();
    let a = graph.add_variable(IpuType::Half, &[2, 3], "a");
    let b = graph.add_variable(IpuType::Half, &[2, 3], "b");
    let scale = graph.add_variable(IpuType::Half, &[], "scale");
    let tiles = [2, 0];
    let sa = tile_put_sharded(&mut graph, &mut seq, &a, &tiles).unwrap();
    let sb = tile_put_sharded(&mut graph, &mut seq, &b, &tiles).unwrap();
    let sscale = tile_put_replicated(&mut graph, &mut seq, &scale, &tiles).unwrap();
    let attrs = TranslationAttributes::new();
    let out = tile_map_primitive(&mut graph, &mut seq, "scaled_add", &[sa.clone(), sb, sscale], &attrs)
        .unwrap();
    assert_eq!(out[0].tensor(), sa.tensor());

    let program = Program::from(seq);
    let mut engine = HostEngine::new(&graph);
    engine.write_f16(&a, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
    engine.write_f16(&b, &[1.0, 1.0, 1.0, 2.0, 2.0, 2.0]).unwrap();
    engine.write_f16(&scale, &[0.5]).unwrap();
    engine.run(&program).unwrap();

    assert_eq!(
        engine.read_f16(out[0].tensor()).unwrap(),
        vec![1.5, 2.5, 3.5, 5.0, 6.0, 7.0]
    );
    // The unsharded source is not updated.
    assert_eq!(engine.read_f16(&a).unwrap()[0], 1.0);
}

#[test]
fn constant_inputs_are_read_from_their_data() {
    init_logging();
    let mut graph = Graph::new(Target::new(4));
    let mut seq = Sequence::new();
    let x = graph.add_variable(IpuType::Int, &[2, 3], "x");
    let tiles = [3, 1];
    let sx = tile_put_sharded(&mut graph, &mut seq, &x, &tiles).unwrap();
    let item = ShapedArray::new(vec![3], IpuType::Int);
    let eqn = TileMapEquation::new("add_const", BinaryOp::Add.kernel_name(IpuType::Int), tiles.to_vec())
        .with_inputs(vec![
            VertexIOInfo::input("in1", item.clone()),
            VertexIOInfo::constant("in2", IpuType::Int, vec![3], encode_all(&[10i32, 20, -30])),
        ])
        .with_outputs(vec![VertexIOInfo::output("out", item)]);
    let out = eqn.add(&mut graph, &mut seq, &[sx.tensor().clone()], "").unwrap();

    let program = Program::from(seq);
    let mut engine = HostEngine::new(&graph);
    engine.write_i32(&x, &[1, 2, 3, 4, 5, 6]).unwrap();
    engine.run(&program).unwrap();

    assert_eq!(engine.read_i32(&out[0]).unwrap(), vec![11, 22, -27, 14, 25, -24]);
}

#[test]
fn cycle_counts_pass_data_through() {
    init_logging();
    let mut graph = Graph::new(Target::new(8));
    let mut seq = Sequence::new();
    let x = graph.add_variable(IpuType::Float, &[1], "x");
    let tiles = [1, 2, 7];
    let val = tile_put_replicated(&mut graph, &mut seq, &x, &tiles).unwrap();
    let (val, start) = tile_hw_cycle_count(&mut graph, &mut seq, &val, true).unwrap();
    let (val, end) = tile_hw_cycle_count(&mut graph, &mut seq, &val, false).unwrap();

    assert_eq!(start.tiles(), &tiles);
    assert_eq!(start.tensor().shape(), &[3, 2]);
    assert_eq!(start.tensor().element_type(), IpuType::UnsignedInt);

    let program = Program::from(seq);
    let mut engine = HostEngine::new(&graph);
    engine.write_f32(&x, &[0.25]).unwrap();
    engine.run(&program).unwrap();

    assert_eq!(engine.read_f32(val.tensor()).unwrap(), vec![0.25; 3]);
    let start = engine.read_u32(start.tensor()).unwrap();
    let end = engine.read_u32(end.tensor()).unwrap();
    // No clock on the host: both reads are zero.
    assert_eq!(start, vec![0; 6]);
    assert_eq!(end, start);
    assert_eq!(engine.stats().compute_sets, 2);
}

#[test]
fn host_io_checks_types_and_sizes() {
    let mut graph = Graph::new(Target::new(2));
    let x = graph.add_variable(IpuType::Float, &[4], "x");
    let mut engine = HostEngine::new(&graph);
    assert!(engine.write_i32(&x, &[1, 2, 3, 4]).is_err());
    assert!(engine.write_f32(&x, &[1.0, 2.0]).is_err());
    assert!(engine.write_bytes(&x, &encode_all(&[f16::from_f32(1.0); 8])).is_ok());
    assert_eq!(engine.memory().total_bytes(), 16);
}
