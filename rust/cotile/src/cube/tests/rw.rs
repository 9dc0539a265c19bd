use std::fmt::Debug;

use cubecl::prelude::*;
use test_case::test_case;

use crate::{
    cube::{
        adj_tile_load, adj_tile_load_2d, adj_tile_load_view, adj_tile_store, adj_tile_store_2d, tile_atomic_add,
        tile_load, tile_load_2d, tile_store, tile_store_2d,
    },
    test_utils::{DeviceTensor, TestRuntime, client, range_vec},
    tiles::*,
};

fn pattern<F: Numeric + CubeElement>(len: usize) -> Vec<F> {
    (0..len).map(|i| F::from_int(((i * 7) % 23) as i64 - 11)).collect()
}

// =============================================================================
// Global <-> Rt / St round trips
// =============================================================================

#[cube(launch)]
fn rt_roundtrip<F: Numeric, R: Dim, C: Dim, W: BlockDim>(
    src: &Tensor<F>,
    dst: &mut Tensor<F>,
    #[comptime] gx: usize,
    #[comptime] gy: usize,
) {
    for x in 0..gx {
        for y in 0..gy {
            let mut rt = Rt::<F, R, C, W>::new();
            rt.load(src, &tile_load_2d(x, y));
            tile_store_2d::<F, R, C, W, Rt<F, R, C, W>>(dst, x, y, &rt);
        }
    }
}

fn rt_roundtrip_2d<F, R, C, W>(grid: [usize; 2])
where
    F: Numeric + CubeElement + Default + PartialEq + Debug,
    R: Dim,
    C: Dim,
    W: BlockDim,
{
    let client = client();
    let shape = [grid[0] * R::VALUE, grid[1] * C::VALUE];
    let data = pattern::<F>(shape[0] * shape[1]);
    let src = DeviceTensor::from_slice(&client, &data, &shape);
    let dst = DeviceTensor::<F>::zeros(&client, &shape);

    rt_roundtrip::launch::<F, R, C, W, TestRuntime>(
        &client,
        CubeCount::Static(1, 1, 1),
        CubeDim::new_1d(W::VALUE as u32),
        src.arg(),
        dst.arg(),
        grid[0],
        grid[1],
    )
    .expect("Kernel launch failed");

    assert_eq!(dst.read(&client), data);
}

#[test_case([1, 1] ; "single tile")]
#[test_case([2, 3] ; "grid")]
fn rt_roundtrip_aligned(grid: [usize; 2]) {
    rt_roundtrip_2d::<f32, D4, D8, D8>(grid);
    rt_roundtrip_2d::<f32, D16, D16, D32>(grid);
    rt_roundtrip_2d::<i32, D8, D4, D4>(grid);
}

#[test_case([1, 1] ; "single tile")]
#[test_case([3, 2] ; "grid")]
fn rt_roundtrip_ragged(grid: [usize; 2]) {
    // SIZE is not a multiple of the block width
    rt_roundtrip_2d::<f32, D3, D5, D4>(grid);
    rt_roundtrip_2d::<i32, D7, D3, D8>(grid);
    rt_roundtrip_2d::<f32, D2, D2, D32>(grid);
}

#[cube(launch)]
fn st_roundtrip<F: Numeric, R: Dim, C: Dim, W: BlockDim>(
    src: &Tensor<F>,
    dst: &mut Tensor<F>,
    #[comptime] gx: usize,
    #[comptime] gy: usize,
) {
    let mut st = St::<F, R, C, W>::empty(true);
    for x in 0..gx {
        for y in 0..gy {
            st.load(src, &tile_load_2d(x, y));
            tile_store_2d::<F, R, C, W, St<F, R, C, W>>(dst, x, y, &st);
            // the next load overwrites st while other units may still be storing
            sync_cube();
        }
    }
}

fn launch_st_roundtrip<R: Dim, C: Dim, W: BlockDim>(
    src: &DeviceTensor<f32>,
    dst: &DeviceTensor<f32>,
    grid: [usize; 2],
) {
    let client = client();
    st_roundtrip::launch::<f32, R, C, W, TestRuntime>(
        &client,
        CubeCount::Static(1, 1, 1),
        CubeDim::new_1d(W::VALUE as u32),
        src.arg(),
        dst.arg(),
        grid[0],
        grid[1],
    )
    .expect("Kernel launch failed");
}

#[test]
fn st_roundtrip_contiguous() {
    let client = client();
    let data = range_vec::<f32>(96);
    let src = DeviceTensor::from_slice(&client, &data, &[8, 12]);

    let dst = DeviceTensor::<f32>::zeros(&client, &[8, 12]);
    launch_st_roundtrip::<D4, D4, D8>(&src, &dst, [2, 3]);
    assert_eq!(dst.read(&client), data);

    let dst = DeviceTensor::<f32>::zeros(&client, &[8, 12]);
    launch_st_roundtrip::<D8, D3, D4>(&src, &dst, [1, 4]);
    assert_eq!(dst.read(&client), data);
}

#[test]
fn st_roundtrip_padded_rows() {
    let client = client();
    // 6x4 logical, rows padded to 7 elements
    let mut storage = vec![-1.0f32; 6 * 7];
    for i in 0..6 {
        for j in 0..4 {
            storage[i * 7 + j] = (i * 4 + j) as f32;
        }
    }
    let src = DeviceTensor::strided(&client, &storage, &[6, 4], &[7, 1]);
    let dst = DeviceTensor::strided(&client, &vec![-1.0f32; 6 * 7], &[6, 4], &[7, 1]);

    launch_st_roundtrip::<D3, D2, D4>(&src, &dst, [2, 2]);

    // padding between rows is never written
    assert_eq!(dst.read(&client), storage);
}

#[test]
fn st_roundtrip_transposed_source() {
    let client = client();
    // 4x8 storage read as its 8x4 transpose
    let storage = range_vec::<f32>(32);
    let src = DeviceTensor::strided(&client, &storage, &[8, 4], &[1, 8]);
    let dst = DeviceTensor::<f32>::zeros(&client, &[8, 4]);

    launch_st_roundtrip::<D4, D4, D4>(&src, &dst, [2, 1]);

    let out = dst.read(&client);
    assert_eq!(out[1 * 4 + 0], 1.0);
    assert_eq!(out[0 * 4 + 1], 8.0);
    for i in 0..8 {
        for j in 0..4 {
            assert_eq!(out[i * 4 + j], storage[j * 8 + i], "({i}, {j})");
        }
    }
}

#[cube(launch)]
fn roundtrip_1d(src: &Tensor<f32>, rt_dst: &mut Tensor<f32>, st_dst: &mut Tensor<f32>) {
    // 3x5 tiles over 4 units, two tiles back to back
    for x in 0..2usize {
        let mut rt = Rt::<f32, D3, D5, D4>::new();
        rt.load(src, &tile_load(x));
        tile_store::<f32, D3, D5, D4, Rt<f32, D3, D5, D4>>(rt_dst, x, &rt);

        let mut st = St::<f32, D3, D5, D4>::new();
        st.load(src, &tile_load(x));
        tile_store::<f32, D3, D5, D4, St<f32, D3, D5, D4>>(st_dst, x, &st);
        sync_cube();
    }
}

#[test]
fn roundtrip_1d_ragged() {
    let client = client();
    let data = range_vec::<f32>(30);
    let src = DeviceTensor::from_slice(&client, &data, &[30]);
    let rt_dst = DeviceTensor::<f32>::zeros(&client, &[30]);
    let st_dst = DeviceTensor::<f32>::zeros(&client, &[30]);

    roundtrip_1d::launch::<TestRuntime>(
        &client,
        CubeCount::Static(1, 1, 1),
        CubeDim::new_1d(4),
        src.arg(),
        rt_dst.arg(),
        st_dst.arg(),
    )
    .expect("Kernel launch failed");

    assert_eq!(rt_dst.read(&client), data);
    assert_eq!(st_dst.read(&client), data);
}

// =============================================================================
// 4x4 tiles over 32 units: units 16..32 own only padding
// =============================================================================

type Wide = Rt<f32, D4, D4, D32>;

/// Drives every store and accumulate path into tile `(1, 0)` of 12x4
/// tensors, so rows 0..4 and 8..12 are neighbours on both sides.
#[cube(launch)]
fn padding_paths(
    stored: &mut Tensor<f32>,
    atomic: &mut Tensor<Atomic<f32>>,
    previous: &mut Tensor<f32>,
    adj_src: &mut Tensor<Atomic<f32>>,
    adj_dest: &Tensor<f32>,
    gathered_rt: &mut Tensor<f32>,
    gathered_st: &mut Tensor<f32>,
    st_raw: &mut Tensor<f32>,
) {
    // padding units would carry values 17..32 into rows 8..12
    let seeded = Rt::<f32, D4, D4, D32>::filled(f32::cast_from(UNIT_POS + 1));

    tile_store_2d::<f32, D4, D4, D32, Wide>(stored, 1, 0, &seeded);

    let prev = tile_atomic_add::<f32, D4, D4, D32, Wide>(atomic, 1, 0, &seeded);
    prev.copy_to_global(previous, 0);

    adj_tile_load_2d::<f32, D4, D4, D32, Wide>(adj_src, 1, 0, &seeded);

    let mut adj_rt = Rt::<f32, D4, D4, D32>::new();
    adj_tile_store_2d::<f32, D4, D4, D32, Wide>(adj_dest, 1, 0, &mut adj_rt);
    adj_rt.copy_to_global(gathered_rt, 0);

    let mut adj_st = St::<f32, D4, D4, D32>::zeros();
    adj_tile_store_2d::<f32, D4, D4, D32, St<f32, D4, D4, D32>>(adj_dest, 1, 0, &mut adj_st);
    adj_st.copy_to_global(gathered_st, 0);

    // rows padded to 5 slots; the gaps at offsets 4, 9 and 14 stay zero
    let mut padded = St::<f32, D4, D4, D32>::zeros_strided(5usize, 1usize);
    padded.add(&seeded);
    padded.add(&seeded);
    for i in range_stepped(UNIT_POS as usize, 19usize, 32usize) {
        st_raw[i] = padded.data[i];
    }
}

#[test]
fn wide_block_padding_never_touches_neighbours() {
    assert_eq!(Wide::NUM_REGS, 1);
    assert!(!Wide::ALIGNED);
    for pos in 0..32 {
        assert_eq!(Wide::valid_for(pos), usize::from(pos < 16));
    }

    let client = client();
    let stored = DeviceTensor::from_slice(&client, &vec![-7.0f32; 48], &[12, 4]);
    let atomic = DeviceTensor::from_slice(&client, &vec![-7.0f32; 48], &[12, 4]);
    let previous = DeviceTensor::<f32>::zeros(&client, &[16]);
    let adj_src = DeviceTensor::<f32>::zeros(&client, &[12, 4]);
    let adj_dest = DeviceTensor::from_slice(&client, &range_vec::<f32>(48), &[12, 4]);
    let gathered_rt = DeviceTensor::<f32>::zeros(&client, &[16]);
    let gathered_st = DeviceTensor::<f32>::zeros(&client, &[16]);
    let st_raw = DeviceTensor::<f32>::zeros(&client, &[19]);

    padding_paths::launch::<TestRuntime>(
        &client,
        CubeCount::Static(1, 1, 1),
        CubeDim::new_1d(32),
        stored.arg(),
        atomic.arg(),
        previous.arg(),
        adj_src.arg(),
        adj_dest.arg(),
        gathered_rt.arg(),
        gathered_st.arg(),
        st_raw.arg(),
    )
    .expect("Kernel launch failed");

    let seeded: Vec<f32> = (1..=16).map(|v| v as f32).collect();
    let with_neighbours = |fill: f32, tile: &[f32]| [vec![fill; 16], tile.to_vec(), vec![fill; 16]].concat();

    assert_eq!(stored.read(&client), with_neighbours(-7.0, &seeded));

    let bumped: Vec<f32> = seeded.iter().map(|v| v - 7.0).collect();
    assert_eq!(atomic.read(&client), with_neighbours(-7.0, &bumped));
    assert_eq!(previous.read(&client), vec![-7.0; 16]);

    assert_eq!(adj_src.read(&client), with_neighbours(0.0, &seeded));

    let tile_grad: Vec<f32> = (16..32).map(|v| v as f32).collect();
    assert_eq!(gathered_rt.read(&client), tile_grad);
    assert_eq!(gathered_st.read(&client), tile_grad);

    let mut raw = vec![0.0f32; 19];
    for linear in 0..16 {
        raw[(linear / 4) * 5 + linear % 4] = 2.0 * (linear + 1) as f32;
    }
    assert_eq!(st_raw.read(&client), raw);
}

// =============================================================================
// Atomic add and global adjoints
// =============================================================================

#[cube(launch)]
fn atomic_add_ones(dest: &mut Tensor<Atomic<f32>>, previous: &mut Tensor<f32>) {
    let ones = Rt::<f32, D4, D4, D4>::filled(1.0);
    let prev = tile_atomic_add::<f32, D4, D4, D4, Rt<f32, D4, D4, D4>>(dest, 0, 1, &ones);
    prev.copy_to_global(previous, 0);
}

#[test]
fn atomic_add_returns_previous_values() {
    let client = client();
    let dest = DeviceTensor::from_slice(&client, &range_vec::<f32>(32), &[4, 8]);
    let previous = DeviceTensor::<f32>::zeros(&client, &[16]);

    atomic_add_ones::launch::<TestRuntime>(
        &client,
        CubeCount::Static(1, 1, 1),
        CubeDim::new_1d(4),
        dest.arg(),
        previous.arg(),
    )
    .expect("Kernel launch failed");

    let prev = previous.read(&client);
    let out = dest.read(&client);
    for i in 0..4 {
        for j in 0..8 {
            let bump = if j >= 4 { 1.0 } else { 0.0 };
            assert_eq!(out[i * 8 + j], (i * 8 + j) as f32 + bump);
        }
        for j in 0..4 {
            assert_eq!(prev[i * 4 + j], (i * 8 + j + 4) as f32);
        }
    }
}

#[cube(launch)]
fn atomic_add_threes(dest: &mut Tensor<Atomic<i32>>) {
    let src = Rt::<i32, D2, D8, D8>::filled(3);
    tile_atomic_add::<i32, D2, D8, D8, Rt<i32, D2, D8, D8>>(dest, 0, 0, &src);
}

#[test]
fn atomic_add_from_many_cubes_sums() {
    let client = client();
    let dest = DeviceTensor::<i32>::zeros(&client, &[2, 8]);
    atomic_add_threes::launch::<TestRuntime>(&client, CubeCount::Static(5, 1, 1), CubeDim::new_1d(8), dest.arg())
        .expect("Kernel launch failed");
    assert_eq!(dest.read(&client), vec![15; 16]);
}

#[cube(launch)]
fn adj_load_twice(adj_src: &mut Tensor<Atomic<f32>>) {
    let adj = Rt::<f32, D4, D4, D8>::filled(0.5);
    adj_tile_load_2d::<f32, D4, D4, D8, Rt<f32, D4, D4, D8>>(adj_src, 0, 1, &adj);
    adj_tile_load_2d::<f32, D4, D4, D8, Rt<f32, D4, D4, D8>>(adj_src, 0, 1, &adj);
}

#[test]
fn adj_load_accumulates() {
    let client = client();
    let adj_src = DeviceTensor::<f32>::zeros(&client, &[4, 8]);
    adj_load_twice::launch::<TestRuntime>(&client, CubeCount::Static(1, 1, 1), CubeDim::new_1d(8), adj_src.arg())
        .expect("Kernel launch failed");

    let grad = adj_src.read(&client);
    for i in 0..4 {
        for j in 0..8 {
            let expected = if j >= 4 { 1.0 } else { 0.0 };
            assert_eq!(grad[i * 8 + j], expected, "({i}, {j})");
        }
    }
}

#[cube(launch)]
fn adj_load_shared_1d(adj_src: &mut Tensor<Atomic<f32>>, adj_view: &mut Tensor<Atomic<f32>>) {
    let mut adj = St::<f32, D2, D3, D4>::zeros();
    adj.fill(2.0);
    adj_tile_load::<f32, D2, D3, D4, St<f32, D2, D3, D4>>(adj_src, 1, &adj);
    adj_tile_load_view::<f32, D2, D3, D4, St<f32, D2, D3, D4>>(adj_view, &tile_load_2d(0, 1), &adj);
}

#[test]
fn adj_load_from_shared_adjoint() {
    let client = client();
    let adj_src = DeviceTensor::<f32>::zeros(&client, &[12]);
    let adj_view = DeviceTensor::<f32>::zeros(&client, &[2, 6]);
    adj_load_shared_1d::launch::<TestRuntime>(
        &client,
        CubeCount::Static(1, 1, 1),
        CubeDim::new_1d(4),
        adj_src.arg(),
        adj_view.arg(),
    )
    .expect("Kernel launch failed");

    assert_eq!(adj_src.read(&client), [vec![0.0; 6], vec![2.0; 6]].concat());
    assert_eq!(
        adj_view.read(&client),
        vec![0.0, 0.0, 0.0, 2.0, 2.0, 2.0, 0.0, 0.0, 0.0, 2.0, 2.0, 2.0]
    );
}

#[cube(launch)]
fn adj_store_gather(adj_dest: &Tensor<f32>, rt_out: &mut Tensor<f32>, st_out: &mut Tensor<f32>) {
    let mut adj_rt = Rt::<f32, D2, D4, D4>::filled(1.0);
    adj_tile_store_2d::<f32, D2, D4, D4, Rt<f32, D2, D4, D4>>(adj_dest, 1, 0, &mut adj_rt);
    adj_rt.copy_to_global(rt_out, 0);

    let mut adj_st = St::<f32, D2, D4, D4>::zeros();
    adj_tile_store_2d::<f32, D2, D4, D4, St<f32, D2, D4, D4>>(adj_dest, 0, 0, &mut adj_st);
    adj_tile_store_2d::<f32, D2, D4, D4, St<f32, D2, D4, D4>>(adj_dest, 0, 0, &mut adj_st);
    adj_st.copy_to_global(st_out, 0);
}

#[test]
fn adj_store_gathers_into_register_and_shared_adjoints() {
    let client = client();
    let adj_dest = DeviceTensor::from_slice(&client, &range_vec::<f32>(16), &[4, 4]);
    let rt_out = DeviceTensor::<f32>::zeros(&client, &[8]);
    let st_out = DeviceTensor::<f32>::zeros(&client, &[8]);

    adj_store_gather::launch::<TestRuntime>(
        &client,
        CubeCount::Static(1, 1, 1),
        CubeDim::new_1d(4),
        adj_dest.arg(),
        rt_out.arg(),
        st_out.arg(),
    )
    .expect("Kernel launch failed");

    let rt_expected: Vec<f32> = (0..8).map(|k| 1.0 + (8 + k) as f32).collect();
    let st_expected: Vec<f32> = (0..8).map(|k| 2.0 * k as f32).collect();
    assert_eq!(rt_out.read(&client), rt_expected);
    assert_eq!(st_out.read(&client), st_expected);
}

#[cube(launch)]
fn adj_store_1d(adj_dest: &Tensor<f32>, out: &mut Tensor<f32>) {
    let mut adj = Rt::<f32, D1, D4, D2>::new();
    adj_tile_store::<f32, D1, D4, D2, Rt<f32, D1, D4, D2>>(adj_dest, 1, &mut adj);
    adj.copy_to_global(out, 0);
}

#[test]
fn adj_store_reads_second_tile_1d() {
    let client = client();
    let adj_dest = DeviceTensor::from_slice(&client, &range_vec::<f32>(8), &[8]);
    let out = DeviceTensor::<f32>::zeros(&client, &[4]);
    adj_store_1d::launch::<TestRuntime>(
        &client,
        CubeCount::Static(1, 1, 1),
        CubeDim::new_1d(2),
        adj_dest.arg(),
        out.arg(),
    )
    .expect("Kernel launch failed");
    assert_eq!(out.read(&client), vec![4.0, 5.0, 6.0, 7.0]);
}
