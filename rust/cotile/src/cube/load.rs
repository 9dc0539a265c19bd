use cubecl::prelude::*;

use crate::{
    UNROLL_LIMIT,
    global::GlobalTile,
    tiles::{BlockDim, Dim, Rt, Tile, TileExpand},
};

/// Reverse of a 1D load: atomically accumulates `adj_ret` into tile `x` of
/// `adj_src`.
///
/// Several cubes may load overlapping tiles of the same source, so every
/// element goes through `fetch_add`.
#[cube]
pub fn adj_tile_load<F: Numeric, R: Dim, C: Dim, W: BlockDim, T: Tile<F, R, C, W>>(
    adj_src: &mut Tensor<Atomic<F>>,
    x: usize,
    adj_ret: &T,
) {
    let size = comptime!(R::VALUE * C::VALUE);
    let adj_reg = adj_ret.copy_to_register();
    let stride = adj_src.stride(0);
    let base = x * size * stride;

    #[unroll(Rt::<F, R, C, W>::len() <= UNROLL_LIMIT)]
    for reg in 0..comptime!(Rt::<F, R, C, W>::len()) {
        let linear = Rt::<F, R, C, W>::linear(reg);
        if linear < size {
            adj_src[base + linear * stride].fetch_add(adj_reg.data[reg]);
        }
    }
}

/// Reverse of a 2D load.
#[cube]
pub fn adj_tile_load_2d<F: Numeric, R: Dim, C: Dim, W: BlockDim, T: Tile<F, R, C, W>>(
    adj_src: &mut Tensor<Atomic<F>>,
    x: usize,
    y: usize,
    adj_ret: &T,
) {
    let size = comptime!(R::VALUE * C::VALUE);
    let adj_reg = adj_ret.copy_to_register();
    let si = adj_src.stride(0);
    let sj = adj_src.stride(1);
    let base = (x * R::VALUE) * si + (y * C::VALUE) * sj;

    #[unroll(Rt::<F, R, C, W>::len() <= UNROLL_LIMIT)]
    for reg in 0..comptime!(Rt::<F, R, C, W>::len()) {
        let linear = Rt::<F, R, C, W>::linear(reg);
        if linear < size {
            let i = linear / C::VALUE;
            let j = linear % C::VALUE;
            adj_src[base + i * si + j * sj].fetch_add(adj_reg.data[reg]);
        }
    }
}

/// Reverse of a load through a [`GlobalTile`] view, dispatching on rank.
#[cube]
pub fn adj_tile_load_view<F: Numeric, R: Dim, C: Dim, W: BlockDim, T: Tile<F, R, C, W>>(
    adj_src: &mut Tensor<Atomic<F>>,
    view: &GlobalTile,
    adj_ret: &T,
) {
    if adj_src.rank() == 1 {
        adj_tile_load::<F, R, C, W, T>(adj_src, view.x, adj_ret);
    } else {
        adj_tile_load_2d::<F, R, C, W, T>(adj_src, view.x, view.y, adj_ret);
    }
}
