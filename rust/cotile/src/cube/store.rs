use cubecl::prelude::*;

use crate::{
    UNROLL_LIMIT,
    tiles::{BlockDim, Dim, Rt, Tile, TileExpand},
};

/// Stores `src` to tile `x` of a 1D tensor.
#[cube]
pub fn tile_store<F: Numeric, R: Dim, C: Dim, W: BlockDim, T: Tile<F, R, C, W>>(
    dest: &mut Tensor<F>,
    x: usize,
    src: &T,
) {
    src.copy_to_global(dest, x);
}

/// Stores `src` to tile `(x, y)` of a 2D tensor.
#[cube]
pub fn tile_store_2d<F: Numeric, R: Dim, C: Dim, W: BlockDim, T: Tile<F, R, C, W>>(
    dest: &mut Tensor<F>,
    x: usize,
    y: usize,
    src: &T,
) {
    src.copy_to_global_2d(dest, x, y);
}

/// Reverse of [`tile_store`]: gathers the gradient of tile `x` from
/// `adj_dest` and adds it into `adj_t`.
#[cube]
pub fn adj_tile_store<F: Numeric, R: Dim, C: Dim, W: BlockDim, T: Tile<F, R, C, W>>(
    adj_dest: &Tensor<F>,
    x: usize,
    adj_t: &mut T,
) {
    let mut adj_reg = Rt::<F, R, C, W>::new();
    adj_reg.copy_from_global(adj_dest, x);
    adj_t.add(&adj_reg);
}

/// Reverse of [`tile_store_2d`].
#[cube]
pub fn adj_tile_store_2d<F: Numeric, R: Dim, C: Dim, W: BlockDim, T: Tile<F, R, C, W>>(
    adj_dest: &Tensor<F>,
    x: usize,
    y: usize,
    adj_t: &mut T,
) {
    let mut adj_reg = Rt::<F, R, C, W>::new();
    adj_reg.copy_from_global_2d(adj_dest, x, y);
    adj_t.add(&adj_reg);
}

/// Atomically adds `src` into tile `(x, y)` of `dest`.
///
/// Returns a register tile holding the value each location had before this
/// unit's addition. Atomicity is per element; there is no ordering between
/// different locations. Padding registers of the result are zero.
#[cube]
pub fn tile_atomic_add<F: Numeric, R: Dim, C: Dim, W: BlockDim, T: Tile<F, R, C, W>>(
    dest: &mut Tensor<Atomic<F>>,
    x: usize,
    y: usize,
    src: &T,
) -> Rt<F, R, C, W> {
    let size = comptime!(R::VALUE * C::VALUE);
    let src_reg = src.copy_to_register();
    let mut previous = Rt::<F, R, C, W>::new();
    let si = dest.stride(0);
    let sj = dest.stride(1);
    let base = (x * R::VALUE) * si + (y * C::VALUE) * sj;

    #[unroll(Rt::<F, R, C, W>::len() <= UNROLL_LIMIT)]
    for reg in 0..comptime!(Rt::<F, R, C, W>::len()) {
        let linear = Rt::<F, R, C, W>::linear(reg);
        if linear < size {
            let i = linear / C::VALUE;
            let j = linear % C::VALUE;
            previous.data[reg] = dest[base + i * si + j * sj].fetch_add(src_reg.data[reg]);
        }
    }

    previous
}

/// Reverse of [`tile_atomic_add`]; identical to the reverse of a store.
#[cube]
pub fn adj_tile_atomic_add<F: Numeric, R: Dim, C: Dim, W: BlockDim, T: Tile<F, R, C, W>>(
    adj_dest: &Tensor<F>,
    x: usize,
    y: usize,
    adj_t: &mut T,
) {
    adj_tile_store_2d::<F, R, C, W, T>(adj_dest, x, y, adj_t);
}
