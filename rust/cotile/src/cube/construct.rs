//! Tile construction and scalar <-> tile conversions.

use cubecl::prelude::*;

use crate::{
    UNROLL_LIMIT,
    tiles::{BlockDim, D1, Dim, Rt, Tile, TileExpand},
};

#[cube]
pub fn tile_zeros<F: Numeric, R: Dim, C: Dim, W: BlockDim>() -> Rt<F, R, C, W> {
    Rt::<F, R, C, W>::new()
}

#[cube]
pub fn tile_ones<F: Numeric, R: Dim, C: Dim, W: BlockDim>() -> Rt<F, R, C, W> {
    Rt::<F, R, C, W>::filled(F::from_int(1))
}

/// Element `k` (row-major) holds `start + k * step`.
#[cube]
pub fn tile_arange<F: Numeric, R: Dim, C: Dim, W: BlockDim>(start: F, step: F) -> Rt<F, R, C, W> {
    let mut out = Rt::<F, R, C, W>::new();
    #[unroll(Rt::<F, R, C, W>::len() <= UNROLL_LIMIT)]
    for reg in 0..comptime!(Rt::<F, R, C, W>::len()) {
        let linear = Rt::<F, R, C, W>::linear(reg);
        out.data[reg] = start + F::cast_from(linear) * step;
    }
    out
}

/// `tile_arange` has no differentiable inputs.
#[cube]
pub fn adj_tile_arange<F: Numeric, R: Dim, C: Dim, W: BlockDim, AdjY: Tile<F, R, C, W>>(_adj_ret: &AdjY) {}

/// Zeroed register tile with the shape of `t`.
#[cube]
pub fn tile_register_like<F: Numeric, R: Dim, C: Dim, W: BlockDim, T: Tile<F, R, C, W>>(
    _t: &T,
) -> Rt<F, R, C, W> {
    Rt::<F, R, C, W>::new()
}

/// Gathers one value per unit into a `1 x W` tile; unit `t` supplies column `t`.
#[cube]
pub fn tile<F: Numeric, W: BlockDim>(value: F) -> Rt<F, D1, W, W> {
    Rt::<F, D1, W, W>::filled(value)
}

/// Reverse of [`tile`]: this unit's column of the adjoint, for the caller to
/// add to its scalar's gradient.
#[cube]
pub fn adj_tile<F: Numeric, W: BlockDim, AdjY: Tile<F, D1, W, W>>(adj_ret: &AdjY) -> F {
    adj_ret.copy_to_register().data[0]
}

/// Inverse of [`tile`]: the value unit `t` holds in column `t`.
#[cube]
pub fn untile<F: Numeric, W: BlockDim, T: Tile<F, D1, W, W>>(t: &T) -> F {
    t.copy_to_register().data[0]
}

/// Reverse of [`untile`].
#[cube]
pub fn adj_untile<F: Numeric, W: BlockDim, AdjT: Tile<F, D1, W, W>>(adj_t: &mut AdjT, adj_ret: F) {
    let mut grad = Rt::<F, D1, W, W>::new();
    grad.data[0] = adj_ret;
    adj_t.add(&grad);
}

/// Element `(i, j)` of `t`, returned to every unit.
#[cube]
pub fn tile_extract<F: Numeric, R: Dim, C: Dim, W: BlockDim, T: Tile<F, R, C, W>>(t: &T, i: usize, j: usize) -> F {
    t.extract(i, j)
}

#[cube]
pub fn adj_tile_extract<F: Numeric, R: Dim, C: Dim, W: BlockDim, AdjT: Tile<F, R, C, W>>(
    adj_t: &mut AdjT,
    i: usize,
    j: usize,
    adj_ret: F,
) {
    adj_t.adj_extract(i, j, adj_ret);
}
