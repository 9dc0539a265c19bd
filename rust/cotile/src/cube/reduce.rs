use cubecl::prelude::*;

use crate::tiles::{BlockDim, D1, Dim, Rt, Tile, TileExpand};

/// Sum of one value per unit, returned to every unit.
///
/// Partials are summed in unit order, so float results do not depend on
/// scheduling.
#[cube]
pub fn cube_sum<F: Numeric, W: BlockDim>(value: F) -> F {
    let mut partials = SharedMemory::<F>::new(W::VALUE);
    partials[UNIT_POS as usize] = value;
    sync_cube();

    let mut total = F::from_int(0);
    for t in 0..W::VALUE {
        total += partials[t];
    }
    // keep the next writer from clobbering partials still being read
    sync_cube();
    total
}

/// Sums every element of `t` into a 1x1 tile.
///
/// All units hold the total in register 0, not only the owning unit.
#[cube]
pub fn tile_sum<F: Numeric, R: Dim, C: Dim, W: BlockDim, T: Tile<F, R, C, W>>(t: &T) -> Rt<F, D1, D1, W> {
    let partial = t.copy_to_register().partial_sum();
    Rt::<F, D1, D1, W>::filled(cube_sum::<F, W>(partial))
}

/// Reverse of [`tile_sum`]: adds the output gradient to every element.
#[cube]
pub fn adj_tile_sum<
    F: Numeric,
    R: Dim,
    C: Dim,
    W: BlockDim,
    AdjA: Tile<F, R, C, W>,
    AdjY: Tile<F, D1, D1, W>,
>(
    adj_a: &mut AdjA,
    adj_ret: &AdjY,
) {
    let grad = adj_ret.extract(0, 0);
    adj_a.add(&Rt::<F, R, C, W>::filled(grad));
}
