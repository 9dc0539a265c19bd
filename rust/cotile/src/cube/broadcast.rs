//! Zero-copy reshaping views and their adjoints.

use cubecl::prelude::*;

use crate::tiles::{BlockDim, Dim, Rt, St, Tile, TileExpand};

/// Transposed alias of `st`. No data moves.
#[cube]
pub fn tile_transpose<F: Numeric, R: Dim, C: Dim, W: BlockDim>(st: &St<F, R, C, W>) -> St<F, C, R, W> {
    st.transpose()
}

/// Reverse of [`tile_transpose`]: `adj_t += transpose(adj_ret)`.
#[cube]
pub fn adj_tile_transpose<F: Numeric, R: Dim, C: Dim, W: BlockDim, AdjT: Tile<F, R, C, W>>(
    adj_t: &mut AdjT,
    adj_ret: &St<F, C, R, W>,
) {
    let mut grad = Rt::<F, R, C, W>::new();
    grad.copy_from(&adj_ret.transpose().copy_to_register());
    // adj_ret is usually a transposed alias of adj_t
    sync_cube();
    adj_t.add(&grad);
}

/// Alias of `st` with logical shape `R2 x C2` and the given strides.
///
/// A `1 x N` row becomes `M x N` with strides `(0, 1)`; an `M x 1` column
/// becomes `M x N` with strides `(1, 0)`.
#[cube]
pub fn tile_broadcast<F: Numeric, R: Dim, C: Dim, R2: Dim, C2: Dim, W: BlockDim>(
    st: &St<F, R, C, W>,
    #[comptime] stride_m: usize,
    #[comptime] stride_n: usize,
) -> St<F, R2, C2, W> {
    st.broadcast::<R2, C2>(stride_m, stride_n)
}

/// Reverse of [`tile_broadcast`].
///
/// The adjoint of a broadcast view is allocated with the view's strides, so
/// every contribution along the broadcast axis has already been summed into
/// one physical slot. Source and view adjoints therefore have the same
/// physical length and are accumulated slot by slot.
#[cube]
pub fn adj_tile_broadcast<F: Numeric, R: Dim, C: Dim, R2: Dim, C2: Dim, W: BlockDim>(
    adj_t: &mut St<F, R, C, W>,
    adj_ret: &St<F, R2, C2, W>,
) {
    let len = comptime!(adj_ret.len);
    comptime!(assert_eq!(
        adj_t.len, len,
        "broadcast adjoint storage lengths differ"
    ));

    for offset in range_stepped(UNIT_POS as usize, len, W::VALUE) {
        adj_t.data[offset] += adj_ret.data[offset];
    }
    sync_cube();
}
