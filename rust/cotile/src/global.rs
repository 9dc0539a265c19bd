//! Tile views over global tensors.
//!
//! Global memory is a CubeCL `Tensor<F>` owned by the host: rank 1 or 2, with
//! per-axis element strides. A [`GlobalTile`] only records which tile of it an
//! access addresses; the tensor itself is passed alongside, and gradients
//! live in a second tensor of the same layout chosen by the caller.

use cubecl::prelude::*;

/// Non-owning view selecting one tile of a global tensor.
///
/// A 1D view at `x` covers elements `[x*SIZE, (x+1)*SIZE)`; a 2D view at
/// `(x, y)` covers rows `[x*M, x*M + M)` and columns `[y*N, y*N + N)`.
#[derive(CubeType, Clone, Copy)]
pub struct GlobalTile {
    pub x: usize,
    pub y: usize,
}

/// View tile `x` of a 1D tensor.
#[cube]
pub fn tile_load(x: usize) -> GlobalTile {
    GlobalTile { x, y: 0usize }
}

/// View tile `(x, y)` of a 2D tensor.
#[cube]
pub fn tile_load_2d(x: usize, y: usize) -> GlobalTile {
    GlobalTile { x, y }
}
