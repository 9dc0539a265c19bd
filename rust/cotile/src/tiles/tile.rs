use cubecl::prelude::*;

use super::{BlockDim, Dim, Rt};
use crate::global::GlobalTile;

/// Operations shared by register and shared tiles.
///
/// Every method is cooperative: all units of the cube call it with the same
/// arguments. Implementations that write shared storage end with
/// `sync_cube()`, so callers never place barriers around these calls.
#[cube]
pub trait Tile<F: Numeric, R: Dim, C: Dim, W: BlockDim> {
    // CubeCL won't let us do default impls

    /// Register form of this tile. Not a copy for register tiles, so the
    /// result must be treated as read-only.
    fn copy_to_register(&self) -> Rt<F, R, C, W>;

    /// Overwrite with the contents of a register tile.
    fn assign(&mut self, src: &Rt<F, R, C, W>);

    /// Accumulate a register tile elementwise.
    fn add(&mut self, src: &Rt<F, R, C, W>);

    fn fill(&mut self, value: F);

    fn zero(&mut self);

    /// Element `(i, j)`, returned to every unit.
    fn extract(&self, i: usize, j: usize) -> F;

    /// Accumulate `grad` into element `(i, j)`.
    fn adj_extract(&mut self, i: usize, j: usize, grad: F);

    fn copy_from_global(&mut self, src: &Tensor<F>, x: usize);

    fn copy_from_global_2d(&mut self, src: &Tensor<F>, x: usize, y: usize);

    fn copy_to_global(&self, dest: &mut Tensor<F>, x: usize);

    fn copy_to_global_2d(&self, dest: &mut Tensor<F>, x: usize, y: usize);

    /// Fill from a global view, dispatching on the tensor's rank.
    fn load(&mut self, src: &Tensor<F>, view: &GlobalTile);
}
