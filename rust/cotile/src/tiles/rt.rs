use std::marker::PhantomData;

use cubecl::prelude::*;

use super::{
    BlockDim, Dim, Tile,
    layout::{Coord, coord, reg_count, slot_index},
};
use crate::{binary_ops::BinaryOp, global::GlobalTile, prelude::*, unary_ops::UnaryOp};

/// A tile distributed cyclically over the registers of the `W` units of a cube.
///
/// Each unit holds `NUM_REGS` elements; unit `t` owns linear indices
/// `t, t + W, t + 2W, ...`. A value of this type is one unit's fragment.
/// Trailing slots past `SIZE` are padding and are never stored or accumulated.
#[derive(CubeType)]
pub struct Rt<F: Numeric, R: Dim, C: Dim, W: BlockDim> {
    pub data: Array<F>,
    #[cube(comptime)]
    _phantom: PhantomData<(R, C, W)>,
    // This is just for ergonomics,
    // as we can't access Self::NUM_REGS due to CubeCL limitations
    #[cube(comptime)]
    len: usize,
}

impl<F: Numeric, R: Dim, C: Dim, W: BlockDim> Rt<F, R, C, W> {
    pub const ROWS: usize = R::VALUE;
    pub const COLS: usize = C::VALUE;
    pub const SIZE: usize = R::VALUE * C::VALUE;
    pub const NUM_REGS: usize = reg_count(Self::SIZE, W::VALUE);
    /// Every slot maps to a real element.
    pub const ALIGNED: bool = Self::SIZE % W::VALUE == 0;

    pub fn len() -> usize {
        Self::NUM_REGS
    }

    pub fn size() -> usize {
        Self::SIZE
    }

    /// Linear tile index held by `reg` on unit `pos`.
    #[inline]
    pub fn linear_index(pos: usize, reg: usize) -> usize {
        slot_index(pos, reg, W::VALUE)
    }

    #[inline]
    pub fn coord(linear: usize) -> Coord {
        coord(linear, C::VALUE)
    }

    /// `(reg, linear)` pairs owned by unit `pos`, stopping at padding slots.
    pub fn owned(pos: usize) -> impl Iterator<Item = (usize, usize)> {
        (0..Self::NUM_REGS)
            .map(move |reg| (reg, Self::linear_index(pos, reg)))
            .take_while(|&(_, linear)| Self::ALIGNED || linear < Self::SIZE)
    }

    /// Number of unit `pos`'s registers that map to real elements.
    pub fn valid_for(pos: usize) -> usize {
        if pos >= Self::SIZE {
            0
        } else {
            (Self::SIZE - pos).div_ceil(W::VALUE)
        }
    }
}

#[cube]
impl<F: Numeric, R: Dim, C: Dim, W: BlockDim> Rt<F, R, C, W> {
    /// Zero-initialized, so adjoint accumulation can start from it.
    pub fn new() -> Rt<F, R, C, W> {
        Rt::<F, R, C, W>::filled(F::from_int(0))
    }

    pub fn filled(value: F) -> Rt<F, R, C, W> {
        let mut data = Array::<F>::new(comptime!(Rt::<F, R, C, W>::len()));
        #[unroll(Rt::<F, R, C, W>::len() <= UNROLL_LIMIT)]
        for i in 0..comptime!(Rt::<F, R, C, W>::len()) {
            data[i] = value;
        }
        Rt::<F, R, C, W>::from_data(data)
    }

    pub fn from_data(data: Array<F>) -> Rt<F, R, C, W> {
        Rt::<F, R, C, W> {
            data,
            _phantom: PhantomData,
            len: comptime!(Rt::<F, R, C, W>::len()),
        }
    }

    /// Number of this unit's registers that map to real elements.
    pub fn valid(&self) -> usize {
        let size = comptime!(R::VALUE * C::VALUE);
        let tid = UNIT_POS as usize;
        let mut n = 0usize;
        if tid < size {
            n = (size - tid + W::VALUE - 1) / W::VALUE;
        }
        n
    }

    /// Linear index of register `reg` on this unit.
    pub fn linear(reg: usize) -> usize {
        UNIT_POS as usize + reg * W::VALUE
    }

    pub fn apply_unary_op<O: UnaryOp<F>>(&mut self, op: O) {
        #[unroll(self.len <= UNROLL_LIMIT)]
        for i in 0..self.len {
            self.data[i] = op.apply(self.data[i]);
        }
    }

    pub fn apply_binary_op<O: BinaryOp<F>>(&mut self, op: O, other: &Rt<F, R, C, W>) {
        #[unroll(self.len <= UNROLL_LIMIT)]
        for i in 0..self.len {
            self.data[i] = op.apply(self.data[i], other.data[i]);
        }
    }

    pub fn copy_from(&mut self, other: &Rt<F, R, C, W>) {
        #[unroll(self.len <= UNROLL_LIMIT)]
        for i in 0..self.len {
            self.data[i] = other.data[i];
        }
    }

    /// Sum of this unit's real elements.
    pub fn partial_sum(&self) -> F {
        let size = comptime!(R::VALUE * C::VALUE);
        let mut acc = F::from_int(0);
        for reg in 0..self.len {
            if Rt::<F, R, C, W>::linear(reg) < size {
                acc += self.data[reg];
            }
        }
        acc
    }
}

#[cube]
impl<F: Numeric, R: Dim, C: Dim, W: BlockDim> Tile<F, R, C, W> for Rt<F, R, C, W> {
    // Callers never mutate the returned tile in place, so the fragment is
    // handed out without a copy.
    fn copy_to_register(&self) -> Rt<F, R, C, W> {
        Rt::<F, R, C, W>::from_data(self.data)
    }

    fn assign(&mut self, src: &Rt<F, R, C, W>) {
        self.copy_from(src);
    }

    fn add(&mut self, src: &Rt<F, R, C, W>) {
        #[unroll(self.len <= UNROLL_LIMIT)]
        for i in 0..self.len {
            self.data[i] += src.data[i];
        }
    }

    fn fill(&mut self, value: F) {
        #[unroll(self.len <= UNROLL_LIMIT)]
        for i in 0..self.len {
            self.data[i] = value;
        }
    }

    fn zero(&mut self) {
        self.fill(F::from_int(0));
    }

    fn extract(&self, i: usize, j: usize) -> F {
        let linear = i * C::VALUE + j;
        let mut cell = SharedMemory::<F>::new(1usize);

        if UNIT_POS as usize == linear % W::VALUE {
            cell[0] = self.data[linear / W::VALUE];
        }
        sync_cube();
        let value = cell[0];
        // keep the owner from overwriting the cell before everyone has read it
        sync_cube();
        value
    }

    fn adj_extract(&mut self, i: usize, j: usize, grad: F) {
        let linear = i * C::VALUE + j;
        if UNIT_POS as usize == linear % W::VALUE {
            let reg = linear / W::VALUE;
            self.data[reg] += grad;
        }
    }

    fn copy_from_global(&mut self, src: &Tensor<F>, x: usize) {
        let size = comptime!(R::VALUE * C::VALUE);
        let stride = src.stride(0);
        let base = x * size * stride;

        #[unroll(self.len <= UNROLL_LIMIT)]
        for reg in 0..self.len {
            let linear = Rt::<F, R, C, W>::linear(reg);
            if linear < size {
                self.data[reg] = src[base + linear * stride];
            }
        }
    }

    fn copy_from_global_2d(&mut self, src: &Tensor<F>, x: usize, y: usize) {
        let size = comptime!(R::VALUE * C::VALUE);
        let si = src.stride(0);
        let sj = src.stride(1);
        let base = (x * R::VALUE) * si + (y * C::VALUE) * sj;

        #[unroll(self.len <= UNROLL_LIMIT)]
        for reg in 0..self.len {
            let linear = Rt::<F, R, C, W>::linear(reg);
            if linear < size {
                let i = linear / C::VALUE;
                let j = linear % C::VALUE;
                self.data[reg] = src[base + i * si + j * sj];
            }
        }
    }

    fn copy_to_global(&self, dest: &mut Tensor<F>, x: usize) {
        let size = comptime!(R::VALUE * C::VALUE);
        let stride = dest.stride(0);
        let base = x * size * stride;

        #[unroll(self.len <= UNROLL_LIMIT)]
        for reg in 0..self.len {
            let linear = Rt::<F, R, C, W>::linear(reg);
            if linear < size {
                dest[base + linear * stride] = self.data[reg];
            }
        }
    }

    fn copy_to_global_2d(&self, dest: &mut Tensor<F>, x: usize, y: usize) {
        let size = comptime!(R::VALUE * C::VALUE);
        let si = dest.stride(0);
        let sj = dest.stride(1);
        let base = (x * R::VALUE) * si + (y * C::VALUE) * sj;

        #[unroll(self.len <= UNROLL_LIMIT)]
        for reg in 0..self.len {
            let linear = Rt::<F, R, C, W>::linear(reg);
            if linear < size {
                let i = linear / C::VALUE;
                let j = linear % C::VALUE;
                dest[base + i * si + j * sj] = self.data[reg];
            }
        }
    }

    fn load(&mut self, src: &Tensor<F>, view: &GlobalTile) {
        if src.rank() == 1 {
            self.copy_from_global(src, view.x);
        } else {
            self.copy_from_global_2d(src, view.x, view.y);
        }
    }
}
