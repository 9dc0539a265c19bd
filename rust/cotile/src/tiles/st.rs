use std::marker::PhantomData;

use cubecl::prelude::*;

use super::{
    BlockDim, Dim, Rt, Tile,
    layout::{is_injective, strided_len},
};
use crate::{global::GlobalTile, prelude::*};

/// A tile in cube-shared memory with compile-time strides.
///
/// Element `(i, j)` lives at physical offset `i * stride_m + j * stride_n`.
/// [`St::transpose`] and [`St::broadcast`] produce views that alias the same
/// buffer; a stride of zero maps several logical elements onto one physical
/// slot.
///
/// Mutating operations end with `sync_cube()`, so any unit may read the result
/// immediately afterwards.
#[derive(CubeType)]
pub struct St<F: Numeric, R: Dim, C: Dim, W: BlockDim> {
    pub data: SharedMemory<F>,
    #[cube(comptime)]
    _phantom: PhantomData<(R, C, W)>,
    #[cube(comptime)]
    stride_m: usize,
    #[cube(comptime)]
    stride_n: usize,
    // Physical length, which differs from SIZE for strided views
    #[cube(comptime)]
    pub(crate) len: usize,
    #[cube(comptime)]
    injective: bool,
}

impl<F: Numeric, R: Dim, C: Dim, W: BlockDim> St<F, R, C, W> {
    pub const ROWS: usize = R::VALUE;
    pub const COLS: usize = C::VALUE;
    pub const SIZE: usize = R::VALUE * C::VALUE;

    pub fn size() -> usize {
        Self::SIZE
    }

    /// Physical length of a view with the given strides.
    pub fn len_for(stride_m: usize, stride_n: usize) -> usize {
        strided_len(R::VALUE, C::VALUE, stride_m, stride_n)
    }
}

#[cube]
impl<F: Numeric, R: Dim, C: Dim, W: BlockDim> St<F, R, C, W> {
    /// Contiguous tile with unspecified contents.
    pub fn new() -> St<F, R, C, W> {
        St::<F, R, C, W>::empty(false)
    }

    /// Contiguous tile; with `poison` set every slot starts at
    /// `F::max_value()` so reads before the first write stand out.
    pub fn empty(#[comptime] poison: bool) -> St<F, R, C, W> {
        let mut data = SharedMemory::<F>::new(comptime!(R::VALUE * C::VALUE));
        if comptime!(poison) {
            for i in range_stepped(UNIT_POS as usize, comptime!(R::VALUE * C::VALUE), W::VALUE) {
                data[i] = F::max_value();
            }
            sync_cube();
        }
        St::<F, R, C, W>::from_parts(data, C::VALUE, 1usize)
    }

    pub fn zeros() -> St<F, R, C, W> {
        St::<F, R, C, W>::zeros_strided(C::VALUE, 1usize)
    }

    /// Zeroed tile over `(R-1)*stride_m + (C-1)*stride_n + 1` physical
    /// elements. Zero strides allocate storage for broadcast tiles.
    pub fn zeros_strided(#[comptime] stride_m: usize, #[comptime] stride_n: usize) -> St<F, R, C, W> {
        let len = comptime!(St::<F, R, C, W>::len_for(stride_m, stride_n));
        let mut data = SharedMemory::<F>::new(len);
        for i in range_stepped(UNIT_POS as usize, len, W::VALUE) {
            data[i] = F::from_int(0);
        }
        sync_cube();
        St::<F, R, C, W>::from_parts(data, stride_m, stride_n)
    }

    pub fn from_parts(
        data: SharedMemory<F>,
        #[comptime] stride_m: usize,
        #[comptime] stride_n: usize,
    ) -> St<F, R, C, W> {
        St::<F, R, C, W> {
            data,
            _phantom: PhantomData,
            stride_m,
            stride_n,
            len: comptime!(St::<F, R, C, W>::len_for(stride_m, stride_n)),
            injective: comptime!(is_injective(R::VALUE, C::VALUE, stride_m, stride_n)),
        }
    }

    pub fn offset(&self, i: usize, j: usize) -> usize {
        i * comptime!(self.stride_m) + j * comptime!(self.stride_n)
    }

    /// Physical offset of row-major logical element `linear`.
    pub fn offset_linear(&self, linear: usize) -> usize {
        self.offset(linear / C::VALUE, linear % C::VALUE)
    }

    pub fn get(&self, i: usize, j: usize) -> F {
        self.data[self.offset(i, j)]
    }

    /// Single-unit write. Callers synchronize before others read it.
    pub fn set(&mut self, i: usize, j: usize, value: F) {
        let offset = self.offset(i, j);
        self.data[offset] = value;
    }

    /// Zero-copy transposed view.
    pub fn transpose(&self) -> St<F, C, R, W> {
        St::<F, C, R, W>::from_parts(self.data, comptime!(self.stride_n), comptime!(self.stride_m))
    }

    /// Zero-copy view with a larger logical shape over the same buffer.
    ///
    /// A stride of zero on an axis repeats the source along it, e.g. a
    /// `1 x N` tile viewed as `M x N` with strides `(0, 1)`.
    pub fn broadcast<R2: Dim, C2: Dim>(
        &self,
        #[comptime] stride_m: usize,
        #[comptime] stride_n: usize,
    ) -> St<F, R2, C2, W> {
        St::<F, R2, C2, W>::from_parts(self.data, stride_m, stride_n)
    }

    /// Accumulate `src` into a view where several logical positions share a
    /// physical slot.
    ///
    /// Contributions are staged densely, then each unit sums every logical
    /// position that lands on the physical slots it owns. This keeps the
    /// accumulation race-free without shared-memory atomics.
    fn gather_add(&mut self, src: &Rt<F, R, C, W>) {
        let size = comptime!(R::VALUE * C::VALUE);
        let tid = UNIT_POS as usize;
        let mut staged = SharedMemory::<F>::new(size);

        for reg in 0..comptime!(Rt::<F, R, C, W>::len()) {
            let linear = Rt::<F, R, C, W>::linear(reg);
            if linear < size {
                staged[linear] = src.data[reg];
            }
        }
        sync_cube();

        for slot in range_stepped(tid, self.len, W::VALUE) {
            let mut acc = self.data[slot];
            for linear in 0..size {
                if self.offset_linear(linear) == slot {
                    acc += staged[linear];
                }
            }
            self.data[slot] = acc;
        }
        sync_cube();
    }
}

#[cube]
impl<F: Numeric, R: Dim, C: Dim, W: BlockDim> Tile<F, R, C, W> for St<F, R, C, W> {
    fn copy_to_register(&self) -> Rt<F, R, C, W> {
        let size = comptime!(R::VALUE * C::VALUE);
        let mut out = Rt::<F, R, C, W>::new();
        #[unroll(Rt::<F, R, C, W>::len() <= UNROLL_LIMIT)]
        for reg in 0..comptime!(Rt::<F, R, C, W>::len()) {
            let linear = Rt::<F, R, C, W>::linear(reg);
            if linear < size {
                out.data[reg] = self.data[self.offset_linear(linear)];
            }
        }
        out
    }

    fn assign(&mut self, src: &Rt<F, R, C, W>) {
        let size = comptime!(R::VALUE * C::VALUE);
        #[unroll(Rt::<F, R, C, W>::len() <= UNROLL_LIMIT)]
        for reg in 0..comptime!(Rt::<F, R, C, W>::len()) {
            let linear = Rt::<F, R, C, W>::linear(reg);
            if linear < size {
                let offset = self.offset_linear(linear);
                self.data[offset] = src.data[reg];
            }
        }
        sync_cube();
    }

    fn add(&mut self, src: &Rt<F, R, C, W>) {
        if comptime!(self.injective) {
            let size = comptime!(R::VALUE * C::VALUE);
            #[unroll(Rt::<F, R, C, W>::len() <= UNROLL_LIMIT)]
            for reg in 0..comptime!(Rt::<F, R, C, W>::len()) {
                let linear = Rt::<F, R, C, W>::linear(reg);
                if linear < size {
                    let offset = self.offset_linear(linear);
                    self.data[offset] += src.data[reg];
                }
            }
            sync_cube();
        } else {
            // broadcast views map several units onto one slot
            self.gather_add(src);
        }
    }

    fn fill(&mut self, value: F) {
        for linear in range_stepped(UNIT_POS as usize, comptime!(R::VALUE * C::VALUE), W::VALUE) {
            let offset = self.offset_linear(linear);
            self.data[offset] = value;
        }
        sync_cube();
    }

    fn zero(&mut self) {
        self.fill(F::from_int(0));
    }

    fn extract(&self, i: usize, j: usize) -> F {
        self.get(i, j)
    }

    fn adj_extract(&mut self, i: usize, j: usize, grad: F) {
        if UNIT_POS == 0 {
            let offset = self.offset(i, j);
            self.data[offset] += grad;
        }
        sync_cube();
    }

    fn copy_from_global(&mut self, src: &Tensor<F>, x: usize) {
        let size = comptime!(R::VALUE * C::VALUE);
        let stride = src.stride(0);
        let base = x * size * stride;
        for linear in range_stepped(UNIT_POS as usize, size, W::VALUE) {
            let offset = self.offset_linear(linear);
            self.data[offset] = src[base + linear * stride];
        }
        sync_cube();
    }

    fn copy_from_global_2d(&mut self, src: &Tensor<F>, x: usize, y: usize) {
        let size = comptime!(R::VALUE * C::VALUE);
        let si = src.stride(0);
        let sj = src.stride(1);
        let base = (x * R::VALUE) * si + (y * C::VALUE) * sj;
        for linear in range_stepped(UNIT_POS as usize, size, W::VALUE) {
            let i = linear / C::VALUE;
            let j = linear % C::VALUE;
            let offset = self.offset(i, j);
            self.data[offset] = src[base + i * si + j * sj];
        }
        sync_cube();
    }

    fn copy_to_global(&self, dest: &mut Tensor<F>, x: usize) {
        let size = comptime!(R::VALUE * C::VALUE);
        let stride = dest.stride(0);
        let base = x * size * stride;
        for linear in range_stepped(UNIT_POS as usize, size, W::VALUE) {
            dest[base + linear * stride] = self.data[self.offset_linear(linear)];
        }
    }

    fn copy_to_global_2d(&self, dest: &mut Tensor<F>, x: usize, y: usize) {
        let size = comptime!(R::VALUE * C::VALUE);
        let si = dest.stride(0);
        let sj = dest.stride(1);
        let base = (x * R::VALUE) * si + (y * C::VALUE) * sj;
        for linear in range_stepped(UNIT_POS as usize, size, W::VALUE) {
            let i = linear / C::VALUE;
            let j = linear % C::VALUE;
            dest[base + i * si + j * sj] = self.get(i, j);
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
