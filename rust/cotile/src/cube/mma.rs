use cubecl::prelude::*;

use crate::tiles::{BlockDim, Dim, Rt, St, Tile, TileExpand};

/// Dense matrix product primitive.
///
/// Called by every unit of the cube with the same arguments. `product` only
/// reads `a` and `b`; the caller decides how the result lands in shared
/// memory, so outputs may alias inputs.
#[cube]
pub trait Gemm<F: Numeric> {
    /// `a @ b`, distributed like any register tile of the output shape.
    fn product<M: Dim, K: Dim, N: Dim, W: BlockDim>(
        &self,
        a: &St<F, M, K, W>,
        b: &St<F, K, N, W>,
    ) -> Rt<F, M, N, W>;
}

/// Straightforward cooperative GEMM: each unit computes the output elements
/// it owns as full dot products.
#[derive(CubeType)]
pub struct ReferenceGemm;

// The CubeType derive doesn't handle unit structs too nicely,
// so we have to hand-impl this
impl From<ReferenceGemm> for ReferenceGemmExpand {
    fn from(_: ReferenceGemm) -> Self {
        ReferenceGemmExpand {}
    }
}

#[cube]
impl<F: Numeric> Gemm<F> for ReferenceGemm {
    fn product<M: Dim, K: Dim, N: Dim, W: BlockDim>(
        &self,
        a: &St<F, M, K, W>,
        b: &St<F, K, N, W>,
    ) -> Rt<F, M, N, W> {
        let size = comptime!(M::VALUE * N::VALUE);
        let mut out = Rt::<F, M, N, W>::new();

        for reg in 0..comptime!(Rt::<F, M, N, W>::len()) {
            let linear = Rt::<F, M, N, W>::linear(reg);
            if linear < size {
                let i = linear / N::VALUE;
                let j = linear % N::VALUE;
                let mut acc = F::from_int(0);
                for p in 0..K::VALUE {
                    acc += a.get(i, p) * b.get(p, j);
                }
                out.data[reg] = acc;
            }
        }

        out
    }
}

/// `c = a @ b`, or `c += a @ b` when `accumulate` is set.
///
/// Every unit finishes reading `a` and `b` before `c` is written, so `c` may
/// share storage with either input.
#[cube]
pub fn tile_matmul<F: Numeric, M: Dim, K: Dim, N: Dim, W: BlockDim, G: Gemm<F>>(
    gemm: G,
    a: &St<F, M, K, W>,
    b: &St<F, K, N, W>,
    c: &mut St<F, M, N, W>,
    #[comptime] accumulate: bool,
) {
    let prod = gemm.product::<M, K, N, W>(a, b);
    sync_cube();
    if comptime!(accumulate) {
        c.add(&prod);
    } else {
        c.assign(&prod);
    }
}

/// `a @ b` into a freshly allocated shared tile.
#[cube]
pub fn tile_matmul_out<F: Numeric, M: Dim, K: Dim, N: Dim, W: BlockDim, G: Gemm<F>>(
    gemm: G,
    a: &St<F, M, K, W>,
    b: &St<F, K, N, W>,
) -> St<F, M, N, W> {
    let mut c = St::<F, M, N, W>::new();
    tile_matmul::<F, M, K, N, W, G>(gemm, a, b, &mut c, false);
    c
}

/// Reverse of [`tile_matmul`] and [`tile_matmul_out`]:
/// `adj_a += adj_c @ b^T` and `adj_b += a^T @ adj_c`.
#[cube]
pub fn adj_tile_matmul<F: Numeric, M: Dim, K: Dim, N: Dim, W: BlockDim, G: Gemm<F>>(
    gemm: G,
    a: &St<F, M, K, W>,
    b: &St<F, K, N, W>,
    adj_a: &mut St<F, M, K, W>,
    adj_b: &mut St<F, K, N, W>,
    adj_c: &St<F, M, N, W>,
) {
    let grad_a = gemm.product::<M, N, K, W>(adj_c, &b.transpose());
    let grad_b = gemm.product::<K, M, N, W>(&a.transpose(), adj_c);
    sync_cube();
    adj_a.add(&grad_a);
    adj_b.add(&grad_b);
}
