//! Forward/adjoint pairs as values.
//!
//! A differentiable operation bundles a tile operation with its reverse. A
//! caller that records the operations it ran can replay `accumulate_adjoint`
//! in reverse order to backpropagate through a kernel.

use std::marker::PhantomData;

use cubecl::prelude::*;

use crate::{
    binary_ops::BinaryOp,
    cube::{
        Gemm, adj_tile_broadcast, adj_tile_map, adj_tile_map2, adj_tile_matmul, adj_tile_sum, adj_tile_transpose,
        tile_broadcast, tile_map, tile_map2, tile_matmul_out, tile_sum,
    },
    tiles::{BlockDim, D1, Dim, Rt, St, Tile, TileExpand},
    unary_ops::UnaryOp,
};

/// An operation with one tile input.
#[cube]
pub trait UnaryDifferentiable<F: Numeric> {
    type Input: CubeType;
    type Output: CubeType;

    fn apply(&self, input: &Self::Input) -> Self::Output;

    /// Accumulate the input gradient given the output gradient. Never
    /// overwrites `adj_input`.
    fn accumulate_adjoint(&self, input: &Self::Input, adj_output: &Self::Output, adj_input: &mut Self::Input);
}

/// An operation with two tile inputs.
#[cube]
pub trait BinaryDifferentiable<F: Numeric> {
    type Lhs: CubeType;
    type Rhs: CubeType;
    type Output: CubeType;

    fn apply(&self, a: &Self::Lhs, b: &Self::Rhs) -> Self::Output;

    fn accumulate_adjoint(
        &self,
        a: &Self::Lhs,
        b: &Self::Rhs,
        adj_output: &Self::Output,
        adj_a: &mut Self::Lhs,
        adj_b: &mut Self::Rhs,
    );
}

/// Elementwise unary map over an `R x C` register tile.
#[derive(CubeType)]
pub struct Mapped<F: Numeric, O: UnaryOp<F> + CubeType, R: Dim, C: Dim, W: BlockDim> {
    pub op: O,
    #[cube(comptime)]
    _phantom: PhantomData<(F, R, C, W)>,
}

#[cube]
impl<F: Numeric, O: UnaryOp<F> + CubeType, R: Dim, C: Dim, W: BlockDim> Mapped<F, O, R, C, W> {
    pub fn new(op: O) -> Mapped<F, O, R, C, W> {
        Mapped::<F, O, R, C, W> {
            op,
            _phantom: PhantomData,
        }
    }
}

#[cube]
impl<F: Numeric, O: UnaryOp<F> + CubeType, R: Dim, C: Dim, W: BlockDim> UnaryDifferentiable<F>
    for Mapped<F, O, R, C, W>
{
    type Input = Rt<F, R, C, W>;
    type Output = Rt<F, R, C, W>;

    fn apply(&self, a: &Rt<F, R, C, W>) -> Rt<F, R, C, W> {
        tile_map::<F, R, C, W, Rt<F, R, C, W>, O>(self.op, a)
    }

    fn accumulate_adjoint(&self, a: &Rt<F, R, C, W>, adj_output: &Rt<F, R, C, W>, adj_a: &mut Rt<F, R, C, W>) {
        adj_tile_map::<F, R, C, W, Rt<F, R, C, W>, Rt<F, R, C, W>, Rt<F, R, C, W>, O>(self.op, a, adj_a, adj_output);
    }
}

/// Elementwise binary map.
#[derive(CubeType)]
pub struct Mapped2<F: Numeric, O: BinaryOp<F> + CubeType, R: Dim, C: Dim, W: BlockDim> {
    pub op: O,
    #[cube(comptime)]
    _phantom: PhantomData<(F, R, C, W)>,
}

#[cube]
impl<F: Numeric, O: BinaryOp<F> + CubeType, R: Dim, C: Dim, W: BlockDim> Mapped2<F, O, R, C, W> {
    pub fn new(op: O) -> Mapped2<F, O, R, C, W> {
        Mapped2::<F, O, R, C, W> {
            op,
            _phantom: PhantomData,
        }
    }
}

#[cube]
impl<F: Numeric, O: BinaryOp<F> + CubeType, R: Dim, C: Dim, W: BlockDim> BinaryDifferentiable<F>
    for Mapped2<F, O, R, C, W>
{
    type Lhs = Rt<F, R, C, W>;
    type Rhs = Rt<F, R, C, W>;
    type Output = Rt<F, R, C, W>;

    fn apply(&self, a: &Rt<F, R, C, W>, b: &Rt<F, R, C, W>) -> Rt<F, R, C, W> {
        tile_map2::<F, R, C, W, Rt<F, R, C, W>, Rt<F, R, C, W>, O>(self.op, a, b)
    }

    fn accumulate_adjoint(
        &self,
        a: &Rt<F, R, C, W>,
        b: &Rt<F, R, C, W>,
        adj_output: &Rt<F, R, C, W>,
        adj_a: &mut Rt<F, R, C, W>,
        adj_b: &mut Rt<F, R, C, W>,
    ) {
        adj_tile_map2::<
            F,
            R,
            C,
            W,
            Rt<F, R, C, W>,
            Rt<F, R, C, W>,
            Rt<F, R, C, W>,
            Rt<F, R, C, W>,
            Rt<F, R, C, W>,
            O,
        >(self.op, a, b, adj_a, adj_b, adj_output);
    }
}

/// `A (M x K) @ B (K x N)` on shared tiles.
#[derive(CubeType)]
pub struct MatMul<F: Numeric, G: Gemm<F> + CubeType, M: Dim, K: Dim, N: Dim, W: BlockDim> {
    pub gemm: G,
    #[cube(comptime)]
    _phantom: PhantomData<(F, M, K, N, W)>,
}

#[cube]
impl<F: Numeric, G: Gemm<F> + CubeType, M: Dim, K: Dim, N: Dim, W: BlockDim> MatMul<F, G, M, K, N, W> {
    pub fn new(gemm: G) -> MatMul<F, G, M, K, N, W> {
        MatMul::<F, G, M, K, N, W> {
            gemm,
            _phantom: PhantomData,
        }
    }
}

#[cube]
impl<F: Numeric, G: Gemm<F> + CubeType, M: Dim, K: Dim, N: Dim, W: BlockDim> BinaryDifferentiable<F>
    for MatMul<F, G, M, K, N, W>
{
    type Lhs = St<F, M, K, W>;
    type Rhs = St<F, K, N, W>;
    type Output = St<F, M, N, W>;

    fn apply(&self, a: &St<F, M, K, W>, b: &St<F, K, N, W>) -> St<F, M, N, W> {
        tile_matmul_out::<F, M, K, N, W, G>(self.gemm, a, b)
    }

    fn accumulate_adjoint(
        &self,
        a: &St<F, M, K, W>,
        b: &St<F, K, N, W>,
        adj_c: &St<F, M, N, W>,
        adj_a: &mut St<F, M, K, W>,
        adj_b: &mut St<F, K, N, W>,
    ) {
        adj_tile_matmul::<F, M, K, N, W, G>(self.gemm, a, b, adj_a, adj_b, adj_c);
    }
}

#[derive(CubeType)]
pub struct Transpose<F: Numeric, R: Dim, C: Dim, W: BlockDim> {
    #[cube(comptime)]
    _phantom: PhantomData<(F, R, C, W)>,
}

#[cube]
impl<F: Numeric, R: Dim, C: Dim, W: BlockDim> Transpose<F, R, C, W> {
    pub fn new() -> Transpose<F, R, C, W> {
        Transpose::<F, R, C, W> { _phantom: PhantomData }
    }
}

#[cube]
impl<F: Numeric, R: Dim, C: Dim, W: BlockDim> UnaryDifferentiable<F> for Transpose<F, R, C, W> {
    type Input = St<F, R, C, W>;
    type Output = St<F, C, R, W>;

    fn apply(&self, st: &St<F, R, C, W>) -> St<F, C, R, W> {
        st.transpose()
    }

    fn accumulate_adjoint(&self, _st: &St<F, R, C, W>, adj_output: &St<F, C, R, W>, adj_st: &mut St<F, R, C, W>) {
        adj_tile_transpose::<F, R, C, W, St<F, R, C, W>>(adj_st, adj_output);
    }
}

/// Broadcast of an `R x C` shared tile to `R2 x C2` with the given strides.
///
/// The output adjoint must be allocated with the same strides, e.g. with
/// [`St::zeros_strided`].
#[derive(CubeType)]
pub struct Broadcast<F: Numeric, R: Dim, C: Dim, R2: Dim, C2: Dim, W: BlockDim> {
    #[cube(comptime)]
    stride_m: usize,
    #[cube(comptime)]
    stride_n: usize,
    #[cube(comptime)]
    _phantom: PhantomData<(F, R, C, R2, C2, W)>,
}

#[cube]
impl<F: Numeric, R: Dim, C: Dim, R2: Dim, C2: Dim, W: BlockDim> Broadcast<F, R, C, R2, C2, W> {
    pub fn new(#[comptime] stride_m: usize, #[comptime] stride_n: usize) -> Broadcast<F, R, C, R2, C2, W> {
        Broadcast::<F, R, C, R2, C2, W> {
            stride_m,
            stride_n,
            _phantom: PhantomData,
        }
    }
}

#[cube]
impl<F: Numeric, R: Dim, C: Dim, R2: Dim, C2: Dim, W: BlockDim> UnaryDifferentiable<F>
    for Broadcast<F, R, C, R2, C2, W>
{
    type Input = St<F, R, C, W>;
    type Output = St<F, R2, C2, W>;

    fn apply(&self, st: &St<F, R, C, W>) -> St<F, R2, C2, W> {
        tile_broadcast::<F, R, C, R2, C2, W>(st, comptime!(self.stride_m), comptime!(self.stride_n))
    }

    fn accumulate_adjoint(&self, _st: &St<F, R, C, W>, adj_output: &St<F, R2, C2, W>, adj_st: &mut St<F, R, C, W>) {
        adj_tile_broadcast::<F, R, C, R2, C2, W>(adj_st, adj_output);
    }
}

/// Scalar element `(i, j)` of a register tile.
#[derive(CubeType)]
pub struct Extract<F: Numeric, R: Dim, C: Dim, W: BlockDim> {
    pub i: usize,
    pub j: usize,
    #[cube(comptime)]
    _phantom: PhantomData<(F, R, C, W)>,
}

#[cube]
impl<F: Numeric, R: Dim, C: Dim, W: BlockDim> Extract<F, R, C, W> {
    pub fn new(i: usize, j: usize) -> Extract<F, R, C, W> {
        Extract::<F, R, C, W> {
            i,
            j,
            _phantom: PhantomData,
        }
    }
}

#[cube]
impl<F: Numeric, R: Dim, C: Dim, W: BlockDim> UnaryDifferentiable<F> for Extract<F, R, C, W> {
    type Input = Rt<F, R, C, W>;
    type Output = F;

    fn apply(&self, rt: &Rt<F, R, C, W>) -> F {
        rt.extract(self.i, self.j)
    }

    fn accumulate_adjoint(&self, _rt: &Rt<F, R, C, W>, adj_output: &F, adj_rt: &mut Rt<F, R, C, W>) {
        adj_rt.adj_extract(self.i, self.j, *adj_output);
    }
}

/// Cube-wide sum of a register tile.
#[derive(CubeType)]
pub struct Sum<F: Numeric, R: Dim, C: Dim, W: BlockDim> {
    #[cube(comptime)]
    _phantom: PhantomData<(F, R, C, W)>,
}

#[cube]
impl<F: Numeric, R: Dim, C: Dim, W: BlockDim> Sum<F, R, C, W> {
    pub fn new() -> Sum<F, R, C, W> {
        Sum::<F, R, C, W> { _phantom: PhantomData }
    }
}

#[cube]
impl<F: Numeric, R: Dim, C: Dim, W: BlockDim> UnaryDifferentiable<F> for Sum<F, R, C, W> {
    type Input = Rt<F, R, C, W>;
    type Output = Rt<F, D1, D1, W>;

    fn apply(&self, rt: &Rt<F, R, C, W>) -> Rt<F, D1, D1, W> {
        tile_sum::<F, R, C, W, Rt<F, R, C, W>>(rt)
    }

    fn accumulate_adjoint(&self, _rt: &Rt<F, R, C, W>, adj_output: &Rt<F, D1, D1, W>, adj_rt: &mut Rt<F, R, C, W>) {
        adj_tile_sum::<F, R, C, W, Rt<F, R, C, W>, Rt<F, D1, D1, W>>(adj_rt, adj_output);
    }
}
