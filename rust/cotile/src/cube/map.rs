use cubecl::prelude::*;

use crate::{
    UNROLL_LIMIT,
    binary_ops::{AddOp, BinaryOp, BinaryOpExpand, MulOp},
    tiles::{BlockDim, Dim, Rt, Tile, TileExpand},
    unary_ops::{NegOp, UnaryOp, UnaryOpExpand},
};

/// Applies `op` to every element of `a`, returning a fresh register tile.
///
/// Padding registers are computed too; stores and accumulations skip them.
#[cube]
pub fn tile_map<F: Numeric, R: Dim, C: Dim, W: BlockDim, A: Tile<F, R, C, W>, O: UnaryOp<F>>(
    op: O,
    a: &A,
) -> Rt<F, R, C, W> {
    // register tiles hand out their own fragment, so copy before mutating
    let mut out = Rt::<F, R, C, W>::new();
    out.copy_from(&a.copy_to_register());
    out.apply_unary_op::<O>(op);
    out
}

/// Elementwise `op(a, b)`.
#[cube]
pub fn tile_map2<
    F: Numeric,
    R: Dim,
    C: Dim,
    W: BlockDim,
    A: Tile<F, R, C, W>,
    B: Tile<F, R, C, W>,
    O: BinaryOp<F>,
>(
    op: O,
    a: &A,
    b: &B,
) -> Rt<F, R, C, W> {
    let mut out = Rt::<F, R, C, W>::new();
    out.copy_from(&a.copy_to_register());
    out.apply_binary_op::<O>(op, &b.copy_to_register());
    out
}

/// Reverse of [`tile_map`]: accumulates `op`'s input gradient into `adj_a`.
///
/// Gradients are built in a zeroed register tile first, then added through
/// `adj_a`'s own `add`, which handles aliased shared views.
#[cube]
pub fn adj_tile_map<
    F: Numeric,
    R: Dim,
    C: Dim,
    W: BlockDim,
    A: Tile<F, R, C, W>,
    AdjA: Tile<F, R, C, W>,
    AdjY: Tile<F, R, C, W>,
    O: UnaryOp<F>,
>(
    op: O,
    a: &A,
    adj_a: &mut AdjA,
    adj_ret: &AdjY,
) {
    let a_reg = a.copy_to_register();
    let adj_ret_reg = adj_ret.copy_to_register();
    let mut adj_a_reg = Rt::<F, R, C, W>::new();

    #[unroll(Rt::<F, R, C, W>::len() <= UNROLL_LIMIT)]
    for i in 0..comptime!(Rt::<F, R, C, W>::len()) {
        adj_a_reg.data[i] = op.adjoint(a_reg.data[i], adj_ret_reg.data[i]);
    }

    adj_a.add(&adj_a_reg);
}

/// Reverse of [`tile_map2`].
#[cube]
pub fn adj_tile_map2<
    F: Numeric,
    R: Dim,
    C: Dim,
    W: BlockDim,
    A: Tile<F, R, C, W>,
    B: Tile<F, R, C, W>,
    AdjA: Tile<F, R, C, W>,
    AdjB: Tile<F, R, C, W>,
    AdjY: Tile<F, R, C, W>,
    O: BinaryOp<F>,
>(
    op: O,
    a: &A,
    b: &B,
    adj_a: &mut AdjA,
    adj_b: &mut AdjB,
    adj_ret: &AdjY,
) {
    let mut adj_a_reg = Rt::<F, R, C, W>::new();
    let mut adj_b_reg = Rt::<F, R, C, W>::new();
    binary_adjoint::<F, R, C, W, O>(
        op,
        &a.copy_to_register(),
        &b.copy_to_register(),
        &adj_ret.copy_to_register(),
        &mut adj_a_reg,
        &mut adj_b_reg,
    );
    adj_a.add(&adj_a_reg);
    adj_b.add(&adj_b_reg);
}

#[cube]
fn binary_adjoint<F: Numeric, R: Dim, C: Dim, W: BlockDim, O: BinaryOp<F>>(
    op: O,
    a: &Rt<F, R, C, W>,
    b: &Rt<F, R, C, W>,
    adj_ret: &Rt<F, R, C, W>,
    adj_a: &mut Rt<F, R, C, W>,
    adj_b: &mut Rt<F, R, C, W>,
) {
    #[unroll(Rt::<F, R, C, W>::len() <= UNROLL_LIMIT)]
    for i in 0..comptime!(Rt::<F, R, C, W>::len()) {
        adj_a.data[i] += op.adjoint_a(a.data[i], b.data[i], adj_ret.data[i]);
        adj_b.data[i] += op.adjoint_b(a.data[i], b.data[i], adj_ret.data[i]);
    }
}

#[cube]
pub fn tile_neg<F: Numeric, R: Dim, C: Dim, W: BlockDim, A: Tile<F, R, C, W>>(a: &A) -> Rt<F, R, C, W> {
    tile_map::<F, R, C, W, A, NegOp>(NegOp, a)
}

#[cube]
pub fn adj_tile_neg<
    F: Numeric,
    R: Dim,
    C: Dim,
    W: BlockDim,
    A: Tile<F, R, C, W>,
    AdjA: Tile<F, R, C, W>,
    AdjY: Tile<F, R, C, W>,
>(
    a: &A,
    adj_a: &mut AdjA,
    adj_ret: &AdjY,
) {
    adj_tile_map::<F, R, C, W, A, AdjA, AdjY, NegOp>(NegOp, a, adj_a, adj_ret);
}

#[cube]
pub fn tile_add<F: Numeric, R: Dim, C: Dim, W: BlockDim, A: Tile<F, R, C, W>, B: Tile<F, R, C, W>>(
    a: &A,
    b: &B,
) -> Rt<F, R, C, W> {
    tile_map2::<F, R, C, W, A, B, AddOp>(AddOp, a, b)
}

#[cube]
pub fn adj_tile_add<
    F: Numeric,
    R: Dim,
    C: Dim,
    W: BlockDim,
    A: Tile<F, R, C, W>,
    B: Tile<F, R, C, W>,
    AdjA: Tile<F, R, C, W>,
    AdjB: Tile<F, R, C, W>,
    AdjY: Tile<F, R, C, W>,
>(
    a: &A,
    b: &B,
    adj_a: &mut AdjA,
    adj_b: &mut AdjB,
    adj_ret: &AdjY,
) {
    adj_tile_map2::<F, R, C, W, A, B, AdjA, AdjB, AdjY, AddOp>(AddOp, a, b, adj_a, adj_b, adj_ret);
}

/// `a * s`, with the scalar promoted to a constant tile.
#[cube]
pub fn tile_mul<F: Numeric, R: Dim, C: Dim, W: BlockDim, A: Tile<F, R, C, W>>(a: &A, s: F) -> Rt<F, R, C, W> {
    let s_tile = Rt::<F, R, C, W>::filled(s);
    tile_map2::<F, R, C, W, A, Rt<F, R, C, W>, MulOp>(MulOp, a, &s_tile)
}

/// Reverse of [`tile_mul`].
///
/// Returns this unit's share of the scalar's gradient, summed over its real
/// elements. The caller adds it to its own accumulator and reduces across
/// units if it needs the cube-wide total.
#[cube]
pub fn adj_tile_mul<
    F: Numeric,
    R: Dim,
    C: Dim,
    W: BlockDim,
    A: Tile<F, R, C, W>,
    AdjA: Tile<F, R, C, W>,
    AdjY: Tile<F, R, C, W>,
>(
    a: &A,
    s: F,
    adj_a: &mut AdjA,
    adj_ret: &AdjY,
) -> F {
    let s_tile = Rt::<F, R, C, W>::filled(s);
    let mut adj_a_reg = Rt::<F, R, C, W>::new();
    let mut adj_s_reg = Rt::<F, R, C, W>::new();
    binary_adjoint::<F, R, C, W, MulOp>(
        MulOp,
        &a.copy_to_register(),
        &s_tile,
        &adj_ret.copy_to_register(),
        &mut adj_a_reg,
        &mut adj_s_reg,
    );
    adj_a.add(&adj_a_reg);
    adj_s_reg.partial_sum()
}

/// `s * a`.
#[cube]
pub fn tile_scalar_mul<F: Numeric, R: Dim, C: Dim, W: BlockDim, A: Tile<F, R, C, W>>(
    s: F,
    a: &A,
) -> Rt<F, R, C, W> {
    let s_tile = Rt::<F, R, C, W>::filled(s);
    tile_map2::<F, R, C, W, Rt<F, R, C, W>, A, MulOp>(MulOp, &s_tile, a)
}

/// Reverse of [`tile_scalar_mul`]. Returns this unit's share of the scalar's
/// gradient, like [`adj_tile_mul`].
#[cube]
pub fn adj_tile_scalar_mul<
    F: Numeric,
    R: Dim,
    C: Dim,
    W: BlockDim,
    A: Tile<F, R, C, W>,
    AdjA: Tile<F, R, C, W>,
    AdjY: Tile<F, R, C, W>,
>(
    s: F,
    a: &A,
    adj_a: &mut AdjA,
    adj_ret: &AdjY,
) -> F {
    let s_tile = Rt::<F, R, C, W>::filled(s);
    let mut adj_s_reg = Rt::<F, R, C, W>::new();
    let mut adj_a_reg = Rt::<F, R, C, W>::new();
    binary_adjoint::<F, R, C, W, MulOp>(
        MulOp,
        &s_tile,
        &a.copy_to_register(),
        &adj_ret.copy_to_register(),
        &mut adj_s_reg,
        &mut adj_a_reg,
    );
    adj_a.add(&adj_a_reg);
    adj_s_reg.partial_sum()
}
