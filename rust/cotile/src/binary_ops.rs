use cubecl::prelude::*;

/// A binary scalar operator with its reverse-mode derivative.
#[cube]
pub trait BinaryOp<F: Numeric> {
    fn apply(&self, a: F, b: F) -> F;

    /// `d apply / da * adj_y`. The caller accumulates it.
    fn adjoint_a(&self, a: F, b: F, adj_y: F) -> F;

    /// `d apply / db * adj_y`. The caller accumulates it.
    fn adjoint_b(&self, a: F, b: F, adj_y: F) -> F;
}

/// Defines a [`BinaryOp`] from a forward expression and its two partials.
///
/// ```ignore
/// binary_op! {
///     pub Hypot2<F: Float>(a, b) => a * a + b * b,
///         d(dy) => (F::new(2.0) * a * dy, F::new(2.0) * b * dy);
/// }
/// ```
#[macro_export]
macro_rules! binary_op {
    {
        $vis:vis $name:ident<$t:ident: $bound:ident>($a:ident, $b:ident) => $body:expr, d($adj:ident) => ($grad_a:expr, $grad_b:expr $(,)?);
    } => {
        #[derive(::cubecl::prelude::CubeType)]
        $vis struct $name;

        // The CubeType derive doesn't handle unit structs too nicely,
        // so we have to hand-impl this
        $crate::__paste::paste! {
            impl From<$name> for [<$name Expand>] {
                fn from(_: $name) -> Self {
                    [<$name Expand>] {}
                }
            }
        }

        #[::cubecl::prelude::cube]
        impl<$t: ::cubecl::prelude::$bound> $crate::binary_ops::BinaryOp<$t> for $name {
            fn apply(&self, $a: $t, $b: $t) -> $t {
                $body
            }

            fn adjoint_a(&self, $a: $t, $b: $t, $adj: $t) -> $t {
                $grad_a
            }

            fn adjoint_b(&self, $a: $t, $b: $t, $adj: $t) -> $t {
                $grad_b
            }
        }
    };
}

macro_rules! impl_binary_ops {
    {
        $bound:ident;
        $(
            $name:ident<$t:ident>($a:ident, $b:ident) => $body:expr, d($adj:ident) => ($grad_a:expr, $grad_b:expr);
        )+
    } => {
        $(
            ::paste::paste! {
                $crate::binary_op! {
                    pub [<$name Op>]<$t: $bound>($a, $b) => $body, d($adj) => ($grad_a, $grad_b);
                }
            }
        )+
    };
}

impl_binary_ops! {
    Numeric;

    Add<F>(a, b) => a + b, d(dy) => (dy, dy);
    Sub<F>(a, b) => a - b, d(dy) => (dy, F::from_int(0) - dy);
    Mul<F>(a, b) => a * b, d(dy) => (b * dy, a * dy);
    // ties route the gradient to the first operand
    Min<F>(a, b) => select(a <= b, a, b), d(dy) => (select(a <= b, dy, F::from_int(0)), select(a <= b, F::from_int(0), dy));
    Max<F>(a, b) => select(a >= b, a, b), d(dy) => (select(a >= b, dy, F::from_int(0)), select(a >= b, F::from_int(0), dy));
}

impl_binary_ops! {
    Float;

    Div<F>(a, b) => a / b, d(dy) => (dy / b, F::new(0.0) - a * dy / (b * b));
}
