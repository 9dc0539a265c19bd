use cubecl::prelude::*;

use crate::tiles::{BlockDim, Dim, Rt, RtExpand};

/// A scalar operator with its reverse-mode derivative.
#[cube]
pub trait UnaryOp<F: Numeric> {
    fn apply(&self, x: F) -> F;

    /// `d apply / dx * adj_y`. The caller accumulates it.
    fn adjoint(&self, x: F, adj_y: F) -> F;
}

/// Defines a [`UnaryOp`] from a forward expression and its adjoint.
///
/// ```ignore
/// unary_op! {
///     pub Square<F: Float>(x) => x * x, d(dy) => F::new(2.0) * x * dy;
/// }
/// unary_op! {
///     pub Scale<F: Numeric>(x, s) => x * s, d(dy) => s * dy;
/// }
/// ```
///
/// The stateful form gets a `new(s)` constructor.
#[macro_export]
macro_rules! unary_op {
    {
        $vis:vis $name:ident<$t:ident: $bound:ident>($input:ident, $state:ident) => $body:expr, d($adj:ident) => $grad:expr;
    } => {
        #[derive(::cubecl::prelude::CubeType)]
        $vis struct $name<$t: ::cubecl::prelude::$bound> {
            value: $t,
        }

        #[::cubecl::prelude::cube]
        impl<$t: ::cubecl::prelude::$bound> $name<$t> {
            pub fn new(value: $t) -> Self {
                $name::<$t> { value }
            }
        }

        #[::cubecl::prelude::cube]
        impl<$t: ::cubecl::prelude::$bound> $crate::unary_ops::UnaryOp<$t> for $name<$t> {
            fn apply(&self, $input: $t) -> $t {
                let $state = self.value;
                $body
            }

            fn adjoint(&self, $input: $t, $adj: $t) -> $t {
                let $state = self.value;
                $grad
            }
        }
    };
    {
        $vis:vis $name:ident<$t:ident: $bound:ident>($input:ident) => $body:expr, d($adj:ident) => $grad:expr;
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
        impl<$t: ::cubecl::prelude::$bound> $crate::unary_ops::UnaryOp<$t> for $name {
            fn apply(&self, $input: $t) -> $t {
                $body
            }

            fn adjoint(&self, $input: $t, $adj: $t) -> $t {
                $grad
            }
        }
    };
}

macro_rules! impl_unary_ops {
    {
        $bound:ident;
        $(
            $name:ident<$t:ident>($input:ident $(, $state:ident)?) => $body:expr, d($adj:ident) => $grad:expr;
        )+
    } => {
        $(
            ::paste::paste! {
                $crate::unary_op! {
                    pub [<$name Op>]<$t: $bound>($input $(, $state)?) => $body, d($adj) => $grad;
                }
            }
        )+
    };
}

macro_rules! impl_convenience_fns {
    {
        $bound:ident;
        $(
            $name:ident<$t:ident>($input:ident $(, $state:ident)?) => $body:expr, d($adj:ident) => $grad:expr;
        )+
    }
    => {
        ::paste::paste! {
            $(
                #[cube]
                impl<$t: $bound, R: Dim, C: Dim, W: BlockDim> Rt<$t, R, C, W> {
                    pub fn [<$name:snake>](&mut self $(, $state: $t)?) {
                        self.apply_unary_op::
                        <
                            impl_convenience_fns! { @generic [<$name Op>] <$t> $(, $state)? }
                        >
                        ([<$name Op>] $( ::new ($state))?);
                    }
                }
            )+
        }
    };

    { @generic $i:ident <$t:ty> , $state:ident } => { $i <$t> };
    { @generic $i:ident <$t:ty> } => { $i };
}

macro_rules! with_numeric_ops {
    ($callback:ident) => {
        $callback! {
            Numeric;

            // just -x seems to cause issues
            Neg<F>(x) => F::from_int(0) - x, d(dy) => F::from_int(0) - dy;

            AddScalar<F>(x, s) => x + s, d(dy) => dy;
            MulScalar<F>(x, s) => x * s, d(dy) => s * dy;
        }
    };
}

macro_rules! with_float_ops {
    ($callback:ident) => {
        $callback! {
            Float;

            Exp<F>(x) => F::exp(x), d(dy) => F::exp(x) * dy;
            Log<F>(x) => F::ln(x), d(dy) => dy / x;
            Sqrt<F>(x) => F::sqrt(x), d(dy) => dy / (F::new(2.0) * F::sqrt(x));

            Sin<F>(x) => F::sin(x), d(dy) => F::cos(x) * dy;
            Cos<F>(x) => F::cos(x), d(dy) => F::new(0.0) - F::sin(x) * dy;
            Tanh<F>(x) => F::tanh(x), d(dy) => tanh_bwd::<F>(x) * dy;

            Sigmoid<F>(x) => sigmoid::<F>(x), d(dy) => sigmoid_bwd::<F>(x) * dy;
            Relu<F>(x) => select(x > F::new(0.0), x, F::new(0.0)), d(dy) => select(x > F::new(0.0), dy, F::new(0.0));
            Gelu<F>(x) => gelu::<F>(x), d(dy) => gelu_bwd::<F>(x) * dy;
        }
    };
}

with_numeric_ops!(impl_unary_ops);
with_numeric_ops!(impl_convenience_fns);
with_float_ops!(impl_unary_ops);
with_float_ops!(impl_convenience_fns);

const GELU_SQRT_2_OVER_PI: f32 = 0.797_884_6;
const GELU_COEFF: f32 = 0.044715;

#[cube]
pub fn tanh_bwd<F: Float>(x: F) -> F {
    let t = F::tanh(x);
    F::new(1.0) - t * t
}

#[cube]
pub fn sigmoid<F: Float>(x: F) -> F {
    F::new(1.0) / (F::new(1.0) + F::exp(F::new(0.0) - x))
}

#[cube]
pub fn sigmoid_bwd<F: Float>(x: F) -> F {
    let s = sigmoid::<F>(x);
    s * (F::new(1.0) - s)
}

/// Tanh approximation of GELU.
#[cube]
pub fn gelu<F: Float>(x: F) -> F {
    let sqrt_2_over_pi = F::new(GELU_SQRT_2_OVER_PI);
    let coeff = F::new(GELU_COEFF);

    let x3 = x * x * x;
    let inner = sqrt_2_over_pi * (x + coeff * x3);
    x * F::new(0.5) * (F::new(1.0) + F::tanh(inner))
}

#[cube]
pub fn gelu_bwd<F: Float>(x: F) -> F {
    let sqrt_2_over_pi = F::new(GELU_SQRT_2_OVER_PI);
    let coeff = F::new(GELU_COEFF);
    let half = F::new(0.5);

    let x2 = x * x;
    let inner = sqrt_2_over_pi * (x + coeff * x2 * x);
    let tanh_inner = F::tanh(inner);
    let sech2_inner = F::new(1.0) - tanh_inner * tanh_inner;
    let dinner_dx = sqrt_2_over_pi * (F::new(1.0) + F::new(3.0) * coeff * x2);
    half * (F::new(1.0) + tanh_inner) + half * x * sech2_inner * dinner_dx
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::{
        test_utils::{DeviceTensor, TestRuntime, client},
        tiles::{D1, D4},
    };

    const OPS: usize = 11;

    /// Forward at `x + h`, forward at `x - h`, and the adjoint at `x`.
    #[cube]
    fn record<F: Float, O: UnaryOp<F>>(op: O, x: F, h: F, out: &mut Tensor<F>, #[comptime] slot: usize) {
        out[slot * 3] = op.apply(x + h);
        out[slot * 3 + 1] = op.apply(x - h);
        out[slot * 3 + 2] = op.adjoint(x, F::new(1.0));
    }

    #[cube(launch)]
    fn finite_differences<F: Float>(input: &Tensor<F>, out: &mut Tensor<F>) {
        if UNIT_POS == 0 {
            let x = input[0];
            let positive = input[1];
            let h = input[2];

            record::<F, NegOp>(NegOp, x, h, out, 0usize);
            record::<F, ExpOp>(ExpOp, x, h, out, 1usize);
            record::<F, SinOp>(SinOp, x, h, out, 2usize);
            record::<F, CosOp>(CosOp, x, h, out, 3usize);
            record::<F, TanhOp>(TanhOp, x, h, out, 4usize);
            record::<F, SigmoidOp>(SigmoidOp, x, h, out, 5usize);
            record::<F, GeluOp>(GeluOp, x, h, out, 6usize);
            record::<F, AddScalarOp<F>>(AddScalarOp::<F>::new(F::new(3.0)), x, h, out, 7usize);
            record::<F, MulScalarOp<F>>(MulScalarOp::<F>::new(F::new(-0.5)), x, h, out, 8usize);
            record::<F, LogOp>(LogOp, positive, h, out, 9usize);
            record::<F, SqrtOp>(SqrtOp, positive, h, out, 10usize);
        }
    }

    #[test_case(-1.3)]
    #[test_case(0.2)]
    #[test_case(2.5)]
    fn builtin_adjoints_match_finite_differences(x: f32) {
        let client = client();
        let h = 1e-2f32;
        let input = DeviceTensor::from_slice(&client, &[x, x.abs(), h], &[3]);
        let out = DeviceTensor::<f32>::zeros(&client, &[OPS * 3]);

        finite_differences::launch::<f32, TestRuntime>(
            &client,
            CubeCount::Static(1, 1, 1),
            CubeDim::new_1d(1),
            input.arg(),
            out.arg(),
        )
        .expect("Kernel launch failed");

        let out = out.read(&client);
        for (op, v) in out.chunks(3).enumerate() {
            let numeric = (v[0] - v[1]) / (2.0 * h);
            let adj = v[2];
            assert!(
                (numeric - adj).abs() < 1e-2 * (1.0 + numeric.abs()),
                "op {op}: {numeric} vs {adj} at {x}"
            );
        }
    }

    #[cube(launch)]
    fn relu_mask(out: &mut Tensor<f32>) {
        out[0] = ReluOp.adjoint(-1.0, 4.0);
        out[1] = ReluOp.adjoint(2.0, 4.0);
        out[2] = ReluOp.apply(-3.0);
    }

    #[test]
    fn relu_gradient_is_masked() {
        let client = client();
        let out = DeviceTensor::<f32>::zeros(&client, &[3]);
        relu_mask::launch::<TestRuntime>(&client, CubeCount::Static(1, 1, 1), CubeDim::new_1d(1), out.arg())
            .expect("Kernel launch failed");
        assert_eq!(out.read(&client), vec![0.0, 4.0, 0.0]);
    }

    unary_op! {
        Square<F: Float>(x) => x * x, d(dy) => F::new(2.0) * x * dy;
    }

    #[cube(launch)]
    fn user_op(out: &mut Tensor<f32>) {
        out[0] = Square.apply(3.0);
        out[1] = Square.adjoint(3.0, 0.5);
    }

    #[test]
    fn macro_defined_operator() {
        let client = client();
        let out = DeviceTensor::<f32>::zeros(&client, &[2]);
        user_op::launch::<TestRuntime>(&client, CubeCount::Static(1, 1, 1), CubeDim::new_1d(1), out.arg())
            .expect("Kernel launch failed");
        assert_eq!(out.read(&client), vec![9.0, 3.0]);
    }

    #[cube(launch)]
    fn convenience_methods(out: &mut Tensor<i32>) {
        let mut rt = Rt::<i32, D1, D4, D4>::filled(2);
        rt.mul_scalar(3);
        rt.add_scalar(-1);
        rt.neg();
        out[UNIT_POS as usize] = rt.data[0];
    }

    #[test]
    fn register_convenience_methods_on_integers() {
        let client = client();
        let out = DeviceTensor::<i32>::zeros(&client, &[4]);
        convenience_methods::launch::<TestRuntime>(
            &client,
            CubeCount::Static(1, 1, 1),
            CubeDim::new_1d(4),
            out.arg(),
        )
        .expect("Kernel launch failed");
        assert_eq!(out.read(&client), vec![-5; 4]);
    }
}
