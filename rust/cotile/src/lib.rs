//! Cotile - cooperative fixed-shape tiles with reverse-mode adjoints, for CubeCL.
//!
//! A cube of `W` units manipulates small 2D tiles together. Every tile
//! operation is called by all units with the same arguments, and every forward
//! operation has an `adj_` counterpart that accumulates gradients into
//! caller-provided adjoint storage.
//!
//! # Core Abstractions
//!
//! ## Tiles (`tiles` module)
//! - [`Rt<F, R, C, W>`](tiles::Rt) - register tile, distributed cyclically:
//!   unit `t` owns linear elements `t, t + W, t + 2W, ...`
//! - [`St<F, R, C, W>`](tiles::St) - shared memory tile with compile-time
//!   strides; transpose and broadcast are zero-copy aliases
//! - [`GlobalTile`](global::GlobalTile) - which tile of a global tensor an
//!   access addresses
//! - [`Dim`](tiles::Dim) / [`BlockDim`](tiles::BlockDim) - compile-time
//!   extents and cube widths
//!
//! ## Cooperative Operations (`cube` module)
//! - `tile_load*` / `tile_store*` / `tile_atomic_add` - global memory traffic
//! - `tile_map` / `tile_map2` - elementwise operators from `unary_ops` and
//!   `binary_ops`, or user operators
//! - `tile_matmul*` - through an injected [`Gemm`](cube::Gemm)
//! - `tile_transpose` / `tile_broadcast` / `tile_extract` / `tile_sum`
//! - `tile_fft` / `tile_ifft` - through an injected
//!   [`Transform`](cube::Transform)
//!
//! # Memory Model
//!
//! ```text
//! Tensor ──tile_load──► Rt / St ──ops──► Rt / St ──tile_store / tile_atomic_add──► Tensor
//! ```
//!
//! Writes to shared memory become visible to other units after `sync_cube()`.
//! Every mutating `St` operation ends with one, so kernels only add barriers
//! around raw [`St::set`](tiles::St::set) writes and global stores.
//!
//! # Example
//!
//! ```ignore
//! #[cube(launch)]
//! fn double<F: Float>(input: &Tensor<F>, output: &mut Tensor<F>) {
//!     let mut st = St::<F, D4, D4, D8>::new();
//!     st.load(input, &tile_load_2d(0, 0));
//!     let doubled = tile_map::<F, D4, D4, D8, St<F, D4, D4, D8>, MulScalarOp<F>>(
//!         MulScalarOp::new(F::new(2.0)),
//!         &st,
//!     );
//!     tile_store_2d::<F, D4, D4, D8, Rt<F, D4, D4, D8>>(output, 0, 0, &doubled);
//! }
//! ```

#![allow(
    clippy::identity_op,
    reason = "For `addr + 0`, it makes some stuff cleaner to read"
)]
#![allow(
    clippy::len_without_is_empty,
    reason = "Empty tiles aren't a thing, so this method would be confusing"
)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::new_without_default)]
#![allow(clippy::too_many_arguments)]

pub mod binary_ops;
pub mod config;
pub mod cube;
pub mod differentiable;
pub mod global;
pub mod launch;
pub mod tiles;
pub mod unary_ops;

#[cfg(any(test, feature = "test-utils"))]
#[macro_use]
pub mod test_utils;

#[doc(hidden)]
pub use paste as __paste;

/// Maximum loop iteration count to unconditionally unroll (general/outer loops)
pub const UNROLL_LIMIT: usize = 1;
/// Maximum loop iteration count to unconditionally unroll (hot/inner loops)
pub const UNROLL_LIMIT_HOT: usize = 4;

pub mod prelude {
    pub use crate::{
        UNROLL_LIMIT, UNROLL_LIMIT_HOT,
        binary_ops::*,
        config::{BlockConfig, ConfigError},
        cube::*,
        differentiable::*,
        global::GlobalTile,
        launch::{BlockLaunch, LaunchError},
        tiles::*,
        unary_ops::*,
    };
}
