//! The tile operation library. Every forward operation has an `adj_`
//! counterpart that accumulates into the caller's adjoint storage.
//!
//! All operations are cooperative: every unit of the cube calls them with the
//! same arguments.

pub mod broadcast;
mod construct;
mod fft;
mod load;
mod map;
mod mma;
mod reduce;
mod store;

#[cfg(test)]
mod tests;

pub use broadcast::*;
pub use construct::*;
pub use fft::*;
pub use load::*;
pub use map::*;
pub use mma::*;
pub use reduce::*;
pub use store::*;

pub use crate::global::{tile_load, tile_load_2d};
