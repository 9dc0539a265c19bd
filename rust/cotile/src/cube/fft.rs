//! Batched transforms over register tiles through an injected kernel.
//!
//! A register tile's fragment is split into consecutive batches of
//! `ELEMENTS_PER_THREAD` registers. Every unit calls the transform once per
//! batch on its own slice, followed by a barrier, so the transform may
//! cooperate across units through its shared scratch.

use cubecl::prelude::*;

use crate::tiles::{BlockDim, Dim, Rt};

/// Sizes a [`Transform`] needs, known when the kernel is expanded.
pub trait TransformDims: Send + Sync + 'static {
    /// Registers handed to each call.
    const ELEMENTS_PER_THREAD: usize;
    /// Elements of cube-shared scratch the transform may use.
    const SHARED_MEMORY_LEN: usize;
}

/// A fixed-size transform kernel, such as a complex FFT of a given length.
///
/// Both directions are called by every unit of the cube with its own
/// `data`; `UNIT_POS` tells the implementation which part of a cooperative
/// transform it is running.
#[cube]
pub trait Transform<F: Numeric>: TransformDims {
    fn forward(data: &mut Array<F>, scratch: &mut SharedMemory<F>);

    fn inverse(data: &mut Array<F>, scratch: &mut SharedMemory<F>);
}

/// Number of transform calls per unit for a fragment of `num_regs` registers.
pub fn batch_count(num_regs: usize, elements_per_thread: usize) -> usize {
    assert!(elements_per_thread > 0, "transform processes no elements");
    assert!(
        num_regs % elements_per_thread == 0,
        "fragment of {num_regs} registers is not a multiple of {elements_per_thread} elements per batch"
    );
    num_regs / elements_per_thread
}

#[cube]
fn run_transform<F: Numeric, R: Dim, C: Dim, W: BlockDim, T: Transform<F>>(
    rt: &mut Rt<F, R, C, W>,
    #[comptime] inverse: bool,
) {
    let ept = comptime!(T::ELEMENTS_PER_THREAD);
    let batches = comptime!(batch_count(Rt::<F, R, C, W>::len(), T::ELEMENTS_PER_THREAD));
    let mut scratch = SharedMemory::<F>::new(comptime!(T::SHARED_MEMORY_LEN.max(1)));
    let mut slice = Array::<F>::new(ept);

    for b in 0..batches {
        let base = b * ept;
        for k in 0..ept {
            slice[k] = rt.data[base + k];
        }

        if comptime!(inverse) {
            T::inverse(&mut slice, &mut scratch);
        } else {
            T::forward(&mut slice, &mut scratch);
        }

        for k in 0..ept {
            rt.data[base + k] = slice[k];
        }
        // batches share the scratch buffer
        sync_cube();
    }
}

#[cube]
pub fn tile_fft<F: Numeric, R: Dim, C: Dim, W: BlockDim, T: Transform<F>>(rt: &mut Rt<F, R, C, W>) {
    run_transform::<F, R, C, W, T>(rt, false);
}

#[cube]
pub fn tile_ifft<F: Numeric, R: Dim, C: Dim, W: BlockDim, T: Transform<F>>(rt: &mut Rt<F, R, C, W>) {
    run_transform::<F, R, C, W, T>(rt, true);
}

/// Reverse of [`tile_fft`]: inverse transform of the adjoint, in place.
#[cube]
pub fn adj_tile_fft<F: Numeric, R: Dim, C: Dim, W: BlockDim, T: Transform<F>>(adj_rt: &mut Rt<F, R, C, W>) {
    run_transform::<F, R, C, W, T>(adj_rt, true);
}

/// Reverse of [`tile_ifft`].
#[cube]
pub fn adj_tile_ifft<F: Numeric, R: Dim, C: Dim, W: BlockDim, T: Transform<F>>(adj_rt: &mut Rt<F, R, C, W>) {
    run_transform::<F, R, C, W, T>(adj_rt, false);
}
