//! Host-side launch checks for single-cube tile kernels.
//!
//! A [`BlockLaunch`] validates a [`BlockConfig`] against the cube width `W`
//! and the shared tiles a kernel declares, then hands out the `CubeDim` /
//! `CubeCount` pair to launch with.

use std::{fmt::Debug, marker::PhantomData, mem::size_of};

use cubecl::prelude::*;
use tracing::{debug, error, trace};

use crate::{
    config::{BlockConfig, ConfigError},
    tiles::{BlockDim, Dim, layout::strided_len},
};

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("kernel launch failed: {0}")]
    Launch(String),
}

/// A validated launch shape for kernels running on one cube of `W` units.
#[derive(Debug, Clone)]
pub struct BlockLaunch<W: BlockDim> {
    config: BlockConfig,
    shared_bytes: usize,
    _phantom: PhantomData<W>,
}

impl<W: BlockDim> BlockLaunch<W> {
    pub fn new(config: BlockConfig) -> Result<Self, LaunchError> {
        config.validate()?;
        config.check_block_dim(W::VALUE)?;
        Ok(Self {
            config,
            shared_bytes: 0,
            _phantom: PhantomData,
        })
    }

    pub fn config(&self) -> &BlockConfig {
        &self.config
    }

    /// Shared memory reserved so far, in bytes.
    pub fn shared_bytes(&self) -> usize {
        self.shared_bytes
    }

    /// Reserve a contiguous `R x C` shared tile of `F`.
    pub fn with_shared_tile<F: CubePrimitive, R: Dim, C: Dim>(self) -> Result<Self, LaunchError> {
        self.with_shared_strided::<F, R, C>(C::VALUE, 1)
    }

    /// Reserve the physical storage of an `R x C` shared tile with the given
    /// strides.
    pub fn with_shared_strided<F: CubePrimitive, R: Dim, C: Dim>(
        mut self,
        stride_m: usize,
        stride_n: usize,
    ) -> Result<Self, LaunchError> {
        let bytes = strided_len(R::VALUE, C::VALUE, stride_m, stride_n) * size_of::<F>();
        self.shared_bytes += bytes;
        self.config.check_shared_bytes(self.shared_bytes)?;
        trace!(
            "{}: reserved {} shared bytes, {} total",
            self.config.name, bytes, self.shared_bytes
        );
        Ok(self)
    }

    pub fn cube_dim(&self) -> CubeDim {
        CubeDim::new_1d(W::VALUE as u32)
    }

    pub fn cube_count(&self) -> CubeCount {
        CubeCount::Static(1, 1, 1)
    }

    /// Run a kernel launch closure with this shape, logging the outcome.
    pub fn run<T, E: Debug>(
        &self,
        launch: impl FnOnce(CubeCount, CubeDim) -> Result<T, E>,
    ) -> Result<T, LaunchError> {
        debug!(
            "{}: launching with {} units, {} shared bytes",
            self.config.name,
            W::VALUE,
            self.shared_bytes
        );
        match launch(self.cube_count(), self.cube_dim()) {
            Ok(out) => {
                debug!("{}: launch finished", self.config.name);
                Ok(out)
            }
            Err(e) => {
                error!("{}: launch failed: {:?}", self.config.name, e);
                Err(LaunchError::Launch(format!("{e:?}")))
            }
        }
    }
}
