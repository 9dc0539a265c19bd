//! Helpers shared by unit tests, benches and the demo.

#![allow(dead_code)]

use std::{
    fmt::Display,
    hash::{DefaultHasher, Hasher},
    marker::PhantomData,
};

use cubecl::{prelude::*, server::Handle};
use half::{bf16, f16};
use rand::{Rng, SeedableRng, rngs::StdRng};

#[cfg(all(
    any(test, feature = "test-utils"),
    not(any(feature = "cuda", feature = "rocm", feature = "wgpu", feature = "cpu"))
))]
pub type TestRuntime = compile_error!(
    "At least one backend must be enabled for test-utils, please run with `--features cuda/rocm/wgpu/cpu`"
);

#[cfg(feature = "rocm")]
pub type TestRuntime = cubecl::hip::HipRuntime;

#[cfg(feature = "cuda")]
pub type TestRuntime = cubecl::cuda::CudaRuntime;

#[cfg(feature = "wgpu")]
pub type TestRuntime = cubecl::wgpu::WgpuRuntime;

#[cfg(feature = "cpu")]
pub type TestRuntime = cubecl::cpu::CpuRuntime;

pub type TestClient = ComputeClient<TestRuntime>;

pub fn client() -> TestClient {
    TestRuntime::client(&<TestRuntime as cubecl::Runtime>::Device::default())
}

pub fn upload<F: CubeElement>(client: &TestClient, data: &[F]) -> Handle {
    client.create_from_slice(F::as_bytes(data))
}

pub fn download<F: CubeElement>(client: &TestClient, handle: Handle) -> Vec<F> {
    F::from_bytes(&client.read_one(handle)).to_vec()
}

pub fn get_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * shape[i + 1];
    }
    strides
}

/// A device buffer viewed as a tensor, possibly with non-contiguous strides.
///
/// `read` returns the whole backing storage, so tests can check that padding
/// between strided rows was left alone.
pub struct DeviceTensor<F: CubeElement> {
    pub handle: Handle,
    pub shape: Vec<usize>,
    pub strides: Vec<usize>,
    _phantom: PhantomData<F>,
}

impl<F: CubeElement> DeviceTensor<F> {
    /// Contiguous tensor holding `data`.
    pub fn from_slice(client: &TestClient, data: &[F], shape: &[usize]) -> Self {
        assert_eq!(data.len(), shape.iter().product::<usize>(), "shape does not match data");
        Self::strided(client, data, shape, &get_strides(shape))
    }

    pub fn zeros(client: &TestClient, shape: &[usize]) -> Self
    where
        F: Default,
    {
        let len = shape.iter().product();
        Self::from_slice(client, &vec![F::default(); len], shape)
    }

    /// Tensor over raw `storage` with explicit element strides.
    pub fn strided(client: &TestClient, storage: &[F], shape: &[usize], strides: &[usize]) -> Self {
        assert_eq!(shape.len(), strides.len(), "rank mismatch");
        let extent = shape
            .iter()
            .zip(strides)
            .map(|(&d, &s)| d.saturating_sub(1) * s)
            .sum::<usize>()
            + 1;
        assert!(extent <= storage.len(), "strides reach past the storage");
        Self {
            handle: upload(client, storage),
            shape: shape.to_vec(),
            strides: strides.to_vec(),
            _phantom: PhantomData,
        }
    }

    pub fn arg(&self) -> TensorArg<'_, TestRuntime>
    where
        F: CubePrimitive,
    {
        unsafe { TensorArg::from_raw_parts::<F>(&self.handle, &self.strides, &self.shape, 1) }
    }

    pub fn read(&self, client: &TestClient) -> Vec<F> {
        download(client, self.handle.clone())
    }
}

pub fn string_to_seed(s: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    hasher.write(s.as_bytes());
    hasher.finish()
}

/// Deterministic generator keyed by a test name.
pub fn rng_for(name: &str) -> StdRng {
    StdRng::seed_from_u64(string_to_seed(name))
}

pub fn range_vec<F: TestFloat>(len: usize) -> Vec<F> {
    (0..len).map(|i| F::from_f64(i as f64)).collect()
}

pub fn random_vec<F: TestFloat>(rng: &mut StdRng, len: usize, start: f64, end: f64) -> Vec<F> {
    (0..len)
        .map(|_| F::from_f64(rng.random_range(start..end)))
        .collect()
}

/// Row-major `a (m x k) @ b (k x n)`, accumulated in f64.
pub fn host_matmul<F: TestFloat>(a: &[F], b: &[F], m: usize, k: usize, n: usize) -> Vec<F> {
    assert_eq!(a.len(), m * k);
    assert_eq!(b.len(), k * n);
    let mut c = Vec::with_capacity(m * n);
    for i in 0..m {
        for j in 0..n {
            let acc: f64 = (0..k)
                .map(|p| a[i * k + p].into_f64() * b[p * n + j].into_f64())
                .sum();
            c.push(F::from_f64(acc));
        }
    }
    c
}

pub fn approx_eq<F: TestFloat>(actual: F, expected: F) -> bool {
    let (a, e) = (actual.into_f64(), expected.into_f64());
    (a - e).abs() <= F::atol() + F::rtol() * e.abs()
}

/// Assert slices are approximately equal, reporting every mismatch.
pub fn slices_eq<F: TestFloat>(actual: &[F], expected: &[F], ctx: &str) {
    assert_eq!(actual.len(), expected.len(), "{ctx}: length mismatch");

    let mut passed = true;
    for (i, (&a, &e)) in actual.iter().zip(expected).enumerate() {
        if !approx_eq(a, e) {
            passed = false;
            println!("{ctx}[{i}] mismatch: expected {e}, got {a}");
        }
    }

    if !passed {
        panic!("{ctx} mismatch");
    }
}

pub trait TestFloat: CubeElement + CubePrimitive + Float + Copy + Display {
    fn into_f64(self) -> f64;
    fn from_f64(v: f64) -> Self;
    fn rtol() -> f64;
    fn atol() -> f64;
}

impl TestFloat for f64 {
    fn into_f64(self) -> f64 {
        self
    }
    fn from_f64(v: f64) -> Self {
        v
    }
    fn rtol() -> f64 {
        1e-12
    }
    fn atol() -> f64 {
        1e-12
    }
}

impl TestFloat for f32 {
    fn into_f64(self) -> f64 {
        self as f64
    }
    fn from_f64(v: f64) -> Self {
        v as f32
    }
    fn rtol() -> f64 {
        1e-4
    }
    fn atol() -> f64 {
        1e-4
    }
}

impl TestFloat for f16 {
    fn into_f64(self) -> f64 {
        self.to_f64()
    }
    fn from_f64(v: f64) -> Self {
        f16::from_f64(v)
    }
    fn rtol() -> f64 {
        1e-2
    }
    fn atol() -> f64 {
        1e-2
    }
}

impl TestFloat for bf16 {
    fn into_f64(self) -> f64 {
        self.to_f64()
    }
    fn from_f64(v: f64) -> Self {
        bf16::from_f64(v)
    }
    fn rtol() -> f64 {
        5e-2
    }
    fn atol() -> f64 {
        5e-2
    }
}
