/// Marker trait for compile-time tile extents.
/// CubeCL doesn't like const generics, so we improvise.
///
/// Tile shapes are fixed per tile type, so mismatched shapes are rejected by
/// the type checker rather than at run time.
pub trait Dim: Send + Sync + 'static {
    const VALUE: usize;
}

/// Marker trait for compile-time cube widths (number of cooperating units).
///
/// Kernels using a `W` must be launched with `CubeDim::new_1d(W::VALUE)`.
pub trait BlockDim: Dim {}

macro_rules! define_dims {
    ($($name:ident = $value:literal $(+ $block:ident)?;)+) => {
    $(
        #[doc = concat!("Compile-time dimension of ", stringify!($value), ".")]
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
        pub struct $name;
        impl Dim for $name {
            const VALUE: usize = $value;
        }
        $(impl $block for $name {})?
    )+
    };
}

define_dims! {
    D1 = 1 + BlockDim;
    D2 = 2 + BlockDim;
    D3 = 3;
    D4 = 4 + BlockDim;
    D5 = 5;
    D6 = 6;
    D7 = 7;
    D8 = 8 + BlockDim;
    D12 = 12;
    D16 = 16 + BlockDim;
    D32 = 32 + BlockDim;
    D64 = 64 + BlockDim;
    D128 = 128 + BlockDim;
    D256 = 256 + BlockDim;
}
