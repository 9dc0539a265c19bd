//! Mapping between flat logical indices, 2D tile coordinates and the
//! (unit, register) slot that owns an element of a distributed tile.

/// Logical position of an element inside a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coord {
    pub i: usize,
    pub j: usize,
}

/// Unit and register index owning a linear element of a register tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    pub unit: usize,
    pub reg: usize,
}

/// Row-major unravel of `linear` in a tile with `cols` columns.
#[inline]
pub const fn coord(linear: usize, cols: usize) -> Coord {
    Coord {
        i: linear / cols,
        j: linear % cols,
    }
}

#[inline]
pub const fn linear(i: usize, j: usize, cols: usize) -> usize {
    i * cols + j
}

/// Elements are dealt round-robin: unit `t` owns `t, t + P, t + 2P, ...`.
#[inline]
pub const fn owning_slot(linear: usize, block_dim: usize) -> Slot {
    Slot {
        unit: linear % block_dim,
        reg: linear / block_dim,
    }
}

/// Inverse of [`owning_slot`].
#[inline]
pub const fn slot_index(unit: usize, reg: usize, block_dim: usize) -> usize {
    unit + reg * block_dim
}

/// Registers each unit holds for a tile of `size` elements.
#[inline]
pub const fn reg_count(size: usize, block_dim: usize) -> usize {
    size.div_ceil(block_dim)
}

/// Physical length of strided storage covering every addressed offset.
#[inline]
pub const fn strided_len(rows: usize, cols: usize, stride_m: usize, stride_n: usize) -> usize {
    (rows - 1) * stride_m + (cols - 1) * stride_n + 1
}

/// Whether every logical position of an `rows x cols` view with the given
/// strides lands on its own physical slot. Broadcast views are not.
pub const fn is_injective(rows: usize, cols: usize, stride_m: usize, stride_n: usize) -> bool {
    let len = strided_len(rows, cols, stride_m, stride_n);
    if len < rows * cols {
        return false;
    }
    let mut a = 0;
    while a < rows * cols {
        let oa = (a / cols) * stride_m + (a % cols) * stride_n;
        let mut b = a + 1;
        while b < rows * cols {
            if (b / cols) * stride_m + (b % cols) * stride_n == oa {
                return false;
            }
            b += 1;
        }
        a += 1;
    }
    true
}
