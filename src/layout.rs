//! Addressing of lane-batched (SoA) and shared operand buffers.
//!
//! A lane-batched matrix stores `lanes` independent `rows x cols` matrices
//! interleaved element by element, so element `(row, col)` of every lane sits
//! in one contiguous run of `lanes` values:
//!
//! ```text
//! offset(row, col, lane) = row * ld * lanes + col * lanes + lane
//! ```
//!
//! The shared operand is a plain row-major matrix, `offset(row, col) = row * ld + col`,
//! read identically by every lane.

use ndarray::Array2;

use crate::error::{validation_error, Result};
use crate::traits::Real;

/// Lane-interleaved row-major matrix layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoaLayout {
    pub rows: usize,
    pub cols: usize,
    /// Row stride in elements per lane (`ld >= cols`).
    pub ld: usize,
    pub lanes: usize,
}

impl SoaLayout {
    pub const fn new(rows: usize, cols: usize, ld: usize, lanes: usize) -> Self {
        SoaLayout {
            rows,
            cols,
            ld,
            lanes,
        }
    }

    /// Offset of `(row, col, lane)` in the flat buffer.
    #[inline(always)]
    pub const fn offset(&self, row: usize, col: usize, lane: usize) -> usize {
        row * self.ld * self.lanes + col * self.lanes + lane
    }

    /// Offset of the first lane of `(row, col)`; the `lanes` values that follow are contiguous.
    #[inline(always)]
    pub const fn lane_run(&self, row: usize, col: usize) -> usize {
        self.offset(row, col, 0)
    }

    /// Number of elements a buffer must hold to be addressed by this layout.
    pub const fn min_len(&self) -> usize {
        if self.rows == 0 || self.cols == 0 {
            return 0;
        }
        ((self.rows - 1) * self.ld + self.cols) * self.lanes
    }

    /// Number of elements of a fully padded allocation (`rows * ld * lanes`).
    pub const fn padded_len(&self) -> usize {
        self.rows * self.ld * self.lanes
    }

    /// [`Self::min_len`], or `None` if it does not fit in `usize`.
    pub const fn checked_min_len(&self) -> Option<usize> {
        if self.rows == 0 || self.cols == 0 {
            return Some(0);
        }
        match (self.rows - 1).checked_mul(self.ld) {
            Some(prefix) => match prefix.checked_add(self.cols) {
                Some(elements) => elements.checked_mul(self.lanes),
                None => None,
            },
            None => None,
        }
    }

    /// [`Self::padded_len`], or `None` if it does not fit in `usize`.
    pub const fn checked_padded_len(&self) -> Option<usize> {
        match self.rows.checked_mul(self.ld) {
            Some(elements) => elements.checked_mul(self.lanes),
            None => None,
        }
    }

    /// Copies one lane out of `buffer` into an owned `rows x cols` matrix.
    ///
    /// # Panics
    ///
    /// Panics if `lane >= self.lanes` or `buffer` is shorter than [`Self::min_len`].
    pub fn lane_matrix<T: Real>(&self, buffer: &[T], lane: usize) -> Array2<T> {
        assert!(lane < self.lanes, "lane {} out of range (lanes = {})", lane, self.lanes);
        assert!(buffer.len() >= self.min_len(), "buffer too small for layout");
        Array2::from_shape_fn((self.rows, self.cols), |(row, col)| {
            buffer[self.offset(row, col, lane)]
        })
    }

    /// Writes `matrix` into one lane of `buffer`, leaving the other lanes untouched.
    ///
    /// # Panics
    ///
    /// Panics if `matrix` is not `rows x cols`, `lane` is out of range or the
    /// buffer is too small.
    pub fn set_lane<T: Real>(&self, buffer: &mut [T], lane: usize, matrix: &Array2<T>) {
        assert_eq!(matrix.dim(), (self.rows, self.cols), "matrix shape mismatch");
        assert!(lane < self.lanes, "lane {} out of range (lanes = {})", lane, self.lanes);
        assert!(buffer.len() >= self.min_len(), "buffer too small for layout");
        for ((row, col), &value) in matrix.indexed_iter() {
            buffer[self.offset(row, col, lane)] = value;
        }
    }
}

/// Conventional row-major layout of the operand shared by all lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedLayout {
    pub rows: usize,
    pub cols: usize,
    pub ld: usize,
}

impl SharedLayout {
    pub const fn new(rows: usize, cols: usize, ld: usize) -> Self {
        SharedLayout { rows, cols, ld }
    }

    #[inline(always)]
    pub const fn offset(&self, row: usize, col: usize) -> usize {
        row * self.ld + col
    }

    pub const fn min_len(&self) -> usize {
        if self.rows == 0 || self.cols == 0 {
            return 0;
        }
        (self.rows - 1) * self.ld + self.cols
    }

    pub const fn padded_len(&self) -> usize {
        self.rows * self.ld
    }

    pub const fn checked_min_len(&self) -> Option<usize> {
        if self.rows == 0 || self.cols == 0 {
            return Some(0);
        }
        match (self.rows - 1).checked_mul(self.ld) {
            Some(prefix) => prefix.checked_add(self.cols),
            None => None,
        }
    }

    pub const fn checked_padded_len(&self) -> Option<usize> {
        self.rows.checked_mul(self.ld)
    }

    /// Copies the logical `rows x cols` window of `buffer` into an owned matrix.
    pub fn to_array<T: Real>(&self, buffer: &[T]) -> Array2<T> {
        assert!(buffer.len() >= self.min_len(), "buffer too small for layout");
        Array2::from_shape_fn((self.rows, self.cols), |(row, col)| {
            buffer[self.offset(row, col)]
        })
    }
}

/// Problem shape of a fused batched GEMM: `C[m x n] (+)= A[m x k] * B[k x n]`
/// for each of `lanes` lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GemmShape {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub lda: usize,
    pub ldb: usize,
    pub ldc: usize,
    pub lanes: usize,
}

impl GemmShape {
    /// Tightly packed shape (`lda = k`, `ldb = ldc = n`).
    pub const fn packed(m: usize, n: usize, k: usize, lanes: usize) -> Self {
        GemmShape {
            m,
            n,
            k,
            lda: k,
            ldb: n,
            ldc: n,
            lanes,
        }
    }

    /// Tightly packed shape using the precision's default fusion width.
    pub const fn packed_for<T: Real>(m: usize, n: usize, k: usize) -> Self {
        Self::packed(m, n, k, T::DEFAULT_LANES)
    }

    /// Replaces the leading dimensions, e.g. for padded storage.
    pub const fn with_leading_dims(mut self, lda: usize, ldb: usize, ldc: usize) -> Self {
        self.lda = lda;
        self.ldb = ldb;
        self.ldc = ldc;
        self
    }

    #[inline(always)]
    pub const fn a_layout(&self) -> SoaLayout {
        SoaLayout::new(self.m, self.k, self.lda, self.lanes)
    }

    #[inline(always)]
    pub const fn b_layout(&self) -> SharedLayout {
        SharedLayout::new(self.k, self.n, self.ldb)
    }

    #[inline(always)]
    pub const fn c_layout(&self) -> SoaLayout {
        SoaLayout::new(self.m, self.n, self.ldc, self.lanes)
    }

    /// Floating-point operations of one call: one multiply and one add per
    /// inner-product term, per lane.
    pub fn flops(&self) -> f64 {
        2.0 * self.m as f64 * self.n as f64 * self.k as f64 * self.lanes as f64
    }

    /// Checks that all extents are positive, every leading dimension covers
    /// its logical row length, and every padded operand's element count fits
    /// in `usize`. Lengths and offsets of a validated shape never overflow.
    pub fn validate(&self) -> Result<()> {
        if self.m == 0 || self.n == 0 || self.k == 0 || self.lanes == 0 {
            return Err(validation_error(format!(
                "dimensions must be positive (m = {}, n = {}, k = {}, lanes = {})",
                self.m, self.n, self.k, self.lanes
            )));
        }
        if self.lda < self.k {
            return Err(validation_error(format!(
                "lda ({}) must be at least k ({})",
                self.lda, self.k
            )));
        }
        if self.ldb < self.n {
            return Err(validation_error(format!(
                "ldb ({}) must be at least n ({})",
                self.ldb, self.n
            )));
        }
        if self.ldc < self.n {
            return Err(validation_error(format!(
                "ldc ({}) must be at least n ({})",
                self.ldc, self.n
            )));
        }
        let extents = [
            ("A", self.a_layout().checked_padded_len()),
            ("B", self.b_layout().checked_padded_len()),
            ("C", self.c_layout().checked_padded_len()),
        ];
        for (operand, len) in extents {
            if len.is_none() {
                return Err(validation_error(format!(
                    "{} element count overflows usize (m = {}, n = {}, k = {}, lanes = {})",
                    operand, self.m, self.n, self.k, self.lanes
                )));
            }
        }
        Ok(())
    }

    /// Asserts that the three operand buffers are large enough for this shape.
    ///
    /// # Panics
    ///
    /// Panics with a message naming the undersized operand.
    #[inline]
    pub fn assert_buffers(&self, a_len: usize, b_len: usize, c_len: usize) {
        let required = [
            ("A", a_len, self.a_layout().checked_min_len()),
            ("B", b_len, self.b_layout().checked_min_len()),
            ("C", c_len, self.c_layout().checked_min_len()),
        ];
        for (operand, len, min_len) in required {
            match min_len {
                Some(min_len) => assert!(
                    len >= min_len,
                    "{}: expected at least {} elements, got {}",
                    operand,
                    min_len,
                    len
                ),
                None => panic!("{}: element count overflows usize", operand),
            }
        }
    }
}
