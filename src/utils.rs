use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::mem;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use rand::Rng;

use crate::error::{allocation_error, layout_error, Result};
use crate::traits::Real;

/// Alignment of operand buffers: one cache line, which is also the width of a
/// 512-bit vector register.
pub const ALIGNMENT: usize = 64;

/// A container for aligned, zero-initialized operand memory.
///
/// Memory is obtained with `std::alloc::alloc_zeroed()` and released with
/// `std::alloc::dealloc()` using the same layout, so the buffer never hands its
/// allocation to a `Vec` (whose allocator would assume `align_of::<T>()`).
///
/// Allocation failures are reported as [`SoaGemmError::AllocationError`]
/// instead of aborting, so a benchmark run with an absurd shape fails with a
/// diagnostic.
///
/// [`SoaGemmError::AllocationError`]: crate::error::SoaGemmError::AllocationError
///
/// # Example
///
/// ```
/// use soa_gemm::utils::{AlignedBuffer, ALIGNMENT};
///
/// let buffer = AlignedBuffer::<f64>::zeroed(8 * 16, ALIGNMENT).unwrap();
/// assert_eq!(buffer.len(), 128);
/// assert_eq!(buffer.as_ptr() as usize % ALIGNMENT, 0);
/// assert!(buffer.iter().all(|&x| x == 0.0));
/// ```
pub struct AlignedBuffer<T: Real> {
    ptr: NonNull<T>,
    len: usize,
    layout: Layout,
}

impl<T: Real> AlignedBuffer<T> {
    /// Allocates `len` zeroed elements aligned to `align` bytes.
    ///
    /// # Errors
    ///
    /// - `LayoutError` if `align` is not a power of two, is smaller than the
    ///   natural alignment of `T`, or the byte size overflows.
    /// - `AllocationError` if the allocator returns null.
    pub fn zeroed(len: usize, align: usize) -> Result<Self> {
        if !align.is_power_of_two() || align < mem::align_of::<T>() {
            return Err(layout_error(
                len.saturating_mul(mem::size_of::<T>()),
                align,
                format!(
                    "alignment must be a power of two and at least {}",
                    mem::align_of::<T>()
                ),
            ));
        }

        let size = len.checked_mul(mem::size_of::<T>()).ok_or_else(|| {
            layout_error(usize::MAX, align, format!("{} elements overflow usize", len))
        })?;

        let layout = Layout::from_size_align(size, align)
            .map_err(|e| layout_error(size, align, e.to_string()))?;

        if size == 0 {
            return Ok(AlignedBuffer {
                ptr: NonNull::dangling(),
                len: 0,
                layout,
            });
        }

        // SAFETY: layout has a non-zero size.
        let raw = unsafe { alloc_zeroed(layout) } as *mut T;
        let ptr = NonNull::new(raw)
            .ok_or_else(|| allocation_error(size, align, "allocator returned null"))?;

        // All-zero bytes are a valid 0.0 for both f32 and f64.
        Ok(AlignedBuffer { ptr, len, layout })
    }

    /// Allocates a buffer and copies `values` into it.
    pub fn from_slice(values: &[T], align: usize) -> Result<Self> {
        let mut buffer = Self::zeroed(values.len(), align)?;
        buffer.copy_from_slice(values);
        Ok(buffer)
    }

    /// Allocation alignment in bytes.
    pub fn alignment(&self) -> usize {
        self.layout.align()
    }
}

impl<T: Real> Drop for AlignedBuffer<T> {
    fn drop(&mut self) {
        if self.layout.size() > 0 {
            // SAFETY: ptr was allocated with exactly this layout.
            unsafe {
                dealloc(self.ptr.as_ptr() as *mut u8, self.layout);
            }
        }
    }
}

impl<T: Real> Deref for AlignedBuffer<T> {
    type Target = [T];
    fn deref(&self) -> &Self::Target {
        // SAFETY: ptr is valid (or dangling with len 0) for len initialized elements.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: Real> DerefMut for AlignedBuffer<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: as in `deref`, and `&mut self` guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: Real> std::fmt::Debug for AlignedBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuffer")
            .field("len", &self.len)
            .field("align", &self.layout.align())
            .finish()
    }
}

// SAFETY: AlignedBuffer uniquely owns its allocation, like Vec<T>.
unsafe impl<T: Real> Send for AlignedBuffer<T> {}
unsafe impl<T: Real> Sync for AlignedBuffer<T> {}

/// Fills `buffer` with independent uniform samples in `[0, 1)`.
pub fn fill_random<T: Real, R: Rng>(buffer: &mut [T], rng: &mut R) {
    for value in buffer.iter_mut() {
        *value = T::sample(rng);
    }
}

/// Largest absolute element-wise difference between two equally sized buffers.
///
/// A `NaN` in either input makes the result `NaN`, so a broken kernel cannot
/// hide behind a comparison that silently skips it.
///
/// # Panics
///
/// Panics if the buffers differ in length.
pub fn max_abs_diff<T: Real>(lhs: &[T], rhs: &[T]) -> f64 {
    assert_eq!(
        lhs.len(),
        rhs.len(),
        "buffers must have the same length ({} != {})",
        lhs.len(),
        rhs.len()
    );
    lhs.iter()
        .zip(rhs.iter())
        .map(|(&x, &y)| (x.to_f64_lossless() - y.to_f64_lossless()).abs())
        .fold(0.0f64, |acc, d| if d.is_nan() || acc.is_nan() { f64::NAN } else { acc.max(d) })
}
