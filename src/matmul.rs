//! Reference fused batched GEMM.
//!
//! For every lane `l` of a lane-batched problem this computes
//!
//! ```text
//! C[i][j][l] = beta * C[i][j][l] + sum_p alpha * A[i][p][l] * B[p][j]
//! ```
//!
//! where `A` and `C` are lane-interleaved (see [`crate::layout::SoaLayout`])
//! and `B` is one row-major matrix shared by all lanes.
//!
//! The kernel runs in two passes:
//!
//! 1. `C` is scaled by `beta`, or overwritten with zeros when `beta == 0`. The
//!    explicit zero keeps `NaN`/`Inf` garbage in `C` from surviving a
//!    multiplication by zero.
//! 2. Products are accumulated with `p` outermost, then `i`, `j` and the lane
//!    innermost, so each row `B[p][..]` is streamed once across all rows and
//!    lanes before moving on.
//!
//! Accumulation order is fixed; results are reproducible bit for bit.

use crate::kernels::SoaKernel;
use crate::layout::GemmShape;
use crate::traits::Real;

/// Reference lane-batched matrix multiply-accumulate.
///
/// # Arguments
///
/// * `shape` - Extents, leading dimensions and lane count
/// * `alpha` - Weight on the product (`1` leaves products unchanged)
/// * `beta` - Weight on the existing `C`; `0` overwrites
/// * `a` - Lane-batched `m x k` operand
/// * `b` - Shared row-major `k x n` operand
/// * `c` - Lane-batched `m x n` output, updated in place
///
/// # Panics
///
/// Panics if a buffer is too small for `shape`.
///
/// # Example
///
/// ```
/// use soa_gemm::layout::GemmShape;
/// use soa_gemm::matmul::fused_soa_gemm;
///
/// let shape = GemmShape::packed(4, 4, 4, 8);
/// let a = vec![1.0f64; 4 * 4 * 8];
/// let b = vec![1.0f64; 4 * 4];
/// let mut c = vec![f64::NAN; 4 * 4 * 8];
///
/// fused_soa_gemm(&shape, 1.0, 0.0, &a, &b, &mut c);
/// assert!(c.iter().all(|&x| x == 4.0));
/// ```
pub fn fused_soa_gemm<T: Real>(
    shape: &GemmShape,
    alpha: T,
    beta: T,
    a: &[T],
    b: &[T],
    c: &mut [T],
) {
    shape.assert_buffers(a.len(), b.len(), c.len());

    let a_layout = shape.a_layout();
    let b_layout = shape.b_layout();
    let c_layout = shape.c_layout();
    let lanes = shape.lanes;

    // init result matrix
    for row in 0..shape.m {
        for col in 0..shape.n {
            let start = c_layout.lane_run(row, col);
            let run = &mut c[start..start + lanes];
            if beta == T::zero() {
                run.fill(T::zero());
            } else {
                for value in run.iter_mut() {
                    *value = *value * beta;
                }
            }
        }
    }

    for p in 0..shape.k {
        for row in 0..shape.m {
            let a_start = a_layout.lane_run(row, p);
            let a_run = &a[a_start..a_start + lanes];
            for col in 0..shape.n {
                let b_value = b[b_layout.offset(p, col)];
                let c_start = c_layout.lane_run(row, col);
                let c_run = &mut c[c_start..c_start + lanes];
                for (c_value, &a_value) in c_run.iter_mut().zip(a_run) {
                    *c_value = *c_value + alpha * a_value * b_value;
                }
            }
        }
    }
}

/// [`fused_soa_gemm`] bound to a fixed shape and scalars, usable wherever a
/// [`SoaKernel`] is expected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceKernel<T: Real> {
    shape: GemmShape,
    alpha: T,
    beta: T,
}

impl<T: Real> ReferenceKernel<T> {
    pub fn new(shape: GemmShape, alpha: T, beta: T) -> Self {
        ReferenceKernel { shape, alpha, beta }
    }

    pub fn shape(&self) -> &GemmShape {
        &self.shape
    }
}

impl<T: Real> SoaKernel<T> for ReferenceKernel<T> {
    #[inline]
    fn execute(&self, a: &[T], b: &[T], c: &mut [T]) {
        fused_soa_gemm(&self.shape, self.alpha, self.beta, a, b, c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Per-lane textbook triple loop used as an independent oracle.
    fn naive_lane_gemm(shape: &GemmShape, beta: f64, a: &[f64], b: &[f64], c: &mut [f64]) {
        let (al, bl, cl) = (shape.a_layout(), shape.b_layout(), shape.c_layout());
        for lane in 0..shape.lanes {
            for i in 0..shape.m {
                for j in 0..shape.n {
                    let mut sum = 0.0;
                    for p in 0..shape.k {
                        sum += a[al.offset(i, p, lane)] * b[bl.offset(p, j)];
                    }
                    let idx = cl.offset(i, j, lane);
                    c[idx] = if beta == 0.0 { sum } else { beta * c[idx] + sum };
                }
            }
        }
    }

    #[test]
    fn test_all_ones_overwrite() {
        let shape = GemmShape::packed(4, 4, 4, 8);
        let a = vec![1.0f64; shape.a_layout().padded_len()];
        let b = vec![1.0f64; shape.b_layout().padded_len()];
        let mut c = vec![123.0f64; shape.c_layout().padded_len()];

        fused_soa_gemm(&shape, 1.0, 0.0, &a, &b, &mut c);
        assert!(c.iter().all(|&x| x == 4.0), "{:?}", c);
    }

    #[test]
    fn test_all_ones_accumulate_with_beta_two() {
        let shape = GemmShape::packed(4, 4, 4, 8);
        let a = vec![1.0f64; shape.a_layout().padded_len()];
        let b = vec![1.0f64; shape.b_layout().padded_len()];
        let mut c = vec![1.0f64; shape.c_layout().padded_len()];

        fused_soa_gemm(&shape, 1.0, 2.0, &a, &b, &mut c);
        assert!(c.iter().all(|&x| x == 6.0), "{:?}", c);
    }

    #[test]
    fn test_beta_zero_clears_non_finite() {
        let shape = GemmShape::packed(3, 2, 5, 4);
        let a = vec![0.5f64; shape.a_layout().padded_len()];
        let b = vec![2.0f64; shape.b_layout().padded_len()];
        let mut c: Vec<f64> = (0..shape.c_layout().padded_len())
            .map(|i| match i % 3 {
                0 => f64::NAN,
                1 => f64::INFINITY,
                _ => f64::NEG_INFINITY,
            })
            .collect();

        fused_soa_gemm(&shape, 1.0, 0.0, &a, &b, &mut c);
        assert!(c.iter().all(|&x| x == 5.0));
    }

    #[test]
    fn test_alpha_scales_products_only() {
        let shape = GemmShape::packed(2, 3, 4, 2);
        let a = vec![1.0f64; shape.a_layout().padded_len()];
        let b = vec![1.0f64; shape.b_layout().padded_len()];
        let mut c = vec![1.0f64; shape.c_layout().padded_len()];

        fused_soa_gemm(&shape, 0.5, 1.0, &a, &b, &mut c);
        assert!(c.iter().all(|&x| x == 3.0));
    }

    #[test]
    fn test_matches_naive_oracle() {
        for &(m, n, k, lanes, beta) in &[
            (1usize, 1usize, 1usize, 1usize, 0.0f64),
            (3, 5, 7, 8, 0.0),
            (4, 4, 4, 8, 1.0),
            (9, 2, 3, 16, -0.75),
            (6, 6, 1, 3, 2.0),
        ] {
            let shape = GemmShape::packed(m, n, k, lanes);
            let a: Vec<f64> = (0..shape.a_layout().padded_len())
                .map(|x| ((x * 7) % 13) as f64 / 4.0)
                .collect();
            let b: Vec<f64> = (0..shape.b_layout().padded_len())
                .map(|x| ((x + 3) % 5) as f64 - 2.0)
                .collect();
            let c0: Vec<f64> = (0..shape.c_layout().padded_len())
                .map(|x| (x % 11) as f64 / 8.0)
                .collect();

            let mut expected = c0.clone();
            naive_lane_gemm(&shape, beta, &a, &b, &mut expected);

            let mut actual = c0.clone();
            fused_soa_gemm(&shape, 1.0, beta, &a, &b, &mut actual);

            // Operands are dyadic rationals of small magnitude: both orders are exact.
            assert_eq!(actual, expected, "m={} n={} k={} lanes={} beta={}", m, n, k, lanes, beta);
        }
    }

    #[test]
    fn test_padded_leading_dims_leave_padding_untouched() {
        let shape = GemmShape::packed(2, 3, 2, 4).with_leading_dims(5, 4, 6);
        let a = vec![1.0f64; shape.a_layout().padded_len()];
        let b = vec![2.0f64; shape.b_layout().padded_len()];
        let mut c = vec![-1.0f64; shape.c_layout().padded_len()];

        fused_soa_gemm(&shape, 1.0, 0.0, &a, &b, &mut c);

        let c_layout = shape.c_layout();
        for row in 0..shape.m {
            for col in 0..shape.ldc {
                for lane in 0..shape.lanes {
                    let expected = if col < shape.n { 4.0 } else { -1.0 };
                    assert_eq!(c[c_layout.offset(row, col, lane)], expected);
                }
            }
        }
    }

    #[test]
    fn test_reference_kernel_wraps_function() {
        let shape = GemmShape::packed_for::<f32>(2, 2, 3);
        let kernel = ReferenceKernel::new(shape, 1.0f32, 0.0);
        let a = vec![1.0f32; shape.a_layout().padded_len()];
        let b = vec![1.0f32; shape.b_layout().padded_len()];
        let mut c = vec![0.0f32; shape.c_layout().padded_len()];

        kernel.execute(&a, &b, &mut c);
        assert_eq!(c.len(), 2 * 2 * 16);
        assert!(c.iter().all(|&x| x == 3.0));
    }

    #[test]
    #[should_panic(expected = "A: expected at least")]
    fn test_undersized_a_panics() {
        let shape = GemmShape::packed(2, 2, 2, 4);
        let a = vec![0.0f64; 15];
        let b = vec![0.0f64; 4];
        let mut c = vec![0.0f64; 16];
        fused_soa_gemm(&shape, 1.0, 0.0, &a, &b, &mut c);
    }
}
