//! Kernel call contract and kernel generation.
//!
//! An optimized kernel is anything implementing [`SoaKernel`]: a value with a
//! single `execute(a, b, c)` entry point whose shape and scalars were fixed
//! when it was created. Kernels are produced by a [`KernelGenerator`] from a
//! [`GemmDescriptor`], so callers depend only on the contract and never on how
//! a kernel was built. Plain closures `Fn(&[T], &[T], &mut [T])` are kernels
//! too.
//!
//! [`SpecializedGenerator`] is the portable generator shipped with the crate.
//! Its kernels walk `C` element by element and keep a block of
//! [`LANE_BLOCK`] lanes in a fixed-size accumulator across the whole `k`
//! loop, which the compiler turns into vector registers. The per-element
//! summation order is the reference order, so on identical inputs they agree
//! with [`crate::matmul::fused_soa_gemm`] exactly.

use log::debug;

use crate::error::{validation_error, Result};
use crate::layout::GemmShape;
use crate::traits::{Precision, Real};

/// Number of lanes kept in one accumulator block by specialized kernels.
pub const LANE_BLOCK: usize = 8;

/// A batched GEMM with shape and scalars bound at construction time.
pub trait SoaKernel<T: Real> {
    /// Updates `c` from `a` (lane-batched) and `b` (shared).
    ///
    /// Implementations panic on buffers too small for their shape.
    fn execute(&self, a: &[T], b: &[T], c: &mut [T]);
}

impl<T, F> SoaKernel<T> for F
where
    T: Real,
    F: Fn(&[T], &[T], &mut [T]),
{
    #[inline]
    fn execute(&self, a: &[T], b: &[T], c: &mut [T]) {
        self(a, b, c)
    }
}

/// Operand transposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transpose {
    #[default]
    NoTrans,
    Trans,
}

/// Software prefetch strategy requested from a generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Prefetch {
    #[default]
    None,
    /// Generator may add prefetch hints but keeps the plain call signature.
    SignatureOnly,
    /// Generator picks a strategy for the target.
    Auto,
}

/// Everything a generator needs to build a kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GemmDescriptor<T: Real> {
    pub shape: GemmShape,
    pub alpha: T,
    pub beta: T,
    pub trans_a: Transpose,
    pub trans_b: Transpose,
    pub prefetch: Prefetch,
}

impl<T: Real> GemmDescriptor<T> {
    /// Non-transposed operands, no prefetch.
    pub fn new(shape: GemmShape, alpha: T, beta: T) -> Self {
        GemmDescriptor {
            shape,
            alpha,
            beta,
            trans_a: Transpose::NoTrans,
            trans_b: Transpose::NoTrans,
            prefetch: Prefetch::None,
        }
    }

    pub fn with_transpose(mut self, trans_a: Transpose, trans_b: Transpose) -> Self {
        self.trans_a = trans_a;
        self.trans_b = trans_b;
        self
    }

    pub fn with_prefetch(mut self, prefetch: Prefetch) -> Self {
        self.prefetch = prefetch;
        self
    }

    pub fn precision(&self) -> Precision {
        T::PRECISION
    }
}

/// Builds kernels for descriptors.
pub trait KernelGenerator<T: Real> {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Returns a kernel implementing the descriptor, or a validation error for
    /// descriptors the generator cannot handle.
    fn generate(&self, descriptor: &GemmDescriptor<T>) -> Result<Box<dyn SoaKernel<T>>>;
}

/// Portable generator of shape-specialized, lane-blocked kernels.
///
/// Supports non-transposed operands only. Prefetch requests are accepted and
/// ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpecializedGenerator;

impl<T: Real> KernelGenerator<T> for SpecializedGenerator {
    fn name(&self) -> &'static str {
        "specialized"
    }

    fn generate(&self, descriptor: &GemmDescriptor<T>) -> Result<Box<dyn SoaKernel<T>>> {
        Ok(Box::new(SpecializedKernel::new(*descriptor)?))
    }
}

/// Kernel produced by [`SpecializedGenerator`].
#[derive(Debug, Clone)]
pub struct SpecializedKernel<T: Real> {
    descriptor: GemmDescriptor<T>,
    overwrite: bool,
    unit_alpha: bool,
}

impl<T: Real> SpecializedKernel<T> {
    pub fn new(descriptor: GemmDescriptor<T>) -> Result<Self> {
        descriptor.shape.validate()?;
        if descriptor.trans_a != Transpose::NoTrans || descriptor.trans_b != Transpose::NoTrans {
            return Err(validation_error(format!(
                "transposed operands are not supported (trans_a = {:?}, trans_b = {:?})",
                descriptor.trans_a, descriptor.trans_b
            )));
        }

        let shape = &descriptor.shape;
        debug!(
            "specializing {} kernel m={} n={} k={} lanes={} \
             ({} blocks of {}, {} tail lanes) alpha={} beta={} prefetch={:?}",
            descriptor.precision(),
            shape.m,
            shape.n,
            shape.k,
            shape.lanes,
            shape.lanes / LANE_BLOCK,
            LANE_BLOCK,
            shape.lanes % LANE_BLOCK,
            descriptor.alpha,
            descriptor.beta,
            descriptor.prefetch
        );

        Ok(SpecializedKernel {
            overwrite: descriptor.beta == T::zero(),
            unit_alpha: descriptor.alpha == T::one(),
            descriptor,
        })
    }

    pub fn descriptor(&self) -> &GemmDescriptor<T> {
        &self.descriptor
    }

    #[inline(always)]
    fn init(&self, c: T) -> T {
        if self.overwrite {
            T::zero()
        } else {
            c * self.descriptor.beta
        }
    }

    #[inline(always)]
    fn accumulate(&self, acc: &mut [T], a: &[T], b: T) {
        if self.unit_alpha {
            for (acc_value, &a_value) in acc.iter_mut().zip(a) {
                *acc_value = *acc_value + a_value * b;
            }
        } else {
            let alpha = self.descriptor.alpha;
            for (acc_value, &a_value) in acc.iter_mut().zip(a) {
                *acc_value = *acc_value + alpha * a_value * b;
            }
        }
    }
}

impl<T: Real> SoaKernel<T> for SpecializedKernel<T> {
    fn execute(&self, a: &[T], b: &[T], c: &mut [T]) {
        let shape = &self.descriptor.shape;
        shape.assert_buffers(a.len(), b.len(), c.len());

        let a_layout = shape.a_layout();
        let b_layout = shape.b_layout();
        let c_layout = shape.c_layout();
        let lanes = shape.lanes;
        let blocked = lanes - lanes % LANE_BLOCK;

        for row in 0..shape.m {
            for col in 0..shape.n {
                let c_start = c_layout.lane_run(row, col);

                let mut lane = 0;
                while lane < blocked {
                    let c_block = &mut c[c_start + lane..c_start + lane + LANE_BLOCK];
                    let mut acc = [T::zero(); LANE_BLOCK];
                    for (acc_value, &c_value) in acc.iter_mut().zip(c_block.iter()) {
                        *acc_value = self.init(c_value);
                    }
                    for p in 0..shape.k {
                        let a_start = a_layout.lane_run(row, p) + lane;
                        self.accumulate(
                            &mut acc,
                            &a[a_start..a_start + LANE_BLOCK],
                            b[b_layout.offset(p, col)],
                        );
                    }
                    c_block.copy_from_slice(&acc);
                    lane += LANE_BLOCK;
                }

                let tail = lanes - blocked;
                if tail > 0 {
                    let c_tail = &mut c[c_start + blocked..c_start + lanes];
                    let mut acc = [T::zero(); LANE_BLOCK];
                    for (acc_value, &c_value) in acc.iter_mut().zip(c_tail.iter()) {
                        *acc_value = self.init(c_value);
                    }
                    for p in 0..shape.k {
                        let a_start = a_layout.lane_run(row, p) + blocked;
                        self.accumulate(
                            &mut acc[..tail],
                            &a[a_start..a_start + tail],
                            b[b_layout.offset(p, col)],
                        );
                    }
                    c_tail.copy_from_slice(&acc[..tail]);
                }
            }
        }
    }
}
