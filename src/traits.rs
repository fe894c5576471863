//! Element types understood by the batched kernels.

use std::fmt::{Debug, Display};

use num::Float;
use rand::Rng;

/// Runtime tag of a kernel's element type, carried by descriptors and
/// reports and printed in log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Precision {
    F32,
    F64,
}

impl Precision {
    /// Size in bytes of one element.
    pub const fn size_of(self) -> usize {
        match self {
            Precision::F32 => 4,
            Precision::F64 => 8,
        }
    }
}

impl Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Precision::F32 => write!(f, "f32"),
            Precision::F64 => write!(f, "f64"),
        }
    }
}

/// Working precision of a batched GEMM.
///
/// `DEFAULT_LANES` is the fusion width matching a 512-bit register of this
/// element type: 16 lanes of `f32`, 8 lanes of `f64`. Layouts take the lane
/// count as an explicit parameter, so targets with other register widths can
/// override it.
pub trait Real: Float + Debug + Display + Default + Send + Sync + 'static {
    const PRECISION: Precision;
    const DEFAULT_LANES: usize;

    /// Widens to `f64` for error reporting.
    fn to_f64_lossless(self) -> f64;

    /// Narrows an `f64` scalar (e.g. a parsed `beta`) to this precision.
    fn from_f64_lossy(value: f64) -> Self;

    /// Draws a uniform sample in `[0, 1)`.
    fn sample<R: Rng>(rng: &mut R) -> Self;
}

impl Real for f32 {
    const PRECISION: Precision = Precision::F32;
    const DEFAULT_LANES: usize = 16;

    #[inline(always)]
    fn to_f64_lossless(self) -> f64 {
        self as f64
    }

    #[inline(always)]
    fn from_f64_lossy(value: f64) -> Self {
        value as f32
    }

    #[inline]
    fn sample<R: Rng>(rng: &mut R) -> Self {
        rng.random::<f32>()
    }
}

impl Real for f64 {
    const PRECISION: Precision = Precision::F64;
    const DEFAULT_LANES: usize = 8;

    #[inline(always)]
    fn to_f64_lossless(self) -> f64 {
        self
    }

    #[inline(always)]
    fn from_f64_lossy(value: f64) -> Self {
        value
    }

    #[inline]
    fn sample<R: Rng>(rng: &mut R) -> Self {
        rng.random::<f64>()
    }
}
