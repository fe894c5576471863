//! Verification and throughput benchmark of an optimized kernel against the
//! reference.
//!
//! A run allocates the four operand buffers once, fills them with seeded
//! pseudo-random values, executes both kernels on identical inputs, reports
//! the largest element-wise disagreement, then times `repetitions` calls of
//! each kernel independently.

use std::fmt;
use std::hint::black_box;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{argument_error, Result};
use crate::kernels::{GemmDescriptor, KernelGenerator, SoaKernel};
use crate::layout::GemmShape;
use crate::matmul::ReferenceKernel;
use crate::traits::{Precision, Real};
use crate::utils::{fill_random, max_abs_diff, AlignedBuffer, ALIGNMENT};

/// Seed of the operand generator; fixed so runs are reproducible.
pub const DEFAULT_SEED: u64 = 0x5EED_50A6_E33A_0001;

/// Elapsed times are floored at one nanosecond so throughput stays finite.
const MIN_ELAPSED_SECS: f64 = 1e-9;

pub const USAGE: &str = "usage: soa-gemm <m> <n> <k> <beta> <repetitions>";

/// Parameters of one benchmark run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BenchConfig {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub beta: f64,
    pub repetitions: usize,
    /// Fusion width; `None` uses the precision's default.
    pub lanes: Option<usize>,
    pub seed: u64,
}

impl BenchConfig {
    pub fn new(m: usize, n: usize, k: usize, beta: f64, repetitions: usize) -> Self {
        BenchConfig {
            m,
            n,
            k,
            beta,
            repetitions,
            lanes: None,
            seed: DEFAULT_SEED,
        }
    }

    /// Parses the positional arguments `<m> <n> <k> <beta> <repetitions>`
    /// (program name already stripped).
    ///
    /// # Errors
    ///
    /// `ArgumentError` on a wrong argument count, a non-numeric value, a zero
    /// extent or repetition count, or a non-finite `beta`.
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args: Vec<S> = args.into_iter().collect();
        if args.len() != 5 {
            return Err(argument_error(format!(
                "expected 5 arguments, got {}",
                args.len()
            )));
        }

        let m = parse_extent(args[0].as_ref(), "m")?;
        let n = parse_extent(args[1].as_ref(), "n")?;
        let k = parse_extent(args[2].as_ref(), "k")?;
        let beta = parse_beta(args[3].as_ref())?;
        let repetitions = parse_extent(args[4].as_ref(), "repetitions")?;

        Ok(BenchConfig::new(m, n, k, beta, repetitions))
    }

    pub fn with_lanes(mut self, lanes: usize) -> Self {
        self.lanes = Some(lanes);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Tightly packed shape for element type `T`.
    pub fn shape<T: Real>(&self) -> GemmShape {
        GemmShape::packed(
            self.m,
            self.n,
            self.k,
            self.lanes.unwrap_or(T::DEFAULT_LANES),
        )
    }
}

fn parse_extent(value: &str, name: &str) -> Result<usize> {
    let parsed = value.trim().parse::<usize>().map_err(|e| {
        argument_error(format!("{}: '{}' is not a valid integer ({})", name, value, e))
    })?;
    if parsed == 0 {
        return Err(argument_error(format!("{} must be positive", name)));
    }
    Ok(parsed)
}

fn parse_beta(value: &str) -> Result<f64> {
    let parsed = value
        .trim()
        .parse::<f64>()
        .map_err(|e| argument_error(format!("beta: '{}' is not a valid number ({})", value, e)))?;
    if !parsed.is_finite() {
        return Err(argument_error(format!("beta must be finite, got {}", parsed)));
    }
    Ok(parsed)
}

/// Wall-clock measurement of one kernel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelTiming {
    pub elapsed: Duration,
    pub gflops: f64,
}

impl KernelTiming {
    fn new(elapsed: Duration, total_flops: f64) -> Self {
        let seconds = elapsed.as_secs_f64().max(MIN_ELAPSED_SECS);
        KernelTiming {
            elapsed,
            gflops: total_flops / seconds / 1e9,
        }
    }
}

/// Outcome of a benchmark run. `Display` prints the three console lines;
/// the remaining fields describe the run for library callers and logs.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchReport {
    /// Wall-clock time the run began, also stamped on the run's `info!` line.
    pub started_at: DateTime<Utc>,
    pub precision: Precision,
    pub shape: GemmShape,
    pub beta: f64,
    pub repetitions: usize,
    pub generator: &'static str,
    pub max_error: f64,
    /// Rounding bound the two kernels are expected to agree within.
    pub tolerance: f64,
    pub reference: KernelTiming,
    pub optimized: KernelTiming,
}

impl BenchReport {
    pub fn agrees(&self) -> bool {
        self.max_error <= self.tolerance
    }
}

impl fmt::Display for BenchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Max. Error: {:.6}", self.max_error)?;
        writeln!(f, "GFLOPS ref: {:.6}", self.reference.gflops)?;
        write!(f, "GFLOPS opt: {:.6}", self.optimized.gflops)
    }
}

/// Forward error bound of a length-`k` dot product accumulated onto a scaled
/// `C` element: `(k + 1) * eps * (|beta| * max|C| + k * max|A| * max|B|)`.
pub fn agreement_tolerance<T: Real>(
    k: usize,
    beta: f64,
    max_abs_a: f64,
    max_abs_b: f64,
    max_abs_c: f64,
) -> f64 {
    let eps = T::epsilon().to_f64_lossless();
    (k as f64 + 1.0) * eps * (beta.abs() * max_abs_c + k as f64 * max_abs_a * max_abs_b)
}

fn max_abs<T: Real>(values: &[T]) -> f64 {
    values
        .iter()
        .map(|v| v.to_f64_lossless().abs())
        .fold(0.0, f64::max)
}

fn time_kernel<T: Real>(
    kernel: &dyn SoaKernel<T>,
    repetitions: usize,
    a: &[T],
    b: &[T],
    c: &mut [T],
) -> Duration {
    let start = Instant::now();
    for _ in 0..repetitions {
        kernel.execute(black_box(a), black_box(b), black_box(&mut *c));
    }
    start.elapsed()
}

/// Runs verification and timing of `generator`'s kernel against the reference.
///
/// # Errors
///
/// Returns a validation error for an invalid shape or a descriptor the
/// generator rejects, and an allocation error if a buffer cannot be obtained.
pub fn run<T, G>(config: &BenchConfig, generator: &G) -> Result<BenchReport>
where
    T: Real,
    G: KernelGenerator<T> + ?Sized,
{
    let started_at = Utc::now();
    let shape = config.shape::<T>();
    shape.validate()?;

    let alpha = T::one();
    let beta = T::from_f64_lossy(config.beta);
    info!(
        "{} {} m={} n={} k={} lanes={} beta={} repetitions={} generator={}",
        started_at.to_rfc3339(),
        T::PRECISION,
        shape.m,
        shape.n,
        shape.k,
        shape.lanes,
        beta,
        config.repetitions,
        generator.name()
    );

    let mut a = AlignedBuffer::<T>::zeroed(shape.a_layout().padded_len(), ALIGNMENT)?;
    let mut b = AlignedBuffer::<T>::zeroed(shape.b_layout().padded_len(), ALIGNMENT)?;
    let mut c_ref = AlignedBuffer::<T>::zeroed(shape.c_layout().padded_len(), ALIGNMENT)?;
    let mut c_opt = AlignedBuffer::<T>::zeroed(shape.c_layout().padded_len(), ALIGNMENT)?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    fill_random(&mut c_ref, &mut rng);
    c_opt.copy_from_slice(&c_ref);
    fill_random(&mut a, &mut rng);
    fill_random(&mut b, &mut rng);

    let tolerance = agreement_tolerance::<T>(
        shape.k,
        beta.to_f64_lossless(),
        max_abs(&a),
        max_abs(&b),
        max_abs(&c_ref),
    );

    let descriptor = GemmDescriptor::new(shape, alpha, beta);
    let optimized = generator.generate(&descriptor)?;
    let reference = ReferenceKernel::new(shape, alpha, beta);

    reference.execute(&a, &b, &mut c_ref);
    optimized.execute(&a, &b, &mut c_opt);

    let max_error = max_abs_diff(&c_ref, &c_opt);
    if max_error <= tolerance {
        debug!("max error {:e} within tolerance {:e}", max_error, tolerance);
    } else {
        warn!(
            "{} kernel disagrees with reference: max error {:e} exceeds tolerance {:e}",
            generator.name(),
            max_error,
            tolerance
        );
    }

    let total_flops = shape.flops() * config.repetitions as f64;
    let reference_time = time_kernel(&reference, config.repetitions, &a, &b, &mut c_ref);
    let optimized_time = time_kernel(&*optimized, config.repetitions, &a, &b, &mut c_opt);
    debug!(
        "timed {} calls: reference {:?}, {} {:?}",
        config.repetitions,
        reference_time,
        generator.name(),
        optimized_time
    );

    Ok(BenchReport {
        started_at,
        precision: T::PRECISION,
        shape,
        beta: config.beta,
        repetitions: config.repetitions,
        generator: generator.name(),
        max_error,
        tolerance,
        reference: KernelTiming::new(reference_time, total_flops),
        optimized: KernelTiming::new(optimized_time, total_flops),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SoaGemmError;
    use crate::kernels::SpecializedGenerator;

    #[test]
    fn test_parse_args() {
        let config = BenchConfig::from_args(["4", "5", "6", "0.5", "100"]).unwrap();
        assert_eq!(config, BenchConfig::new(4, 5, 6, 0.5, 100));
        assert_eq!(config.seed, DEFAULT_SEED);
        assert_eq!(config.shape::<f64>(), GemmShape::packed(4, 5, 6, 8));
        assert_eq!(config.shape::<f32>().lanes, 16);
        assert_eq!(config.with_lanes(4).shape::<f32>().lanes, 4);
    }

    #[test]
    fn test_parse_args_accepts_negative_and_integer_beta() {
        assert_eq!(BenchConfig::from_args(["1", "1", "1", "-2", "1"]).unwrap().beta, -2.0);
        assert_eq!(BenchConfig::from_args(["1", "1", "1", "0", "1"]).unwrap().beta, 0.0);
    }

    #[test]
    fn test_parse_args_wrong_count() {
        let err = BenchConfig::from_args(["4", "4"]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid arguments: expected 5 arguments, got 2");
    }

    #[test]
    fn test_parse_args_rejects_malformed_values() {
        let err = BenchConfig::from_args(["4", "x", "4", "0", "1"]).unwrap_err();
        assert!(err.to_string().contains("n: 'x' is not a valid integer"));

        let err = BenchConfig::from_args(["4", "4", "4", "abc", "1"]).unwrap_err();
        assert!(err.to_string().contains("beta: 'abc' is not a valid number"));

        let err = BenchConfig::from_args(["4", "4", "4", "inf", "1"]).unwrap_err();
        assert!(err.to_string().contains("beta must be finite"));

        let err = BenchConfig::from_args(["4", "4", "0", "0", "1"]).unwrap_err();
        assert!(err.to_string().contains("k must be positive"));

        let err = BenchConfig::from_args(["4", "4", "4", "0", "0"]).unwrap_err();
        assert!(err.to_string().contains("repetitions must be positive"));

        assert!(BenchConfig::from_args(["-1", "4", "4", "0", "1"]).is_err());
    }

    #[test]
    fn test_timing_floor_keeps_gflops_finite() {
        let timing = KernelTiming::new(Duration::ZERO, 1e3);
        assert!(timing.gflops.is_finite());
        assert!(timing.gflops > 0.0);

        let timing = KernelTiming::new(Duration::from_secs(2), 4e9);
        assert!((timing.gflops - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_agreement_tolerance() {
        let tol = agreement_tolerance::<f64>(4, 0.0, 1.0, 1.0, 1.0);
        assert_eq!(tol, 5.0 * f64::EPSILON * 4.0);

        let tol32 = agreement_tolerance::<f32>(4, 2.0, 1.0, 1.0, 1.0);
        assert!(tol32 > tol);
    }

    #[test]
    fn test_report_display() {
        let report = BenchReport {
            started_at: Utc::now(),
            precision: Precision::F64,
            shape: GemmShape::packed(4, 4, 4, 8),
            beta: 0.0,
            repetitions: 10,
            generator: "specialized",
            max_error: 0.0,
            tolerance: 1e-15,
            reference: KernelTiming::new(Duration::from_millis(1), 1e6),
            optimized: KernelTiming::new(Duration::from_micros(500), 1e6),
        };
        assert_eq!(
            report.to_string(),
            "Max. Error: 0.000000\nGFLOPS ref: 1.000000\nGFLOPS opt: 2.000000"
        );
        assert!(report.agrees());
    }

    #[test]
    fn test_run_small_problem() {
        let before = Utc::now();
        let config = BenchConfig::new(3, 4, 5, 0.0, 3);
        let report = run::<f64, _>(&config, &SpecializedGenerator).unwrap();

        assert!(report.started_at >= before && report.started_at <= Utc::now());
        assert_eq!(report.precision, Precision::F64);
        assert_eq!(report.generator, "specialized");

        assert_eq!(report.shape, GemmShape::packed(3, 4, 5, 8));
        assert_eq!(report.max_error, 0.0);
        assert!(report.agrees());
        assert!(report.reference.gflops.is_finite() && report.reference.gflops > 0.0);
        assert!(report.optimized.gflops.is_finite() && report.optimized.gflops > 0.0);
    }

    #[test]
    fn test_run_rejects_overflowing_shape() {
        // 2^61 rows times 8 lanes does not fit in a 64-bit element count.
        let config =
            BenchConfig::from_args(["2305843009213693952", "1", "1", "0", "1"]).unwrap();
        let err = run::<f64, _>(&config, &SpecializedGenerator).unwrap_err();
        assert!(
            matches!(err, SoaGemmError::ValidationError { .. }),
            "unexpected error: {}",
            err
        );
        assert!(err.to_string().contains("element count overflows usize"));
    }
}
