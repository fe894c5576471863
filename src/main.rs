//! Benchmark driver: `soa-gemm <m> <n> <k> <beta> <repetitions>`.
//!
//! Runs the reference kernel and the specialized kernel on the same random
//! operands, prints the largest disagreement and the throughput of both.
//! Build with `--features f32` for single precision.

use std::process::ExitCode;

use soa_gemm::bench::{self, BenchConfig, USAGE};
use soa_gemm::error::SoaGemmError;
use soa_gemm::kernels::SpecializedGenerator;

#[cfg(feature = "f32")]
type Element = f32;
#[cfg(not(feature = "f32"))]
type Element = f64;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let config = match BenchConfig::from_args(std::env::args().skip(1)) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    };

    match bench::run::<Element, _>(&config, &SpecializedGenerator) {
        Ok(report) => {
            println!("{report}");
            ExitCode::SUCCESS
        }
        Err(err @ SoaGemmError::ArgumentError { .. }) => {
            eprintln!("error: {err}");
            eprintln!("{USAGE}");
            ExitCode::from(2)
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
