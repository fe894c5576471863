//! Lane-batched ("structure-of-arrays") small-matrix multiply.
//!
//! `r` independent `m x n x k` problems share one `B` operand while `A` and
//! `C` are interleaved element by element across lanes. The crate provides
//! the reference kernel ([`matmul::fused_soa_gemm`]), a narrow contract for
//! optimized kernels ([`kernels::SoaKernel`], [`kernels::KernelGenerator`]),
//! a portable shape-specialized generator, and the harness that checks and
//! times one against the other ([`bench::run`]).
//!
//! ```
//! use soa_gemm::kernels::{GemmDescriptor, KernelGenerator, SoaKernel, SpecializedGenerator};
//! use soa_gemm::layout::GemmShape;
//!
//! let shape = GemmShape::packed_for::<f64>(4, 4, 4);
//! let kernel = SpecializedGenerator
//!     .generate(&GemmDescriptor::new(shape, 1.0f64, 2.0))
//!     .unwrap();
//!
//! let a = vec![1.0; shape.a_layout().padded_len()];
//! let b = vec![1.0; shape.b_layout().padded_len()];
//! let mut c = vec![1.0; shape.c_layout().padded_len()];
//! kernel.execute(&a, &b, &mut c);
//! assert!(c.iter().all(|&x| x == 6.0));
//! ```

pub mod bench;
pub mod error;
pub mod kernels;
pub mod layout;
pub mod matmul;
pub mod traits;
pub mod utils;

pub use error::{Result, SoaGemmError};
pub use kernels::{GemmDescriptor, KernelGenerator, SoaKernel, SpecializedGenerator};
pub use layout::{GemmShape, SharedLayout, SoaLayout};
pub use matmul::{fused_soa_gemm, ReferenceKernel};
pub use traits::{Precision, Real};
