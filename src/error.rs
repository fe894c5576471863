//! Error types for soa-gemm operations.
//!
//! The kernels themselves never fail: they assert on caller bugs. Everything
//! around them (buffer allocation, shape validation, kernel generation and
//! command-line parsing) reports failures through [`SoaGemmError`].

use std::fmt;

/// Errors that can occur while setting up or running a batched GEMM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoaGemmError {
    /// Memory allocation failed.
    AllocationError {
        /// The size that was requested to be allocated.
        requested_size: usize,
        /// The alignment that was requested.
        requested_alignment: usize,
        /// Human-readable error message.
        message: String,
    },
    /// Invalid layout parameters were provided.
    LayoutError {
        /// The size parameter that caused the error.
        size: usize,
        /// The alignment parameter that caused the error.
        alignment: usize,
        /// Human-readable error message.
        message: String,
    },
    /// A shape, leading dimension or kernel descriptor was rejected.
    ValidationError {
        /// Human-readable error message.
        message: String,
    },
    /// The benchmark command line could not be parsed.
    ArgumentError {
        /// Human-readable error message.
        message: String,
    },
}

impl fmt::Display for SoaGemmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SoaGemmError::AllocationError {
                requested_size,
                requested_alignment,
                message,
            } => write!(
                f,
                "Memory allocation failed: {} (requested {} bytes with {} byte alignment)",
                message, requested_size, requested_alignment
            ),
            SoaGemmError::LayoutError {
                size,
                alignment,
                message,
            } => write!(
                f,
                "Invalid memory layout: {} (size: {}, alignment: {})",
                message, size, alignment
            ),
            SoaGemmError::ValidationError { message } => {
                write!(f, "Validation error: {}", message)
            }
            SoaGemmError::ArgumentError { message } => {
                write!(f, "Invalid arguments: {}", message)
            }
        }
    }
}

impl std::error::Error for SoaGemmError {}

/// Result type alias for soa-gemm operations.
pub type Result<T> = std::result::Result<T, SoaGemmError>;

/// Creates an allocation error.
pub fn allocation_error(size: usize, alignment: usize, message: impl Into<String>) -> SoaGemmError {
    SoaGemmError::AllocationError {
        requested_size: size,
        requested_alignment: alignment,
        message: message.into(),
    }
}

/// Creates a layout error.
pub fn layout_error(size: usize, alignment: usize, message: impl Into<String>) -> SoaGemmError {
    SoaGemmError::LayoutError {
        size,
        alignment,
        message: message.into(),
    }
}

/// Creates a validation error.
pub fn validation_error(message: impl Into<String>) -> SoaGemmError {
    SoaGemmError::ValidationError {
        message: message.into(),
    }
}

/// Creates an argument error.
pub fn argument_error(message: impl Into<String>) -> SoaGemmError {
    SoaGemmError::ArgumentError {
        message: message.into(),
    }
}
