//! Error types for the wave-function kernels.
//!
//! Only configuration problems are reported through [`WfError`]. Structural
//! mistakes (mismatched distributions, column windows out of range, missing
//! device buffers) are programming errors and panic at the call site.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WfError {
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),
    #[error("accelerator backend selected but the crate was built without the `accelerator` feature")]
    AcceleratorUnavailable,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config error: {0}")]
    Config(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type WfResult<T> = Result<T, WfError>;
