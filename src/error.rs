//! Rich diagnostic error types for the noesis core.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]`
//! derives, providing error codes and help text. `NoesisError` unifies
//! them for callers that don't care which subsystem failed.

use miette::Diagnostic;
use thiserror::Error;

use crate::benchmark::BenchmarkError;
use crate::memory::StoreError;
use crate::rpc::RpcError;
use crate::selector::SelectorError;

/// Top-level error type for the noesis core.
#[derive(Debug, Error, Diagnostic)]
pub enum NoesisError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Selector(#[from] SelectorError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Benchmark(#[from] BenchmarkError),

    #[error("validation failed: {message}")]
    #[diagnostic(
        code(noesis::validation),
        help("Check the argument described in the message and retry.")
    )]
    Validation { message: String },
}

pub type NoesisResult<T> = std::result::Result<T, NoesisError>;

impl NoesisError {
    pub fn validation(message: impl Into<String>) -> Self {
        NoesisError::Validation {
            message: message.into(),
        }
    }
}
