//! Error type shared by every operator in the crate.
//!
//! All checks run before an operator writes to any output or retained buffer,
//! so an `Err` never leaves a layer half-updated.

use thiserror::Error;

/// Failures surfaced by the pooling and loss operators.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OpError {
    /// Two tensors that must agree in shape do not, or a tensor has the wrong rank.
    #[error("{op}: shape mismatch, expected {expected}, found {found}")]
    ShapeMismatch {
        op: &'static str,
        expected: String,
        found: String,
    },

    /// A parameter is outside its valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A region record cannot be decoded.
    #[error("invalid roi #{index}: {reason}")]
    InvalidRoi { index: usize, reason: String },

    /// `backward` was called on a layer that never ran `forward`.
    #[error("{0}: backward called before forward")]
    NoForwardState(&'static str),
}

impl OpError {
    pub(crate) fn shape(op: &'static str, expected: impl Into<String>, found: &[usize]) -> Self {
        Self::ShapeMismatch {
            op,
            expected: expected.into(),
            found: format!("{found:?}"),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, OpError>;
