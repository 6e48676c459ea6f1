//! Error types for cryptographic operations

use fmdn_proto::EcCurve;
use thiserror::Error;

/// Errors from cryptographic primitives.
///
/// None of these are attributable to the peer: inputs are length-checked
/// before they reach a primitive, so a failure here means a broken provider
/// or configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Input is not a whole number of cipher blocks
    #[error("invalid block input length: {actual} is not a multiple of {block}")]
    InvalidBlockLength {
        /// Cipher block size
        block: usize,
        /// Length supplied
        actual: usize,
    },

    /// Provider cannot reduce onto this curve
    #[error("unsupported curve: {0:?}")]
    UnsupportedCurve(EcCurve),

    /// Provider returned output of the wrong size
    #[error("invalid output length from {operation}: expected {expected}, got {actual}")]
    InvalidOutputLength {
        /// Operation that misbehaved
        operation: &'static str,
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Hardware or backend failure
    #[error("primitive failure: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CryptoError::InvalidBlockLength { block: 16, actual: 20 };
        assert_eq!(err.to_string(), "invalid block input length: 20 is not a multiple of 16");
    }
}
