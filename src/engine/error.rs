//! Errors reported by a cryptographic engine

use std::fmt;

/// Failure of a delegated homomorphic primitive
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The ciphertext has no level left for the requested operation
    LevelExhausted { operation: &'static str },

    /// Operands carry different scales
    ScaleMismatch { left: f64, right: f64 },

    /// Operand encrypted under a key the operation cannot accept
    KeyMismatch(String),

    /// Required evaluation key is absent
    MissingKey(String),

    /// Operands or keys live in rings of different dimension
    DegreeMismatch { expected: u32, found: u32 },

    /// A value cannot be represented by the encoder
    Encoding(String),

    /// Operand metadata does not fit the operation
    InvalidOperand(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::LevelExhausted { operation } => {
                write!(f, "{}: ciphertext level exhausted", operation)
            }
            EngineError::ScaleMismatch { left, right } => {
                write!(f, "scale mismatch: 2^{} vs 2^{}", left, right)
            }
            EngineError::KeyMismatch(msg) => write!(f, "key mismatch: {}", msg),
            EngineError::MissingKey(msg) => write!(f, "missing key: {}", msg),
            EngineError::DegreeMismatch { expected, found } => {
                write!(f, "ring degree mismatch: expected LogN={}, found LogN={}", expected, found)
            }
            EngineError::Encoding(msg) => write!(f, "encoding: {}", msg),
            EngineError::InvalidOperand(msg) => write!(f, "invalid operand: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {}

/// Result type for engine primitives
pub type EngineResult<T> = std::result::Result<T, EngineError>;
