//! Error handling for the exploration pipeline
//!
//! A single `PdeError` type is shared by every stage. Failures reported by the
//! cryptographic engine are wrapped together with the pipeline stage that
//! issued the call and are never retried.

use std::fmt;

use crate::engine::EngineError;
use crate::params::Resolution;

/// Pipeline stage that issued a failing engine call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    KeyGeneration,
    Encryption,
    Decryption,
    LookupTable,
    Pack,
    Merge,
    SchemeSwitch,
    LocalThreshold,
    InnerSum,
    GlobalThreshold,
    Bootstrap,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::KeyGeneration => "key generation",
            Stage::Encryption => "encryption",
            Stage::Decryption => "decryption",
            Stage::LookupTable => "lookup-table evaluation",
            Stage::Pack => "pack",
            Stage::Merge => "merge",
            Stage::SchemeSwitch => "scheme switch",
            Stage::LocalThreshold => "local threshold",
            Stage::InnerSum => "inner sum",
            Stage::GlobalThreshold => "global threshold",
            Stage::Bootstrap => "bootstrap",
        };
        f.write_str(name)
    }
}

/// Step of the scheme-switching pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchStep {
    ScaleDown,
    ModUp,
    CoeffsToSlots,
    EvalMod,
    DropLevel,
    Rescale,
}

impl fmt::Display for SwitchStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SwitchStep::ScaleDown => "ScaleDown",
            SwitchStep::ModUp => "ModUp",
            SwitchStep::CoeffsToSlots => "CoeffsToSlots",
            SwitchStep::EvalMod => "EvalMod",
            SwitchStep::DropLevel => "DropLevel",
            SwitchStep::Rescale => "Rescale",
        };
        f.write_str(name)
    }
}

/// Error returned by every fallible operation of the crate
#[derive(Debug)]
pub enum PdeError {
    /// Malformed parameters, resolution chain or key material; raised before
    /// any row is processed.
    Configuration(String),

    /// Key material required at a resolution is absent
    MissingKeyMaterial {
        what: &'static str,
        resolution: Resolution,
    },

    /// Packing requested at a resolution without its automorphism keys
    PackingKeyMissing {
        resolution: Resolution,
        galois_element: Option<usize>,
    },

    /// The engine refused to encode a lookup-table value
    Encoding(EngineError),

    /// Input value outside the scoring function's interval, or within one
    /// discretization step of its upper bound
    OutOfDomain { value: f64, interval: (f64, f64) },

    /// Ciphertext resolution does not fit the requested transition
    ResolutionMismatch {
        expected: Resolution,
        found: Resolution,
    },

    /// Contract violation by the caller
    InvalidArgument(String),

    /// A delegated scheme-switching primitive failed
    SchemeSwitchFailed {
        step: SwitchStep,
        source: EngineError,
    },

    /// Any other engine failure, tagged with the issuing stage
    Engine { stage: Stage, source: EngineError },

    /// Request or key material could not be serialized
    Serialization(String),
}

impl fmt::Display for PdeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PdeError::Configuration(msg) => write!(f, "configuration error: {}", msg),
            PdeError::MissingKeyMaterial { what, resolution } => {
                write!(f, "missing key material: {} at {}", what, resolution)
            }
            PdeError::PackingKeyMissing {
                resolution,
                galois_element: Some(g),
            } => write!(f, "packing key for galois element {} missing at {}", g, resolution),
            PdeError::PackingKeyMissing {
                resolution,
                galois_element: None,
            } => write!(f, "packing keys missing at {}", resolution),
            PdeError::Encoding(err) => write!(f, "encoding error: {}", err),
            PdeError::OutOfDomain { value, interval } => write!(
                f,
                "value {} out of domain [{}, {})",
                value, interval.0, interval.1
            ),
            PdeError::ResolutionMismatch { expected, found } => {
                write!(f, "resolution mismatch: expected {}, found {}", expected, found)
            }
            PdeError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            PdeError::SchemeSwitchFailed { step, source } => {
                write!(f, "scheme switch failed at {}: {}", step, source)
            }
            PdeError::Engine { stage, source } => {
                write!(f, "engine error during {}: {}", stage, source)
            }
            PdeError::Serialization(msg) => write!(f, "serialization error: {}", msg),
        }
    }
}

impl std::error::Error for PdeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PdeError::Encoding(err)
            | PdeError::SchemeSwitchFailed { source: err, .. }
            | PdeError::Engine { source: err, .. } => Some(err),
            _ => None,
        }
    }
}

impl PdeError {
    /// Wrap an engine failure with the stage that issued the call
    pub fn engine(stage: Stage) -> impl FnOnce(EngineError) -> PdeError {
        move |source| PdeError::Engine { stage, source }
    }

    /// Wrap an engine failure raised by a scheme-switching step
    pub fn switch(step: SwitchStep) -> impl FnOnce(EngineError) -> PdeError {
        move |source| PdeError::SchemeSwitchFailed { step, source }
    }
}

impl From<bincode::Error> for PdeError {
    fn from(err: bincode::Error) -> Self {
        PdeError::Serialization(err.to_string())
    }
}

/// Result type for exploration operations
pub type Result<T> = std::result::Result<T, PdeError>;

/// Create a `PdeError::InvalidArgument` with format string support
macro_rules! invalid_argument {
    ($($arg:tt)*) => {
        $crate::error::PdeError::InvalidArgument(format!($($arg)*))
    };
}

pub(crate) use invalid_argument;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_keeps_stage() {
        let err = PdeError::engine(Stage::Merge)(EngineError::LevelExhausted {
            operation: "rescale",
        });
        assert!(matches!(err, PdeError::Engine { stage: Stage::Merge, .. }));
        assert!(err.to_string().contains("merge"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_invalid_argument_macro() {
        let err = invalid_argument!("{} ciphertexts", 3);
        assert_eq!(err.to_string(), "invalid argument: 3 ciphertexts");
    }
}
