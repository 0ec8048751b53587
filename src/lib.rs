//! Private database exploration over homomorphic encryption
//!
//! A client scores every row of a server-held plaintext database with private
//! functions and learns only whether enough rows pass a private threshold.
//! The server never sees the functions, the thresholds or any per-row result.
//!
//! Key components:
//! - Encrypted lookup tables: a scoring function becomes a selector polynomial,
//!   one lookup is one ciphertext × monomial product
//! - Ring packing and merging: per-row results are packed at a small ring
//!   dimension and merged up a chain of resolutions through Y = X² embeddings
//! - Scheme switching from coefficient to slot encoding
//! - Two-stage threshold aggregation with composite sign polynomials and
//!   bootstrapping on level exhaustion
//!
//! All homomorphic arithmetic goes through the [`engine::Engine`] trait;
//! [`engine::ClearEngine`] is a transparent reference backend.

pub mod engine;
pub mod error;
pub mod lut;
pub mod math;
pub mod params;
pub mod pde;
pub mod registry;
pub mod repack;
pub mod switch;
pub mod threshold;

pub use engine::{CiphertextInfo, ClearEngine, Engine, EngineError};
pub use error::{PdeError, Result, Stage, SwitchStep};
pub use lut::{LookupTable, LookupTableEncoder, ScoringFunction};
pub use params::{BootstrapParams, PdeParams, Resolution, ResolutionParams};
pub use pde::{
    plaintext_score, Client, Database, DebugDecryptor, DenseDatabase, PrivateThreshold, Request,
    RequestSizes, Server,
};
pub use registry::{
    generate_key_material, KeyMaterial, PackingKeys, ResolutionRegistry, SecretKeyChain,
};
pub use repack::{MergeEvaluator, PackEvaluator, XPow2Table};
pub use switch::SchemeSwitcher;
pub use threshold::{
    ComparisonEvaluator, CompositeSignPreset, ThresholdEvaluator, GLOBAL_SIGN, LOCAL_SIGN,
};
