//! Cryptographic engine contract
//!
//! The exploration pipeline never touches ring arithmetic directly; it drives
//! an [`Engine`] that owns encoding, encryption, homomorphic arithmetic,
//! ring-degree conversion, scheme-switching primitives and bootstrapping.
//!
//! # Contract
//!
//! - Every primitive either returns a fresh ciphertext or an [`EngineError`];
//!   the caller wraps the error with its pipeline stage and never retries.
//! - Ciphertexts expose their metadata through [`CiphertextInfo`]: resolution,
//!   level (remaining multiplicative budget), scale, slot layout.
//! - Multiplications that would have to consume a level at level 0 fail with
//!   [`EngineError::LevelExhausted`]; `bootstrap` is the only way back up.
//! - Coefficient-domain plaintext products follow the Montgomery convention:
//!   exactly one operand must be in Montgomery form.
//!
//! [`clear::ClearEngine`] is a transparent reference backend.

pub mod clear;
mod error;

use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::params::{BootstrapParams, Resolution, ResolutionParams};

pub use clear::ClearEngine;
pub use error::{EngineError, EngineResult};

/// Metadata carried by every ciphertext
pub trait CiphertextInfo {
    /// Ring-dimension resolution
    fn resolution(&self) -> Resolution;

    /// Remaining multiplicative budget
    fn level(&self) -> usize;

    /// log2 of the scale
    fn log_scale(&self) -> f64;

    /// Slot-encoded (true) or coefficient-encoded (false)
    fn is_batched(&self) -> bool;

    /// log2 of the number of meaningful slots
    fn log_slots(&self) -> u32;

    /// Overwrite the slot layout (packing and merging track it)
    fn set_log_slots(&mut self, log_slots: u32);
}

/// Homomorphic encryption backend consumed by the pipeline
pub trait Engine: Send + Sync {
    type SecretKey: Clone + Send + Sync + Debug;
    type Plaintext: Clone + Send + Sync + Debug;
    type Ciphertext: CiphertextInfo + Clone + Send + Sync + Debug + Serialize + DeserializeOwned;
    /// Key-switching key: ring conversion (r → r+1) or Galois key
    type SwitchingKey: Clone + Send + Sync + Debug + Serialize + DeserializeOwned;
    /// Relinearization, rotation and bootstrapping keys at one resolution
    type EvaluationKeys: Send + Sync + Debug + Serialize + DeserializeOwned;

    // Key generation

    /// Fresh secret at the given resolution
    fn gen_secret_key(&self, params: &ResolutionParams) -> Self::SecretKey;

    /// Key converting Y = X^2 embedded ciphertexts under `lower` (resolution r)
    /// into ciphertexts under `upper` (resolution r+1)
    fn gen_conversion_key(
        &self,
        lower: &Self::SecretKey,
        upper: &Self::SecretKey,
    ) -> EngineResult<Self::SwitchingKey>;

    /// Key switching τ_g(s) back to s
    fn gen_galois_key(
        &self,
        sk: &Self::SecretKey,
        galois_element: usize,
    ) -> EngineResult<Self::SwitchingKey>;

    /// Relinearization, inner-sum rotations and bootstrapping keys
    fn gen_evaluation_keys(
        &self,
        sk: &Self::SecretKey,
        params: &ResolutionParams,
        bootstrap: &BootstrapParams,
    ) -> EngineResult<Self::EvaluationKeys>;

    // Encoding

    /// Encode `values` as polynomial coefficients
    fn encode_coeffs(
        &self,
        params: &ResolutionParams,
        values: &[f64],
        level: usize,
        log_scale: f64,
    ) -> EngineResult<Self::Plaintext>;

    /// Encode `values` into the N/2 slots (missing slots are zero)
    fn encode_slots(
        &self,
        params: &ResolutionParams,
        values: &[f64],
        level: usize,
        log_scale: f64,
    ) -> EngineResult<Self::Plaintext>;

    /// Unscaled monomial X^degree, degree < 2N
    fn encode_monomial(
        &self,
        params: &ResolutionParams,
        degree: usize,
        montgomery: bool,
    ) -> EngineResult<Self::Plaintext>;

    /// Decode coefficients or slots back to reals
    fn decode(&self, pt: &Self::Plaintext) -> Vec<f64>;

    fn encrypt(&self, pt: &Self::Plaintext, sk: &Self::SecretKey) -> EngineResult<Self::Ciphertext>;

    fn decrypt(&self, ct: &Self::Ciphertext, sk: &Self::SecretKey) -> EngineResult<Self::Plaintext>;

    /// Trivial encryption of zero
    fn zero(&self, params: &ResolutionParams, level: usize, batched: bool) -> Self::Ciphertext;

    // Arithmetic

    fn add(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> EngineResult<Self::Ciphertext>;

    fn add_assign(&self, acc: &mut Self::Ciphertext, b: &Self::Ciphertext) -> EngineResult<()> {
        *acc = self.add(acc, b)?;
        Ok(())
    }

    fn sub(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> EngineResult<Self::Ciphertext>;

    /// Add a public constant to every slot (or to the constant coefficient)
    fn add_const(&self, ct: &Self::Ciphertext, c: f64) -> EngineResult<Self::Ciphertext>;

    /// Multiply by a public integer; consumes no level
    fn mul_int(&self, ct: &Self::Ciphertext, k: i64) -> EngineResult<Self::Ciphertext>;

    /// Multiply by a public real constant; the result must be rescaled
    fn mul_const(&self, ct: &Self::Ciphertext, c: f64) -> EngineResult<Self::Ciphertext>;

    /// Ciphertext product followed by relinearization; the result must be rescaled
    fn mul_relin(
        &self,
        a: &Self::Ciphertext,
        b: &Self::Ciphertext,
        evk: &Self::EvaluationKeys,
    ) -> EngineResult<Self::Ciphertext>;

    fn rescale(&self, ct: &Self::Ciphertext) -> EngineResult<Self::Ciphertext>;

    fn drop_level(&self, ct: &Self::Ciphertext, levels: usize) -> EngineResult<Self::Ciphertext>;

    /// Slot i receives Σ_{j<n} slot(i + j·batch)
    fn inner_sum(
        &self,
        ct: &Self::Ciphertext,
        batch: usize,
        n: usize,
        evk: &Self::EvaluationKeys,
    ) -> EngineResult<Self::Ciphertext>;

    // Ring-domain operations

    fn to_montgomery(&self, ct: &Self::Ciphertext) -> EngineResult<Self::Ciphertext>;

    /// Coefficient-domain ciphertext × plaintext product
    fn mul_plain(
        &self,
        ct: &Self::Ciphertext,
        pt: &Self::Plaintext,
    ) -> EngineResult<Self::Ciphertext>;

    fn mul_plain_then_add(
        &self,
        ct: &Self::Ciphertext,
        pt: &Self::Plaintext,
        acc: &mut Self::Ciphertext,
    ) -> EngineResult<()> {
        let product = self.mul_plain(ct, pt)?;
        self.add_assign(acc, &product)
    }

    /// Exact multiplication by X^k
    fn mul_monomial(&self, ct: &Self::Ciphertext, k: usize) -> EngineResult<Self::Ciphertext>;

    /// Exact multiplication by n^-1 mod q
    fn mul_inverse_int(&self, ct: &Self::Ciphertext, n: u64) -> EngineResult<Self::Ciphertext>;

    /// τ_g followed by key switching back to the original secret
    fn automorphism(
        &self,
        ct: &Self::Ciphertext,
        galois_element: usize,
        key: &Self::SwitchingKey,
    ) -> EngineResult<Self::Ciphertext>;

    /// Move a ciphertext into the ring of `target` (Y = X^2 embedding upward)
    fn switch_ring_degree(
        &self,
        ct: &Self::Ciphertext,
        target: &ResolutionParams,
    ) -> EngineResult<Self::Ciphertext>;

    fn apply_switching_key(
        &self,
        ct: &Self::Ciphertext,
        key: &Self::SwitchingKey,
    ) -> EngineResult<Self::Ciphertext>;

    // Bootstrapping and scheme-switching primitives

    fn bootstrap(
        &self,
        ct: &Self::Ciphertext,
        evk: &Self::EvaluationKeys,
    ) -> EngineResult<Self::Ciphertext>;

    fn scale_down(
        &self,
        ct: &Self::Ciphertext,
        evk: &Self::EvaluationKeys,
    ) -> EngineResult<Self::Ciphertext>;

    fn mod_up(
        &self,
        ct: &Self::Ciphertext,
        evk: &Self::EvaluationKeys,
    ) -> EngineResult<Self::Ciphertext>;

    /// Returns the real half and, for fully packed inputs, the imaginary half
    fn coeffs_to_slots(
        &self,
        ct: &Self::Ciphertext,
        evk: &Self::EvaluationKeys,
    ) -> EngineResult<(Self::Ciphertext, Option<Self::Ciphertext>)>;

    fn eval_mod(
        &self,
        ct: &Self::Ciphertext,
        evk: &Self::EvaluationKeys,
    ) -> EngineResult<Self::Ciphertext>;
}
