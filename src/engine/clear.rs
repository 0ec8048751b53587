//! Transparent reference engine
//!
//! `ClearEngine` keeps messages as plain `f64` vectors. It offers NO
//! confidentiality: its purpose is to run and test the pipeline end to end
//! without a lattice library. What it does model faithfully:
//!
//! - negacyclic ring arithmetic, Galois automorphisms and the Y = X^2 ring embedding
//! - key identity: every ciphertext records the secret it decrypts under, and
//!   automorphisms, ring switches and key switches move it along that chain
//! - level and scale budgets, with `LevelExhausted` on exhausted multiplications
//! - Montgomery bookkeeping for coefficient-domain plaintext products
//! - the integer overflow introduced by ModUp and removed by EvalMod
//! - Gaussian noise on encryption, key switching, EvalMod and bootstrapping

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use super::{CiphertextInfo, Engine, EngineError, EngineResult};
use crate::math::galois::{apply_automorphism, is_valid_galois_element};
use crate::math::gaussian::GaussianSampler;
use crate::math::poly;
use crate::params::{BootstrapParams, Resolution, ResolutionParams};

/// Secret a ciphertext decrypts under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyTag {
    /// Trivial encryption, decryptable under any key
    Trivial,
    /// Secret `s` of the ciphertext's own ring
    Secret(u64),
    /// Secret of the ring one resolution below, embedded through Y = X^2
    Embedded(u64),
    /// τ_g(s) after an automorphism, before key switching
    Automorphed { id: u64, galois: usize },
}

/// Secret key: an identifier bound to its resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearSecretKey {
    id: u64,
    resolution: Resolution,
    sigma: f64,
}

impl ClearSecretKey {
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }
}

/// Encoded message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearPlaintext {
    resolution: Resolution,
    level: usize,
    log_scale: f64,
    batched: bool,
    log_slots: u32,
    montgomery: bool,
    log_q: Vec<u32>,
    values: Vec<f64>,
}

impl ClearPlaintext {
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Ciphertext whose message is stored in the clear
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearCiphertext {
    resolution: Resolution,
    level: usize,
    log_scale: f64,
    batched: bool,
    log_slots: u32,
    montgomery: bool,
    key: KeyTag,
    /// Bit sizes of the modulus chain the ciphertext lives on
    log_q: Vec<u32>,
    values: Vec<f64>,
}

impl ClearCiphertext {
    /// Underlying message: coefficients, or slots when batched
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn key(&self) -> KeyTag {
        self.key
    }

    pub fn is_montgomery(&self) -> bool {
        self.montgomery
    }

    fn log_q_at(&self, level: usize) -> u32 {
        self.log_q[level.min(self.log_q.len() - 1)]
    }
}

impl CiphertextInfo for ClearCiphertext {
    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn level(&self) -> usize {
        self.level
    }

    fn log_scale(&self) -> f64 {
        self.log_scale
    }

    fn is_batched(&self) -> bool {
        self.batched
    }

    fn log_slots(&self) -> u32 {
        self.log_slots
    }

    fn set_log_slots(&mut self, log_slots: u32) {
        self.log_slots = log_slots;
    }
}

/// Key-switching key from `from` to the secret `to`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearSwitchingKey {
    from: KeyTag,
    to: u64,
    resolution: Resolution,
    galois: Option<usize>,
    sigma: f64,
}

/// Relinearization, rotation and bootstrapping keys
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearEvaluationKeys {
    secret_id: u64,
    resolution: Resolution,
    log_q: Vec<u32>,
    log_default_scale: u32,
    /// Slot rotation steps with a Galois key
    rotations: Vec<usize>,
    bootstrap: BootstrapParams,
}

impl ClearEvaluationKeys {
    fn max_level(&self) -> usize {
        self.log_q.len() - 1
    }
}

/// Reference engine over clear `f64` messages
#[derive(Debug)]
pub struct ClearEngine {
    sampler: Mutex<GaussianSampler>,
    bootstraps: AtomicUsize,
}

impl ClearEngine {
    /// Engine seeded from OS entropy
    pub fn new() -> Self {
        Self::from_sampler(GaussianSampler::new(1.0))
    }

    /// Deterministic engine for reproducible runs
    pub fn with_seed(seed: u64) -> Self {
        Self::from_sampler(GaussianSampler::with_seed(1.0, seed))
    }

    fn from_sampler(sampler: GaussianSampler) -> Self {
        Self {
            sampler: Mutex::new(sampler),
            bootstraps: AtomicUsize::new(0),
        }
    }

    /// Number of bootstraps performed so far
    pub fn bootstrap_count(&self) -> usize {
        self.bootstraps.load(Ordering::Relaxed)
    }

    fn sampler(&self) -> MutexGuard<'_, GaussianSampler> {
        self.sampler.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn add_noise(&self, values: &mut [f64], std: f64) {
        let mut sampler = self.sampler();
        for v in values.iter_mut() {
            *v += sampler.sample_with(std);
        }
    }

    /// Fresh encryption error σ/Δ in message units
    fn encryption_noise(sigma: f64, log_scale: f64) -> f64 {
        sigma * (-log_scale).exp2()
    }

    /// Key-switching error: the gadget decomposition amplifies σ
    fn switching_noise(sigma: f64, log_scale: f64) -> f64 {
        sigma * (8.0 - log_scale).exp2()
    }

    fn check_ring(a: Resolution, b: Resolution) -> EngineResult<()> {
        if a != b {
            return Err(EngineError::DegreeMismatch {
                expected: a.log_n(),
                found: b.log_n(),
            });
        }
        Ok(())
    }

    fn combine_keys(a: KeyTag, b: KeyTag) -> EngineResult<KeyTag> {
        match (a, b) {
            (KeyTag::Trivial, k) | (k, KeyTag::Trivial) => Ok(k),
            (x, y) if x == y => Ok(x),
            (x, y) => Err(EngineError::KeyMismatch(format!("{:?} vs {:?}", x, y))),
        }
    }

    /// Operations using evaluation keys require the ciphertext under their secret
    fn check_evk(ct: &ClearCiphertext, evk: &ClearEvaluationKeys) -> EngineResult<()> {
        Self::check_ring(evk.resolution, ct.resolution)?;
        match ct.key {
            KeyTag::Trivial => Ok(()),
            KeyTag::Secret(id) if id == evk.secret_id => Ok(()),
            other => Err(EngineError::KeyMismatch(format!(
                "evaluation keys of secret {} cannot act on {:?}",
                evk.secret_id, other
            ))),
        }
    }

    fn check_layout(a: &ClearCiphertext, b: &ClearCiphertext) -> EngineResult<()> {
        Self::check_ring(a.resolution, b.resolution)?;
        if a.batched != b.batched {
            return Err(EngineError::InvalidOperand(
                "cannot combine slot-encoded and coefficient-encoded ciphertexts".into(),
            ));
        }
        if a.batched && a.values.len() != b.values.len() {
            return Err(EngineError::InvalidOperand(format!(
                "slot count mismatch: {} vs {}",
                a.values.len(),
                b.values.len()
            )));
        }
        if a.montgomery != b.montgomery {
            return Err(EngineError::InvalidOperand(
                "cannot add Montgomery and standard form ciphertexts".into(),
            ));
        }
        if (a.log_scale - b.log_scale).abs() > 1e-6 {
            return Err(EngineError::ScaleMismatch {
                left: a.log_scale,
                right: b.log_scale,
            });
        }
        Ok(())
    }

    fn combine(
        a: &ClearCiphertext,
        b: &ClearCiphertext,
        f: impl Fn(f64, f64) -> f64,
    ) -> EngineResult<ClearCiphertext> {
        Self::check_layout(a, b)?;
        let key = Self::combine_keys(a.key, b.key)?;
        let mut out = if a.level <= b.level { a.clone() } else { b.clone() };
        out.key = key;
        out.values = a.values.iter().zip(&b.values).map(|(&x, &y)| f(x, y)).collect();
        Ok(out)
    }

    fn require_coefficients(ct: &ClearCiphertext, operation: &str) -> EngineResult<()> {
        if ct.batched {
            return Err(EngineError::InvalidOperand(format!(
                "{} requires a coefficient-encoded ciphertext",
                operation
            )));
        }
        Ok(())
    }

    fn require_slots(ct: &ClearCiphertext, operation: &str) -> EngineResult<()> {
        if !ct.batched {
            return Err(EngineError::InvalidOperand(format!(
                "{} requires a slot-encoded ciphertext",
                operation
            )));
        }
        Ok(())
    }

    fn check_encodable(
        params: &ResolutionParams,
        values: &[f64],
        level: usize,
        log_scale: f64,
    ) -> EngineResult<()> {
        if level > params.max_level() {
            return Err(EngineError::Encoding(format!(
                "level {} above maximum level {}",
                level,
                params.max_level()
            )));
        }
        let log_bound = params.log_q_total(level) as f64 - 1.0 - log_scale;
        for &v in values {
            if !v.is_finite() {
                return Err(EngineError::Encoding(format!("non-finite value {}", v)));
            }
            if v != 0.0 && v.abs().log2() >= log_bound {
                return Err(EngineError::Encoding(format!(
                    "value {} exceeds the representable range 2^{:.1}",
                    v, log_bound
                )));
            }
        }
        Ok(())
    }
}

impl Default for ClearEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for ClearEngine {
    type SecretKey = ClearSecretKey;
    type Plaintext = ClearPlaintext;
    type Ciphertext = ClearCiphertext;
    type SwitchingKey = ClearSwitchingKey;
    type EvaluationKeys = ClearEvaluationKeys;

    fn gen_secret_key(&self, params: &ResolutionParams) -> ClearSecretKey {
        ClearSecretKey {
            id: self.sampler().next_u64(),
            resolution: params.resolution,
            sigma: params.sigma,
        }
    }

    fn gen_conversion_key(
        &self,
        lower: &ClearSecretKey,
        upper: &ClearSecretKey,
    ) -> EngineResult<ClearSwitchingKey> {
        Self::check_ring(lower.resolution.next(), upper.resolution)?;
        Ok(ClearSwitchingKey {
            from: KeyTag::Embedded(lower.id),
            to: upper.id,
            resolution: upper.resolution,
            galois: None,
            sigma: upper.sigma,
        })
    }

    fn gen_galois_key(
        &self,
        sk: &ClearSecretKey,
        galois_element: usize,
    ) -> EngineResult<ClearSwitchingKey> {
        if !is_valid_galois_element(galois_element, sk.resolution.ring_dim()) {
            return Err(EngineError::InvalidOperand(format!(
                "{} is not a Galois element for {}",
                galois_element, sk.resolution
            )));
        }
        Ok(ClearSwitchingKey {
            from: KeyTag::Automorphed {
                id: sk.id,
                galois: galois_element,
            },
            to: sk.id,
            resolution: sk.resolution,
            galois: Some(galois_element),
            sigma: sk.sigma,
        })
    }

    fn gen_evaluation_keys(
        &self,
        sk: &ClearSecretKey,
        params: &ResolutionParams,
        bootstrap: &BootstrapParams,
    ) -> EngineResult<ClearEvaluationKeys> {
        Self::check_ring(params.resolution, sk.resolution)?;
        let rotations = (0..params.log_n() - 1).map(|i| 1usize << i).collect();
        Ok(ClearEvaluationKeys {
            secret_id: sk.id,
            resolution: params.resolution,
            log_q: params.log_q.clone(),
            log_default_scale: params.log_default_scale,
            rotations,
            bootstrap: bootstrap.clone(),
        })
    }

    fn encode_coeffs(
        &self,
        params: &ResolutionParams,
        values: &[f64],
        level: usize,
        log_scale: f64,
    ) -> EngineResult<ClearPlaintext> {
        let n = params.ring_dim();
        if values.len() > n {
            return Err(EngineError::Encoding(format!(
                "{} coefficients do not fit ring dimension {}",
                values.len(),
                n
            )));
        }
        Self::check_encodable(params, values, level, log_scale)?;

        let mut coeffs = values.to_vec();
        coeffs.resize(n, 0.0);
        Ok(ClearPlaintext {
            resolution: params.resolution,
            level,
            log_scale,
            batched: false,
            log_slots: params.log_n() - 1,
            montgomery: false,
            log_q: params.log_q.clone(),
            values: coeffs,
        })
    }

    fn encode_slots(
        &self,
        params: &ResolutionParams,
        values: &[f64],
        level: usize,
        log_scale: f64,
    ) -> EngineResult<ClearPlaintext> {
        let slots = params.slots();
        if values.len() > slots {
            return Err(EngineError::Encoding(format!(
                "{} values do not fit {} slots",
                values.len(),
                slots
            )));
        }
        Self::check_encodable(params, values, level, log_scale)?;

        let mut padded = values.to_vec();
        padded.resize(slots, 0.0);
        Ok(ClearPlaintext {
            resolution: params.resolution,
            level,
            log_scale,
            batched: true,
            log_slots: params.log_n() - 1,
            montgomery: false,
            log_q: params.log_q.clone(),
            values: padded,
        })
    }

    fn encode_monomial(
        &self,
        params: &ResolutionParams,
        degree: usize,
        montgomery: bool,
    ) -> EngineResult<ClearPlaintext> {
        let n = params.ring_dim();
        if degree >= 2 * n {
            return Err(EngineError::Encoding(format!(
                "monomial degree {} not below 2N = {}",
                degree,
                2 * n
            )));
        }
        let mut coeffs = vec![0.0; n];
        coeffs[0] = 1.0;
        Ok(ClearPlaintext {
            resolution: params.resolution,
            level: params.max_level(),
            log_scale: 0.0,
            batched: false,
            log_slots: params.log_n() - 1,
            montgomery,
            log_q: params.log_q.clone(),
            values: poly::mul_monomial(&coeffs, degree),
        })
    }

    fn decode(&self, pt: &ClearPlaintext) -> Vec<f64> {
        pt.values.clone()
    }

    fn encrypt(&self, pt: &ClearPlaintext, sk: &ClearSecretKey) -> EngineResult<ClearCiphertext> {
        Self::check_ring(sk.resolution, pt.resolution)?;
        let mut values = pt.values.clone();
        self.add_noise(&mut values, Self::encryption_noise(sk.sigma, pt.log_scale));

        Ok(ClearCiphertext {
            resolution: pt.resolution,
            level: pt.level,
            log_scale: pt.log_scale,
            batched: pt.batched,
            log_slots: pt.log_slots,
            montgomery: pt.montgomery,
            key: KeyTag::Secret(sk.id),
            log_q: pt.log_q.clone(),
            values,
        })
    }

    fn decrypt(&self, ct: &ClearCiphertext, sk: &ClearSecretKey) -> EngineResult<ClearPlaintext> {
        Self::check_ring(sk.resolution, ct.resolution)?;
        match ct.key {
            KeyTag::Trivial => {}
            KeyTag::Secret(id) if id == sk.id => {}
            other => {
                return Err(EngineError::KeyMismatch(format!(
                    "ciphertext under {:?} cannot be decrypted with secret {}",
                    other, sk.id
                )))
            }
        }
        Ok(ClearPlaintext {
            resolution: ct.resolution,
            level: ct.level,
            log_scale: ct.log_scale,
            batched: ct.batched,
            log_slots: ct.log_slots,
            montgomery: ct.montgomery,
            log_q: ct.log_q.clone(),
            values: ct.values.clone(),
        })
    }

    fn zero(&self, params: &ResolutionParams, level: usize, batched: bool) -> ClearCiphertext {
        let len = if batched { params.slots() } else { params.ring_dim() };
        ClearCiphertext {
            resolution: params.resolution,
            level: level.min(params.max_level()),
            log_scale: params.log_default_scale as f64,
            batched,
            log_slots: params.log_n() - 1,
            montgomery: false,
            key: KeyTag::Trivial,
            log_q: params.log_q.clone(),
            values: vec![0.0; len],
        }
    }

    fn add(&self, a: &ClearCiphertext, b: &ClearCiphertext) -> EngineResult<ClearCiphertext> {
        Self::combine(a, b, |x, y| x + y)
    }

    fn sub(&self, a: &ClearCiphertext, b: &ClearCiphertext) -> EngineResult<ClearCiphertext> {
        Self::combine(a, b, |x, y| x - y)
    }

    fn add_const(&self, ct: &ClearCiphertext, c: f64) -> EngineResult<ClearCiphertext> {
        let mut out = ct.clone();
        if ct.batched {
            out.values.iter_mut().for_each(|v| *v += c);
        } else {
            out.values[0] += c;
        }
        Ok(out)
    }

    fn mul_int(&self, ct: &ClearCiphertext, k: i64) -> EngineResult<ClearCiphertext> {
        let mut out = ct.clone();
        poly::scale_assign(&mut out.values, k as f64);
        Ok(out)
    }

    fn mul_const(&self, ct: &ClearCiphertext, c: f64) -> EngineResult<ClearCiphertext> {
        if ct.level == 0 {
            return Err(EngineError::LevelExhausted { operation: "mul_const" });
        }
        let mut out = ct.clone();
        // The constant is encoded at the scale of the prime the next rescale drops
        out.log_scale += ct.log_q_at(ct.level) as f64;
        poly::scale_assign(&mut out.values, c);
        Ok(out)
    }

    fn mul_relin(
        &self,
        a: &ClearCiphertext,
        b: &ClearCiphertext,
        evk: &ClearEvaluationKeys,
    ) -> EngineResult<ClearCiphertext> {
        Self::require_slots(a, "mul_relin")?;
        Self::require_slots(b, "mul_relin")?;
        Self::check_ring(a.resolution, b.resolution)?;
        Self::check_evk(a, evk)?;
        Self::check_evk(b, evk)?;
        if a.values.len() != b.values.len() {
            return Err(EngineError::InvalidOperand("slot count mismatch".into()));
        }
        let level = a.level.min(b.level);
        if level == 0 {
            return Err(EngineError::LevelExhausted { operation: "mul_relin" });
        }

        let mut out = if a.level <= b.level { a.clone() } else { b.clone() };
        out.key = Self::combine_keys(a.key, b.key)?;
        out.log_scale = a.log_scale + b.log_scale;
        out.values = a.values.iter().zip(&b.values).map(|(x, y)| x * y).collect();
        Ok(out)
    }

    fn rescale(&self, ct: &ClearCiphertext) -> EngineResult<ClearCiphertext> {
        if ct.level == 0 {
            return Err(EngineError::LevelExhausted { operation: "rescale" });
        }
        let mut out = ct.clone();
        out.log_scale -= ct.log_q_at(ct.level) as f64;
        out.level -= 1;
        Ok(out)
    }

    fn drop_level(&self, ct: &ClearCiphertext, levels: usize) -> EngineResult<ClearCiphertext> {
        if levels > ct.level {
            return Err(EngineError::LevelExhausted { operation: "drop_level" });
        }
        let mut out = ct.clone();
        out.level -= levels;
        Ok(out)
    }

    fn inner_sum(
        &self,
        ct: &ClearCiphertext,
        batch: usize,
        n: usize,
        evk: &ClearEvaluationKeys,
    ) -> EngineResult<ClearCiphertext> {
        Self::require_slots(ct, "inner_sum")?;
        Self::check_evk(ct, evk)?;
        let slots = ct.values.len();
        if batch == 0 || !n.is_power_of_two() || batch * n > slots {
            return Err(EngineError::InvalidOperand(format!(
                "inner sum of {} x {} does not fit {} slots",
                n, batch, slots
            )));
        }

        // Rotate-and-add: after the step of size k every slot holds 2k terms
        let mut out = ct.clone();
        let mut step = 1;
        while step < n {
            let shift = step * batch;
            if !evk.rotations.contains(&shift) {
                return Err(EngineError::MissingKey(format!("rotation by {}", shift)));
            }
            let rotated: Vec<f64> = (0..slots).map(|i| out.values[(i + shift) % slots]).collect();
            poly::add_assign(&mut out.values, &rotated);
            step <<= 1;
        }
        Ok(out)
    }

    fn to_montgomery(&self, ct: &ClearCiphertext) -> EngineResult<ClearCiphertext> {
        if ct.montgomery {
            return Err(EngineError::InvalidOperand("ciphertext already in Montgomery form".into()));
        }
        let mut out = ct.clone();
        out.montgomery = true;
        Ok(out)
    }

    fn mul_plain(
        &self,
        ct: &ClearCiphertext,
        pt: &ClearPlaintext,
    ) -> EngineResult<ClearCiphertext> {
        Self::require_coefficients(ct, "mul_plain")?;
        Self::check_ring(ct.resolution, pt.resolution)?;
        if pt.batched {
            return Err(EngineError::InvalidOperand(
                "mul_plain requires a coefficient-encoded plaintext".into(),
            ));
        }
        if ct.montgomery == pt.montgomery {
            return Err(EngineError::InvalidOperand(
                "Montgomery product needs exactly one operand in Montgomery form".into(),
            ));
        }

        let mut out = ct.clone();
        out.level = ct.level.min(pt.level);
        out.log_scale = ct.log_scale + pt.log_scale;
        out.montgomery = false;
        out.values = poly::negacyclic_mul(&ct.values, &pt.values);
        Ok(out)
    }

    fn mul_monomial(&self, ct: &ClearCiphertext, k: usize) -> EngineResult<ClearCiphertext> {
        Self::require_coefficients(ct, "mul_monomial")?;
        let mut out = ct.clone();
        out.values = poly::mul_monomial(&ct.values, k);
        Ok(out)
    }

    fn mul_inverse_int(&self, ct: &ClearCiphertext, n: u64) -> EngineResult<ClearCiphertext> {
        if n == 0 {
            return Err(EngineError::InvalidOperand("0 has no inverse".into()));
        }
        let mut out = ct.clone();
        poly::scale_assign(&mut out.values, 1.0 / n as f64);
        Ok(out)
    }

    fn automorphism(
        &self,
        ct: &ClearCiphertext,
        galois_element: usize,
        key: &ClearSwitchingKey,
    ) -> EngineResult<ClearCiphertext> {
        Self::require_coefficients(ct, "automorphism")?;
        Self::check_ring(key.resolution, ct.resolution)?;
        if key.galois != Some(galois_element) {
            return Err(EngineError::MissingKey(format!(
                "Galois key for element {}",
                galois_element
            )));
        }

        let mut out = ct.clone();
        out.values = apply_automorphism(&ct.values, galois_element);
        out.key = match ct.key {
            KeyTag::Trivial => KeyTag::Trivial,
            KeyTag::Secret(id) => KeyTag::Automorphed {
                id,
                galois: galois_element,
            },
            other => {
                return Err(EngineError::KeyMismatch(format!(
                    "automorphism of a ciphertext under {:?}",
                    other
                )))
            }
        };
        self.apply_switching_key(&out, key)
    }

    fn switch_ring_degree(
        &self,
        ct: &ClearCiphertext,
        target: &ResolutionParams,
    ) -> EngineResult<ClearCiphertext> {
        Self::require_coefficients(ct, "switch_ring_degree")?;
        let mut out = ct.clone();
        out.level = ct.level.min(target.max_level());
        out.log_q = target.log_q.clone();

        if target.resolution == ct.resolution {
            return Ok(out);
        }
        Self::check_ring(ct.resolution.next(), target.resolution)?;

        out.resolution = target.resolution;
        out.values = poly::embed_square(&ct.values);
        out.key = match ct.key {
            KeyTag::Trivial => KeyTag::Trivial,
            KeyTag::Secret(id) => KeyTag::Embedded(id),
            other => {
                return Err(EngineError::KeyMismatch(format!(
                    "ring switch of a ciphertext under {:?}",
                    other
                )))
            }
        };
        Ok(out)
    }

    fn apply_switching_key(
        &self,
        ct: &ClearCiphertext,
        key: &ClearSwitchingKey,
    ) -> EngineResult<ClearCiphertext> {
        Self::check_ring(key.resolution, ct.resolution)?;
        let mut out = ct.clone();
        match ct.key {
            KeyTag::Trivial => return Ok(out),
            k if k == key.from => out.key = KeyTag::Secret(key.to),
            other => {
                return Err(EngineError::KeyMismatch(format!(
                    "switching key from {:?} applied to {:?}",
                    key.from, other
                )))
            }
        }
        self.add_noise(&mut out.values, Self::switching_noise(key.sigma, ct.log_scale));
        Ok(out)
    }

    fn bootstrap(
        &self,
        ct: &ClearCiphertext,
        evk: &ClearEvaluationKeys,
    ) -> EngineResult<ClearCiphertext> {
        Self::require_slots(ct, "bootstrap")?;
        Self::check_evk(ct, evk)?;
        if let Some(v) = ct.values.iter().find(|v| !v.is_finite()) {
            return Err(EngineError::InvalidOperand(format!("cannot bootstrap {}", v)));
        }

        let mut out = ct.clone();
        out.level = evk.max_level();
        out.log_q = evk.log_q.clone();
        out.log_scale = evk.log_default_scale as f64;
        self.add_noise(&mut out.values, (-evk.bootstrap.log_precision).exp2());
        self.bootstraps.fetch_add(1, Ordering::Relaxed);
        Ok(out)
    }

    fn scale_down(
        &self,
        ct: &ClearCiphertext,
        evk: &ClearEvaluationKeys,
    ) -> EngineResult<ClearCiphertext> {
        Self::require_coefficients(ct, "scale_down")?;
        Self::check_evk(ct, evk)?;
        let mut out = ct.clone();
        out.level = 0;
        out.log_scale = evk.log_default_scale as f64;
        Ok(out)
    }

    fn mod_up(
        &self,
        ct: &ClearCiphertext,
        evk: &ClearEvaluationKeys,
    ) -> EngineResult<ClearCiphertext> {
        Self::require_coefficients(ct, "mod_up")?;
        Self::check_evk(ct, evk)?;
        if ct.level != 0 {
            return Err(EngineError::InvalidOperand(format!(
                "mod_up expects level 0, found {}",
                ct.level
            )));
        }

        let ratio = evk.bootstrap.message_ratio();
        let mut out = ct.clone();
        out.level = evk.max_level() + evk.bootstrap.extra_levels;
        out.log_q = evk.log_q.clone();
        let mut sampler = self.sampler();
        for v in out.values.iter_mut() {
            *v += ratio * sampler.uniform_centered(evk.bootstrap.k_bound) as f64;
        }
        Ok(out)
    }

    fn coeffs_to_slots(
        &self,
        ct: &ClearCiphertext,
        evk: &ClearEvaluationKeys,
    ) -> EngineResult<(ClearCiphertext, Option<ClearCiphertext>)> {
        Self::require_coefficients(ct, "coeffs_to_slots")?;
        Self::check_evk(ct, evk)?;
        let depth = evk.bootstrap.coeffs_to_slots_depth;
        if ct.level < depth {
            return Err(EngineError::LevelExhausted { operation: "coeffs_to_slots" });
        }

        let n = ct.resolution.ring_dim();
        let log_n = ct.resolution.log_n();
        let mut half = ct.clone();
        half.batched = true;
        half.montgomery = false;
        half.level = ct.level - depth;

        if ct.log_slots + 1 >= log_n {
            let mut real = half.clone();
            real.log_slots = log_n - 1;
            real.values = ct.values[..n / 2].to_vec();
            let mut imag = half;
            imag.log_slots = log_n - 1;
            imag.values = ct.values[n / 2..].to_vec();
            return Ok((real, Some(imag)));
        }

        // Sparse packing lives in the subring of X^gap
        let slots = 1usize << ct.log_slots;
        let gap = n / (2 * slots);
        half.values = (0..slots).map(|i| ct.values[i * gap]).collect();
        Ok((half, None))
    }

    fn eval_mod(
        &self,
        ct: &ClearCiphertext,
        evk: &ClearEvaluationKeys,
    ) -> EngineResult<ClearCiphertext> {
        Self::require_slots(ct, "eval_mod")?;
        Self::check_evk(ct, evk)?;
        let depth = evk.bootstrap.eval_mod_depth;
        if ct.level < depth {
            return Err(EngineError::LevelExhausted { operation: "eval_mod" });
        }

        let ratio = evk.bootstrap.message_ratio();
        let mut out = ct.clone();
        out.level -= depth;
        for v in out.values.iter_mut() {
            *v -= ratio * (*v / ratio).round();
        }
        self.add_noise(&mut out.values, (-evk.bootstrap.log_precision).exp2());
        Ok(out)
    }
}
