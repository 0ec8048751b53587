//! Parameter sets for private database exploration
//!
//! A query spans a chain of ring-dimension resolutions, from the packing
//! resolution (where lookup tables live) up to the evaluation resolution
//! (where scheme switching, comparisons and bootstrapping run).

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PdeError, Result};

/// Ring-dimension exponent: a resolution `r` has ring dimension `N = 2^r`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Resolution(pub u32);

impl Resolution {
    /// Ring dimension N = 2^r
    pub fn ring_dim(self) -> usize {
        1 << self.0
    }

    /// Number of complex slots N/2
    pub fn slots(self) -> usize {
        1 << (self.0 - 1)
    }

    /// Next resolution up the chain
    pub fn next(self) -> Resolution {
        Resolution(self.0 + 1)
    }

    /// Exponent log2(N)
    pub fn log_n(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogN={}", self.0)
    }
}

/// Bootstrapping and scheme-switching circuit parameters
///
/// The coefficients-to-slots and EvalMod circuits run on a modulus chain
/// extended by `extra_levels` above the residual chain; after EvalMod the
/// ciphertext is dropped back to the residual maximum level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapParams {
    /// Levels added on top of the residual chain by ModUp
    pub extra_levels: usize,

    /// Depth of the homomorphic coefficients-to-slots transform
    pub coeffs_to_slots_depth: usize,

    /// Depth of the EvalMod polynomial
    pub eval_mod_depth: usize,

    /// log2 of q0/Δ, the message ratio EvalMod reduces by
    pub log_message_ratio: u32,

    /// Bound K on the integer overflow introduced by ModUp
    pub k_bound: i64,

    /// Bits of precision retained by EvalMod and bootstrapping
    pub log_precision: f64,
}

impl Default for BootstrapParams {
    fn default() -> Self {
        Self {
            extra_levels: 12,
            coeffs_to_slots_depth: 4,
            eval_mod_depth: 8,
            log_message_ratio: 0,
            k_bound: 16,
            log_precision: 26.0,
        }
    }
}

impl BootstrapParams {
    /// Levels consumed by coefficients-to-slots followed by EvalMod
    pub fn depth(&self) -> usize {
        self.coeffs_to_slots_depth + self.eval_mod_depth
    }

    /// Message ratio q0/Δ
    pub fn message_ratio(&self) -> f64 {
        (self.log_message_ratio as f64).exp2()
    }
}

/// Parameter set of a single resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionParams {
    /// Resolution (ring dimension exponent)
    pub resolution: Resolution,

    /// Bit sizes of the ciphertext moduli q_0..q_L
    pub log_q: Vec<u32>,

    /// Bit sizes of the key-switching special primes
    pub log_p: Vec<u32>,

    /// log2 of the default scale Δ
    pub log_default_scale: u32,

    /// Standard deviation of the error distribution
    pub sigma: f64,

    /// Hamming weight of the ternary secret
    pub hamming_weight: usize,
}

impl ResolutionParams {
    /// Ring dimension N
    pub fn ring_dim(&self) -> usize {
        self.resolution.ring_dim()
    }

    /// Ring dimension exponent
    pub fn log_n(&self) -> u32 {
        self.resolution.log_n()
    }

    /// Number of complex slots N/2
    pub fn slots(&self) -> usize {
        self.resolution.slots()
    }

    /// Highest level of the modulus chain
    pub fn max_level(&self) -> usize {
        self.log_q.len() - 1
    }

    /// Bit size of q_level
    pub fn log_q_at(&self, level: usize) -> u32 {
        self.log_q[level.min(self.max_level())]
    }

    /// Bit size of q_0·...·q_level
    pub fn log_q_total(&self, level: usize) -> u32 {
        self.log_q[..=level.min(self.max_level())].iter().sum()
    }
}

/// Core parameters for a private database exploration query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdeParams {
    /// Packing resolution: lookup tables and row packing happen here
    pub min_log_n: u32,

    /// Evaluation resolution: scheme switching and thresholds happen here
    pub max_log_n: u32,

    /// Evaluation modulus chain (bits per prime)
    pub log_q: Vec<u32>,

    /// Special primes for key switching (bits per prime)
    pub log_p: Vec<u32>,

    /// log2 of the default scale
    pub log_default_scale: u32,

    /// Error standard deviation
    pub sigma: f64,

    /// Secret Hamming weight
    pub hamming_weight: usize,

    /// Lookup-table outputs are pre-scaled by 2^-log_score_scaling so packed
    /// sums stay inside the EvalMod range; scheme switching multiplies it back.
    pub log_score_scaling: u32,

    /// Scheme-switching and bootstrapping circuit parameters
    pub bootstrap: BootstrapParams,
}

impl PdeParams {
    /// Parameters of the reference deployment: pack at N=2^12, evaluate at N=2^16
    pub fn paper_default() -> Self {
        Self {
            min_log_n: 12,
            max_log_n: 16,
            log_q: vec![60, 45, 45, 45, 45, 45, 45, 45, 45],
            log_p: vec![48, 55, 55],
            log_default_scale: 45,
            sigma: 3.2,
            hamming_weight: 192,
            log_score_scaling: 8,
            bootstrap: BootstrapParams::default(),
        }
    }

    /// Small insecure parameters for tests: pack at N=16, evaluate at N=64
    pub fn test_small() -> Self {
        Self {
            min_log_n: 4,
            max_log_n: 6,
            log_q: vec![60, 45, 45, 45, 45, 45, 45, 45, 45, 45],
            log_p: vec![61],
            log_default_scale: 45,
            sigma: 3.2,
            hamming_weight: 16,
            log_score_scaling: 8,
            bootstrap: BootstrapParams::default(),
        }
    }

    /// Packing resolution
    pub fn min_resolution(&self) -> Resolution {
        Resolution(self.min_log_n)
    }

    /// Evaluation resolution
    pub fn max_resolution(&self) -> Resolution {
        Resolution(self.max_log_n)
    }

    /// Ordered resolution chain [min..=max]
    pub fn resolutions(&self) -> Vec<Resolution> {
        (self.min_log_n..=self.max_log_n).map(Resolution).collect()
    }

    /// Number of packing-resolution ciphertexts merged into one evaluation ciphertext
    pub fn merge_ratio(&self) -> usize {
        1 << (self.max_log_n - self.min_log_n)
    }

    /// Score pre-scaling factor 2^-log_score_scaling applied by the client
    pub fn score_scaling(&self) -> f64 {
        (-(self.log_score_scaling as f64)).exp2()
    }

    /// Parameter set at `res`.
    ///
    /// Resolutions below the evaluation resolution keep only q_0: data there
    /// is coefficient-encoded and never multiplied by another ciphertext.
    pub fn resolution_params(&self, res: Resolution) -> Result<ResolutionParams> {
        if res.0 < self.min_log_n || res.0 > self.max_log_n {
            return Err(PdeError::Configuration(format!(
                "{} outside resolution chain [{}, {}]",
                res, self.min_log_n, self.max_log_n
            )));
        }

        let log_q = if res.0 == self.max_log_n {
            self.log_q.clone()
        } else {
            self.log_q[..1].to_vec()
        };

        Ok(ResolutionParams {
            resolution: res,
            log_q,
            log_p: self.log_p.clone(),
            log_default_scale: self.log_default_scale,
            sigma: self.sigma,
            hamming_weight: self.hamming_weight,
        })
    }

    /// Check if parameters are valid
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(PdeError::Configuration(msg.to_string()));

        if self.min_log_n < 2 {
            return fail("min_log_n must be at least 2");
        }
        if self.max_log_n < self.min_log_n {
            return fail("max_log_n must be >= min_log_n");
        }
        if self.max_log_n > 17 {
            return fail("max_log_n must be <= 17");
        }
        if self.log_q.len() < 2 {
            return fail("log_q must hold at least two primes");
        }
        if self.log_q.iter().any(|&b| b == 0 || b > 61) {
            return fail("log_q primes must be between 1 and 61 bits");
        }
        if self.log_p.is_empty() {
            return fail("log_p must hold at least one special prime");
        }
        if self.log_default_scale == 0 || self.log_default_scale >= self.log_q[0] {
            return fail("log_default_scale must be positive and below log_q[0]");
        }
        if !(self.sigma > 0.0) {
            return fail("sigma must be positive");
        }
        if self.hamming_weight == 0 || self.hamming_weight > 1 << self.min_log_n {
            return fail("hamming_weight must be in 1..=N_min");
        }
        if self.bootstrap.extra_levels < self.bootstrap.depth() {
            return fail(
                "bootstrap.extra_levels must cover coefficients-to-slots and EvalMod depth",
            );
        }
        if self.bootstrap.k_bound < 0 {
            return fail("bootstrap.k_bound must be non-negative");
        }

        Ok(())
    }

    /// Parse parameters from JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        let params: Self = serde_json::from_str(json)
            .map_err(|e| PdeError::Configuration(format!("invalid parameter JSON: {}", e)))?;
        params.validate()?;
        Ok(params)
    }

    /// Load parameters from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            PdeError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Serialize parameters as pretty-printed JSON
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| PdeError::Configuration(format!("cannot serialize parameters: {}", e)))
    }
}

impl Default for PdeParams {
    fn default() -> Self {
        Self::paper_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_valid() {
        assert!(PdeParams::default().validate().is_ok());
        assert!(PdeParams::test_small().validate().is_ok());
    }

    #[test]
    fn test_resolution_chain() {
        let params = PdeParams::paper_default();
        let chain = params.resolutions();
        assert_eq!(chain.first(), Some(&Resolution(12)));
        assert_eq!(chain.last(), Some(&Resolution(16)));
        assert_eq!(chain.len(), 5);
        assert_eq!(params.merge_ratio(), 16);
    }

    #[test]
    fn test_lower_resolutions_keep_first_prime() {
        let params = PdeParams::test_small();

        let low = params.resolution_params(Resolution(4)).unwrap();
        assert_eq!(low.log_q, vec![60]);
        assert_eq!(low.max_level(), 0);
        assert_eq!(low.ring_dim(), 16);

        let top = params.resolution_params(Resolution(6)).unwrap();
        assert_eq!(top.max_level(), params.log_q.len() - 1);
        assert_eq!(top.slots(), 32);

        assert!(params.resolution_params(Resolution(7)).is_err());
        assert!(params.resolution_params(Resolution(3)).is_err());
    }

    #[test]
    fn test_invalid_chain_rejected() {
        let mut params = PdeParams::test_small();
        params.max_log_n = 3;
        assert!(matches!(params.validate(), Err(PdeError::Configuration(_))));

        let mut params = PdeParams::test_small();
        params.bootstrap.extra_levels = 2;
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let params = PdeParams::test_small();
        let json = params.to_json_string().unwrap();
        let parsed = PdeParams::from_json_str(&json).unwrap();
        assert_eq!(parsed, params);
    }

    #[test]
    fn test_json_file() {
        use std::io::Write;

        let params = PdeParams::paper_default();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(params.to_json_string().unwrap().as_bytes()).unwrap();

        let loaded = PdeParams::from_json_file(file.path()).unwrap();
        assert_eq!(loaded, params);
    }
}
