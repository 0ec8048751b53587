//! Gaussian sampling for error generation

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// Default Gaussian standard deviation
pub const DEFAULT_SIGMA: f64 = 3.2;

/// Continuous Gaussian sampler driven by a ChaCha20 stream
#[derive(Clone, Debug)]
pub struct GaussianSampler {
    /// Standard deviation σ
    sigma: f64,
    /// RNG for sampling
    rng: ChaCha20Rng,
}

impl GaussianSampler {
    /// Create a new Gaussian sampler seeded from OS entropy
    pub fn new(sigma: f64) -> Self {
        Self {
            sigma,
            rng: ChaCha20Rng::from_entropy(),
        }
    }

    /// Create a seeded sampler for reproducibility
    pub fn with_seed(sigma: f64, seed: u64) -> Self {
        Self {
            sigma,
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    /// Standard normal sample using the Box-Muller transform
    pub fn standard(&mut self) -> f64 {
        let u1: f64 = self.rng.gen_range(f64::MIN_POSITIVE..1.0);
        let u2: f64 = self.rng.gen_range(0.0..1.0);
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    /// Sample from N(0, σ²)
    pub fn sample(&mut self) -> f64 {
        self.standard() * self.sigma
    }

    /// Sample from N(0, std²) for an explicit standard deviation
    pub fn sample_with(&mut self, std: f64) -> f64 {
        self.standard() * std
    }

    /// Uniform integer in [-bound, bound]
    pub fn uniform_centered(&mut self, bound: i64) -> i64 {
        self.rng.gen_range(-bound..=bound)
    }

    /// Uniform 64-bit identifier
    pub fn next_u64(&mut self) -> u64 {
        self.rng.gen()
    }
}
