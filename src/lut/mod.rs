//! Encrypted lookup tables
//!
//! A scoring function f over [a, b) is discretized into `points` grid values
//! and stored as encrypted selector tables at the packing resolution. Block i
//! covers grid indices [i·N, (i+1)·N) and holds
//!
//! ```text
//! u(X) = f(x_{iN}) - Σ_{k≥1} f(x_{iN+k}) · X^(N-k)
//! ```
//!
//! so that u(X) · X^k carries f(x_{iN+k}) in its constant coefficient.
//! Looking up a value is therefore one ciphertext × monomial product.

mod encoder;
mod function;

use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::error::{invalid_argument, PdeError, Result};
use crate::params::Resolution;

pub use encoder::LookupTableEncoder;
pub use function::ScoringFunction;

/// Interval and granularity of a scoring function's discretization
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Domain {
    pub start: f64,
    pub end: f64,
    pub points: usize,
}

impl Domain {
    pub fn new(start: f64, end: f64, points: usize) -> Result<Self> {
        if !(start.is_finite() && end.is_finite() && start < end) {
            return Err(invalid_argument!("empty interval [{}, {})", start, end));
        }
        if points < 2 {
            return Err(invalid_argument!("at least two discretization points required"));
        }
        Ok(Self { start, end, points })
    }

    pub fn interval(&self) -> (f64, f64) {
        (self.start, self.end)
    }

    /// Distance between two grid points in normalized units
    pub fn step(&self) -> f64 {
        1.0 / self.points as f64
    }

    /// Map x ∈ [a, b) to [0, 1)
    pub fn normalize(&self, x: f64) -> f64 {
        ((2.0 * x - self.end - self.start) / (self.end - self.start) + 1.0) / 2.0
    }

    /// Grid point k: a + k·(b - a)/points
    pub fn grid_point(&self, k: usize) -> f64 {
        let t = k as f64 / self.points as f64;
        ((2.0 * t - 1.0) * (self.end - self.start) + self.end + self.start) / 2.0
    }

    /// Grid index looked up for x
    ///
    /// Fails with `OutOfDomain` below the interval, or when x lies within one
    /// step of the upper bound.
    pub fn position(&self, x: f64) -> Result<usize> {
        let value = self.normalize(x);
        let step = self.step();
        if !value.is_finite() || value < 0.0 || value + step >= 1.0 {
            return Err(PdeError::OutOfDomain {
                value: x,
                interval: self.interval(),
            });
        }
        Ok((value / step).round() as usize)
    }

    /// Number of table blocks at ring dimension n
    pub fn blocks(&self, n: usize) -> usize {
        (self.points + n - 1) / n
    }
}

/// Encrypted table of one scoring function
///
/// Only the domain travels in the clear; the function values are encrypted.
#[derive(Debug, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct LookupTable<E: Engine> {
    pub(crate) domain: Domain,
    pub(crate) resolution: Resolution,
    pub(crate) blocks: Vec<E::Ciphertext>,
}

impl<E: Engine> LookupTable<E> {
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn blocks(&self) -> &[E::Ciphertext] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

impl<E: Engine> Clone for LookupTable<E> {
    fn clone(&self) -> Self {
        Self {
            domain: self.domain,
            resolution: self.resolution,
            blocks: self.blocks.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_and_grid() {
        let domain = Domain::new(-20.0, 20.0, 64).unwrap();
        assert_eq!(domain.normalize(-20.0), 0.0);
        assert_eq!(domain.normalize(0.0), 0.5);
        assert_eq!(domain.grid_point(0), -20.0);
        assert_eq!(domain.grid_point(32), 0.0);
        assert_eq!(domain.blocks(16), 4);
        assert_eq!(domain.blocks(128), 1);
    }

    #[test]
    fn test_position_boundaries() {
        let domain = Domain::new(0.0, 4.0, 64).unwrap();
        let step = (domain.end - domain.start) / domain.points as f64;

        assert_eq!(domain.position(0.0).unwrap(), 0);
        assert_eq!(domain.position(4.0 - 2.0 * step).unwrap(), 62);
        assert!(matches!(
            domain.position(4.0 - step),
            Err(PdeError::OutOfDomain { .. })
        ));
        assert!(domain.position(-0.01).is_err());
        assert!(domain.position(f64::NAN).is_err());
    }

    #[test]
    fn test_invalid_domain() {
        assert!(Domain::new(1.0, 1.0, 16).is_err());
        assert!(Domain::new(0.0, 1.0, 1).is_err());
    }
}
