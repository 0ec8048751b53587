//! Client-side scoring functions

use std::fmt;
use std::sync::Arc;

use super::Domain;
use crate::error::{invalid_argument, Result};

/// Real function on a bounded interval, with a declared output bound
///
/// The bound `max` caps the scaled row sums against the EvalMod range.
#[derive(Clone)]
pub struct ScoringFunction {
    f: Arc<dyn Fn(f64) -> f64 + Send + Sync>,
    domain: Domain,
    max: f64,
}

impl ScoringFunction {
    pub fn new(
        f: impl Fn(f64) -> f64 + Send + Sync + 'static,
        interval: (f64, f64),
        points: usize,
        max: f64,
    ) -> Result<Self> {
        if !(max.is_finite() && max >= 0.0) {
            return Err(invalid_argument!("maximum {} must be finite and non-negative", max));
        }
        Ok(Self {
            f: Arc::new(f),
            domain: Domain::new(interval.0, interval.1, points)?,
            max,
        })
    }

    /// `floor(x / divisor) * alpha`, with its maximum taken over the grid
    pub fn step(interval: (f64, f64), points: usize, divisor: f64, alpha: f64) -> Result<Self> {
        if divisor == 0.0 {
            return Err(invalid_argument!("step divisor must be non-zero"));
        }
        let f = move |x: f64| (x / divisor).floor() * alpha;
        let domain = Domain::new(interval.0, interval.1, points)?;
        let max = grid_max(&f, &domain);
        Self::new(f, interval, points, max)
    }

    /// `weight` above `cut`, zero elsewhere
    pub fn indicator(interval: (f64, f64), points: usize, cut: f64, weight: f64) -> Result<Self> {
        Self::new(
            move |x| if x > cut { weight } else { 0.0 },
            interval,
            points,
            weight.abs(),
        )
    }

    pub fn eval(&self, x: f64) -> f64 {
        (self.f)(x)
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Smallest and largest value stored in the table
    pub fn range(&self) -> (f64, f64) {
        (0..self.domain.points)
            .map(|k| self.eval(self.domain.grid_point(k)))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
    }

    /// Value actually stored for x: f at the nearest grid point
    pub fn discretize(&self, x: f64) -> Result<f64> {
        let position = self.domain.position(x)?;
        Ok(self.eval(self.domain.grid_point(position)))
    }
}

fn grid_max(f: &impl Fn(f64) -> f64, domain: &Domain) -> f64 {
    (0..domain.points)
        .map(|k| f(domain.grid_point(k)).abs())
        .fold(0.0, f64::max)
}

impl fmt::Debug for ScoringFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScoringFunction")
            .field("domain", &self.domain)
            .field("max", &self.max)
            .finish_non_exhaustive()
    }
}
