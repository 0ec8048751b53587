//! Resolution merging
//!
//! Two ciphertexts `even`, `odd` at resolution r (ring dimension N) become one
//! ciphertext at r+1 (ring dimension 2N) holding
//!
//! ```text
//! out(X) = even(Y) + X·odd(Y),   Y = X²
//! ```
//!
//! so out's even coefficients are even's coefficients and its odd
//! coefficients are odd's. The result decrypts under the secret of r+1 after
//! applying the registry's conversion key.

use std::time::Instant;

use rayon::prelude::*;
use tracing::debug;

use super::XPow2Table;
use crate::engine::{CiphertextInfo, Engine};
use crate::error::{invalid_argument, PdeError, Result, Stage};
use crate::params::Resolution;
use crate::registry::ResolutionRegistry;

/// Merges ciphertexts upward through the resolution chain
pub struct MergeEvaluator<'a, E: Engine> {
    engine: &'a E,
    registry: &'a ResolutionRegistry<E>,
    xpow: XPow2Table<E>,
}

impl<'a, E: Engine> MergeEvaluator<'a, E> {
    /// Precomputes X^(2^i) at every resolution that can receive a merge
    pub fn new(engine: &'a E, registry: &'a ResolutionRegistry<E>) -> Result<Self> {
        let xpow = XPow2Table::new(engine, registry)?;
        Ok(Self {
            engine,
            registry,
            xpow,
        })
    }

    /// Check that `res` can be merged one step up the chain
    fn check_mergeable(&self, res: Resolution) -> Result<()> {
        let (min, max) = (self.registry.min_resolution(), self.registry.max_resolution());
        if min == max {
            return Err(invalid_argument!(
                "single-resolution chain {}: nothing to merge into",
                min
            ));
        }
        if res >= max {
            return Err(PdeError::ResolutionMismatch {
                expected: Resolution(max.log_n() - 1),
                found: res,
            });
        }
        if res < min {
            return Err(PdeError::ResolutionMismatch {
                expected: min,
                found: res,
            });
        }
        Ok(())
    }

    /// Merge `even` and the optional `odd` into `output`
    ///
    /// `output` must already live at the next resolution; its content is
    /// replaced.
    pub fn merge(
        &self,
        even: &E::Ciphertext,
        odd: Option<&E::Ciphertext>,
        output: &mut E::Ciphertext,
    ) -> Result<()> {
        self.check_mergeable(even.resolution())?;
        let target = even.resolution().next();
        if output.resolution() != target {
            return Err(PdeError::ResolutionMismatch {
                expected: target,
                found: output.resolution(),
            });
        }
        *output = self.merge_new(even, odd)?;
        Ok(())
    }

    /// Merge `even` and the optional `odd` into a fresh ciphertext at r+1
    ///
    /// A missing `odd` is treated as an encryption of zero.
    pub fn merge_new(
        &self,
        even: &E::Ciphertext,
        odd: Option<&E::Ciphertext>,
    ) -> Result<E::Ciphertext> {
        let res = even.resolution();
        self.check_mergeable(res)?;
        if let Some(odd) = odd {
            if odd.resolution() != res {
                return Err(invalid_argument!(
                    "cannot merge {} with {}",
                    res,
                    odd.resolution()
                ));
            }
        }

        let target = res.next();
        let target_params = self.registry.parameters_at(target)?;

        let mut merged = self
            .engine
            .switch_ring_degree(even, target_params)
            .map_err(PdeError::engine(Stage::Merge))?;

        if let Some(odd) = odd {
            let odd_up = self
                .engine
                .switch_ring_degree(odd, target_params)
                .map_err(PdeError::engine(Stage::Merge))?;
            // X^(2^0) = X
            let x = self.xpow.get(target, 0)?;
            self.engine
                .mul_plain_then_add(&odd_up, x, &mut merged)
                .map_err(PdeError::engine(Stage::Merge))?;
        }

        let key = self.registry.conversion_key(res, target)?;
        let mut merged = self
            .engine
            .apply_switching_key(&merged, key)
            .map_err(PdeError::engine(Stage::Merge))?;
        merged.set_log_slots(even.log_slots() + 1);
        Ok(merged)
    }

    /// Merge a batch of ciphertexts at one resolution all the way to maxRes
    ///
    /// Consecutive pairs are merged level by level (pairs of one level in
    /// parallel); an unpaired last ciphertext is merged with zero. A single
    /// ciphertext below maxRes is then merged with zero until it reaches
    /// maxRes. At most 2^(maxRes - r) ciphertexts fit.
    pub fn merge_tree(&self, cts: Vec<E::Ciphertext>) -> Result<E::Ciphertext> {
        let res = match cts.first() {
            Some(ct) => ct.resolution(),
            None => return Err(invalid_argument!("no ciphertexts to merge")),
        };
        if let Some(ct) = cts.iter().find(|ct| ct.resolution() != res) {
            return Err(invalid_argument!(
                "mixed resolutions in merge tree: {} and {}",
                res,
                ct.resolution()
            ));
        }

        let max = self.registry.max_resolution();
        if res > max || res < self.registry.min_resolution() {
            return Err(PdeError::ResolutionMismatch {
                expected: max,
                found: res,
            });
        }
        let capacity = 1usize << (max.log_n() - res.log_n());
        if cts.len() > capacity {
            return Err(invalid_argument!(
                "too many ciphertexts: {} at {} but at most {} fit {}",
                cts.len(),
                res,
                capacity,
                max
            ));
        }

        let start = Instant::now();
        let count = cts.len();
        let mut level = cts;
        while level.len() > 1 {
            level = level
                .par_chunks(2)
                .map(|pair| self.merge_new(&pair[0], pair.get(1)))
                .collect::<Result<Vec<_>>>()?;
        }

        let mut merged = level
            .pop()
            .ok_or_else(|| invalid_argument!("no ciphertexts to merge"))?;
        while merged.resolution() < max {
            merged = self.merge_new(&merged, None)?;
        }

        debug!(
            "merged {} ciphertexts from {} to {} in {:.2?}",
            count,
            res,
            max,
            start.elapsed()
        );
        Ok(merged)
    }
}
