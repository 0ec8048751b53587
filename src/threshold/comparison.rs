//! Homomorphic step function from a composite sign preset
//!
//! Each stage polynomial p(x) = Σ c_k T_k(x) is evaluated in the Chebyshev
//! basis. Only the T_k reachable from the non-zero coefficients are built:
//!
//! ```text
//! T_2m   = 2·T_m² - 1
//! T_2m+1 = 2·T_m·T_m+1 - T_1
//! ```
//!
//! so T_k costs ⌈log2 k⌉ levels and the scalar products one more. The last
//! stage absorbs the affine map (s + 1) / 2, turning sign into step.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::CompositeSignPreset;
use crate::engine::{CiphertextInfo, Engine};
use crate::error::{invalid_argument, PdeError, Result, Stage};
use crate::math::chebyshev;

/// Evaluates Step(x) = (sign(x) + 1) / 2 on slot-encoded ciphertexts
pub struct ComparisonEvaluator<'a, E: Engine> {
    engine: &'a E,
    evk: &'a E::EvaluationKeys,
    preset: CompositeSignPreset,
    stage: Stage,
}

impl<'a, E: Engine> ComparisonEvaluator<'a, E> {
    pub fn new(
        engine: &'a E,
        evk: &'a E::EvaluationKeys,
        preset: CompositeSignPreset,
        stage: Stage,
    ) -> Self {
        Self {
            engine,
            evk,
            preset,
            stage,
        }
    }

    pub fn preset(&self) -> &CompositeSignPreset {
        &self.preset
    }

    /// Apply the composite step approximation to every slot of `ct`
    ///
    /// Inputs must lie in [-1, 1]. A bootstrap is inserted before any stage
    /// whose depth exceeds the remaining level.
    pub fn step(&self, ct: &E::Ciphertext) -> Result<E::Ciphertext> {
        let stages = self.preset.polys.len();
        let mut x = ct.clone();

        for (i, poly) in self.preset.polys.iter().enumerate() {
            let coeffs: Vec<f64> = if i + 1 == stages {
                let mut folded: Vec<f64> = poly.iter().map(|c| 0.5 * c).collect();
                if let Some(c0) = folded.first_mut() {
                    *c0 += 0.5;
                }
                folded
            } else {
                poly.to_vec()
            };

            let depth = chebyshev::series_depth(coeffs.len().saturating_sub(1));
            if x.level() < depth {
                debug!(
                    "{}: level {} below stage depth {}, bootstrapping",
                    self.preset.id,
                    x.level(),
                    depth
                );
                x = self
                    .engine
                    .bootstrap(&x, self.evk)
                    .map_err(PdeError::engine(Stage::Bootstrap))?;
            }

            x = self.eval_series(&x, &coeffs)?;
        }

        Ok(x)
    }

    /// Σ c_k T_k(x) followed by a single rescale
    fn eval_series(&self, x: &E::Ciphertext, coeffs: &[f64]) -> Result<E::Ciphertext> {
        let wrap = || PdeError::engine(self.stage);

        let terms: Vec<usize> = (1..coeffs.len()).filter(|&k| coeffs[k] != 0.0).collect();
        if terms.is_empty() {
            return Err(invalid_argument!("constant polynomial in {}", self.preset.id));
        }

        // Walk down from the highest term to find every T_k the recurrences touch
        let mut needed: BTreeSet<usize> = terms.iter().copied().collect();
        for k in (2..coeffs.len()).rev() {
            if needed.contains(&k) {
                needed.insert(k / 2);
                if k % 2 == 1 {
                    needed.insert(k / 2 + 1);
                }
            }
        }

        let mut basis: BTreeMap<usize, E::Ciphertext> = BTreeMap::new();
        basis.insert(1, x.clone());
        for &k in needed.iter().filter(|&&k| k >= 2) {
            let m = k / 2;
            let (a, b) = if k % 2 == 0 { (m, m) } else { (m, m + 1) };
            let product = self
                .engine
                .mul_relin(&basis[&a], &basis[&b], self.evk)
                .and_then(|p| self.engine.rescale(&p))
                .and_then(|p| self.engine.mul_int(&p, 2))
                .map_err(wrap())?;
            let t_k = if k % 2 == 0 {
                self.engine.add_const(&product, -1.0)
            } else {
                self.engine.sub(&product, &basis[&1])
            }
            .map_err(wrap())?;
            basis.insert(k, t_k);
        }

        // Align every term on the deepest level so the scalar products share a scale
        let floor = terms
            .iter()
            .map(|k| basis[k].level())
            .min()
            .unwrap_or(0);

        let mut acc: Option<E::Ciphertext> = None;
        for &k in &terms {
            let t_k = &basis[&k];
            let aligned = if t_k.level() > floor {
                self.engine.drop_level(t_k, t_k.level() - floor).map_err(wrap())?
            } else {
                t_k.clone()
            };
            let term = self.engine.mul_const(&aligned, coeffs[k]).map_err(wrap())?;
            acc = Some(match acc {
                None => term,
                Some(sum) => self.engine.add(&sum, &term).map_err(wrap())?,
            });
        }

        let acc =
            acc.ok_or_else(|| invalid_argument!("constant polynomial in {}", self.preset.id))?;
        let mut out = self.engine.rescale(&acc).map_err(wrap())?;
        if coeffs[0] != 0.0 {
            out = self.engine.add_const(&out, coeffs[0]).map_err(wrap())?;
        }
        Ok(out)
    }
}
