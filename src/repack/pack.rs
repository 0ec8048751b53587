//! Automorphism-tree packing
//!
//! Packs ciphertexts ct_0..ct_{N-1} (each meaningful only in its constant
//! coefficient) into one ciphertext whose coefficient j holds ct_j's constant
//! coefficient. Every other coefficient of the inputs is annihilated.
//!
//! # Algorithm
//!
//! Level ℓ pairs inputs `start` and `start + 2^(log N - ℓ)`:
//!
//! ```text
//! y   = X^(N / 2^ℓ)
//! ct  = (ct_even + y·ct_odd) + τ_t(ct_even - y·ct_odd),   t = 2^ℓ + 1
//! ```
//!
//! After log N levels the wanted coefficients are multiplied by N, so the
//! inputs are first multiplied by N^-1. A missing input is an encryption of
//! zero and its branch of the formula is skipped.

use std::collections::BTreeMap;

use crate::engine::{CiphertextInfo, Engine};
use crate::error::{invalid_argument, PdeError, Result, Stage};
use crate::registry::{PackingKeys, ResolutionRegistry};

/// Packs per-row ciphertexts using the registry's automorphism keys
pub struct PackEvaluator<'a, E: Engine> {
    engine: &'a E,
    registry: &'a ResolutionRegistry<E>,
}

impl<'a, E: Engine> PackEvaluator<'a, E> {
    pub fn new(engine: &'a E, registry: &'a ResolutionRegistry<E>) -> Self {
        Self { engine, registry }
    }

    /// Pack `slots` (index → ciphertext at one resolution) into one ciphertext
    ///
    /// # Returns
    /// A coefficient-encoded ciphertext at the same resolution whose
    /// coefficient j is the constant coefficient of `slots[j]`, or zero when
    /// index j is absent.
    pub fn pack(&self, slots: &BTreeMap<usize, E::Ciphertext>) -> Result<E::Ciphertext> {
        let res = match slots.values().next() {
            Some(ct) => ct.resolution(),
            None => return Err(invalid_argument!("nothing to pack")),
        };
        let n = res.ring_dim();
        let log_n = res.log_n() as usize;

        if slots.len() > n {
            return Err(invalid_argument!(
                "{} ciphertexts exceed the {} slots of {}",
                slots.len(),
                n,
                res
            ));
        }
        if let Some((&idx, _)) = slots.iter().find(|(&idx, _)| idx >= n) {
            return Err(invalid_argument!("slot index {} out of range for {}", idx, res));
        }
        if let Some(ct) = slots.values().find(|ct| ct.resolution() != res) {
            return Err(invalid_argument!(
                "cannot pack ciphertexts of {} and {} together",
                res,
                ct.resolution()
            ));
        }

        let keys = self.registry.pack_keys_at(res)?;

        let mut inputs: Vec<Option<E::Ciphertext>> = vec![None; n];
        for (&idx, ct) in slots {
            let scaled = self
                .engine
                .mul_inverse_int(ct, n as u64)
                .map_err(PdeError::engine(Stage::Pack))?;
            inputs[idx] = Some(scaled);
        }

        let mut packed = self
            .pack_inner(log_n, 0, &inputs, keys, log_n)?
            .ok_or_else(|| invalid_argument!("nothing to pack"))?;
        packed.set_log_slots(res.log_n() - 1);
        Ok(packed)
    }

    /// Recursive automorphism-based packing
    ///
    /// # Arguments
    /// * `ell` - Current level (log_n down to 0)
    /// * `start_idx` - First input index of this subtree
    /// * `cts` - Inputs, `None` for absent indices
    /// * `keys` - Galois keys for t = 2^ℓ + 1
    /// * `log_n` - log2 of the ring dimension
    fn pack_inner(
        &self,
        ell: usize,
        start_idx: usize,
        cts: &[Option<E::Ciphertext>],
        keys: &PackingKeys<E>,
        log_n: usize,
    ) -> Result<Option<E::Ciphertext>> {
        if ell == 0 {
            return Ok(cts[start_idx].clone());
        }

        let step = 1 << (log_n - ell);
        let (ct_even, ct_odd) = rayon::join(
            || self.pack_inner(ell - 1, start_idx, cts, keys, log_n),
            || self.pack_inner(ell - 1, start_idx + step, cts, keys, log_n),
        );
        let (ct_even, ct_odd) = (ct_even?, ct_odd?);

        let n = 1usize << log_n;
        let y_degree = n >> ell;
        let t = (1 << ell) + 1;

        let err = || PdeError::engine(Stage::Pack);
        let combined = match (ct_even, ct_odd) {
            (None, None) => None,
            (Some(even), None) => {
                let rotated = self.automorphism(&even, t, keys)?;
                Some(self.engine.add(&even, &rotated).map_err(err())?)
            }
            (None, Some(odd)) => {
                let y_odd = self.engine.mul_monomial(&odd, y_degree).map_err(err())?;
                let rotated = self.automorphism(&y_odd, t, keys)?;
                Some(self.engine.sub(&y_odd, &rotated).map_err(err())?)
            }
            (Some(even), Some(odd)) => {
                let y_odd = self.engine.mul_monomial(&odd, y_degree).map_err(err())?;
                let sum = self.engine.add(&even, &y_odd).map_err(err())?;
                let diff = self.engine.sub(&even, &y_odd).map_err(err())?;
                let rotated = self.automorphism(&diff, t, keys)?;
                Some(self.engine.add(&sum, &rotated).map_err(err())?)
            }
        };

        Ok(combined)
    }

    fn automorphism(
        &self,
        ct: &E::Ciphertext,
        t: usize,
        keys: &PackingKeys<E>,
    ) -> Result<E::Ciphertext> {
        let key = keys.get(t)?;
        self.engine
            .automorphism(ct, t, key)
            .map_err(PdeError::engine(Stage::Pack))
    }
}
