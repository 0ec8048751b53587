//! Precomputed X^(2^i) monomials in Montgomery form

use std::collections::BTreeMap;

use crate::engine::Engine;
use crate::error::{PdeError, Result};
use crate::params::Resolution;
use crate::registry::ResolutionRegistry;

/// X^(2^i) for 0 <= i < log N at every resolution above the minimum
pub struct XPow2Table<E: Engine> {
    powers: BTreeMap<Resolution, Vec<E::Plaintext>>,
}

impl<E: Engine> XPow2Table<E> {
    pub fn new(engine: &E, registry: &ResolutionRegistry<E>) -> Result<Self> {
        let min = registry.min_resolution();
        let mut powers = BTreeMap::new();

        for res in registry.resolutions().into_iter().filter(|&r| r > min) {
            let params = registry.parameters_at(res)?;
            let table = (0..res.log_n())
                .map(|i| engine.encode_monomial(params, 1 << i, true))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(PdeError::Encoding)?;
            powers.insert(res, table);
        }

        Ok(Self { powers })
    }

    /// X^(2^i) at `res`
    pub fn get(&self, res: Resolution, i: usize) -> Result<&E::Plaintext> {
        self.powers
            .get(&res)
            .and_then(|table| table.get(i))
            .ok_or_else(|| {
                PdeError::Configuration(format!("no X^(2^{}) precomputed at {}", i, res))
            })
    }
}
