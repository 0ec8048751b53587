//! Resolution registry
//!
//! Holds, for every resolution of the chain, its parameter set and the public
//! key material needed to work there: the conversion key to the next
//! resolution and, at the packing resolution, the automorphism keys of the
//! packing tree. The registry is built once per query by the client and is
//! read-only on the server.

mod keygen;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::error::{PdeError, Result};
use crate::math::galois::pack_galois_elements;
use crate::params::{PdeParams, Resolution, ResolutionParams};

pub use keygen::{generate_key_material, SecretKeyChain};

/// Automorphism keys τ_t(s) → s for every t = 2^ℓ + 1 at one resolution
#[derive(Debug, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct PackingKeys<E: Engine> {
    resolution: Resolution,
    keys: BTreeMap<usize, E::SwitchingKey>,
}

impl<E: Engine> PackingKeys<E> {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            keys: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, galois_element: usize, key: E::SwitchingKey) {
        self.keys.insert(galois_element, key);
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Key for τ_g, or `PackingKeyMissing`
    pub fn get(&self, galois_element: usize) -> Result<&E::SwitchingKey> {
        self.keys
            .get(&galois_element)
            .ok_or(PdeError::PackingKeyMissing {
                resolution: self.resolution,
                galois_element: Some(galois_element),
            })
    }

    /// Whether every element of the packing tree has a key
    pub fn is_complete(&self) -> bool {
        pack_galois_elements(self.resolution.log_n())
            .iter()
            .all(|g| self.keys.contains_key(g))
    }

    pub fn galois_elements(&self) -> impl Iterator<Item = usize> + '_ {
        self.keys.keys().copied()
    }
}

/// Per-resolution parameters and public keys
#[derive(Debug, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct ResolutionRegistry<E: Engine> {
    params: BTreeMap<Resolution, ResolutionParams>,
    /// Keyed by the source resolution r of the r → r+1 conversion
    conversion_keys: BTreeMap<Resolution, E::SwitchingKey>,
    pack_keys: BTreeMap<Resolution, PackingKeys<E>>,
}

impl<E: Engine> ResolutionRegistry<E> {
    /// Registry holding the parameter sets of `params`, without keys
    pub fn new(params: &PdeParams) -> Result<Self> {
        params.validate()?;
        let params = params
            .resolutions()
            .into_iter()
            .map(|res| Ok((res, params.resolution_params(res)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok(Self {
            params,
            conversion_keys: BTreeMap::new(),
            pack_keys: BTreeMap::new(),
        })
    }

    /// Ordered chain [minRes..=maxRes]
    pub fn resolutions(&self) -> Vec<Resolution> {
        self.params.keys().copied().collect()
    }

    pub fn min_resolution(&self) -> Resolution {
        self.params.keys().next().copied().unwrap_or(Resolution(0))
    }

    pub fn max_resolution(&self) -> Resolution {
        self.params.keys().next_back().copied().unwrap_or(Resolution(0))
    }

    pub fn parameters_at(&self, res: Resolution) -> Result<&ResolutionParams> {
        self.params.get(&res).ok_or_else(|| {
            PdeError::Configuration(format!("no parameter set registered at {}", res))
        })
    }

    pub fn insert_conversion_key(&mut self, from: Resolution, key: E::SwitchingKey) {
        self.conversion_keys.insert(from, key);
    }

    pub fn insert_pack_keys(&mut self, keys: PackingKeys<E>) {
        self.pack_keys.insert(keys.resolution(), keys);
    }

    /// Conversion key `from → to`; only adjacent resolutions have one
    pub fn conversion_key(&self, from: Resolution, to: Resolution) -> Result<&E::SwitchingKey> {
        if to != from.next() {
            return Err(PdeError::ResolutionMismatch {
                expected: from.next(),
                found: to,
            });
        }
        self.conversion_keys
            .get(&from)
            .ok_or(PdeError::MissingKeyMaterial {
                what: "conversion key",
                resolution: from,
            })
    }

    pub fn pack_keys_at(&self, res: Resolution) -> Result<&PackingKeys<E>> {
        self.pack_keys.get(&res).ok_or(PdeError::PackingKeyMissing {
            resolution: res,
            galois_element: None,
        })
    }

    /// Check that the chain from `pack_res` to the top is fully keyed
    ///
    /// Raised as `Configuration` so a query fails before any row is touched.
    pub fn validate(&self, pack_res: Resolution) -> Result<()> {
        let max = self.max_resolution();
        if pack_res < self.min_resolution() || pack_res > max {
            return Err(PdeError::Configuration(format!(
                "packing resolution {} outside the registered chain",
                pack_res
            )));
        }

        let mut res = pack_res;
        while res < max {
            if !self.conversion_keys.contains_key(&res) {
                return Err(PdeError::Configuration(format!(
                    "missing conversion key {} -> {}",
                    res,
                    res.next()
                )));
            }
            res = res.next();
        }

        match self.pack_keys.get(&pack_res) {
            Some(keys) if keys.is_complete() => Ok(()),
            Some(_) => Err(PdeError::Configuration(format!(
                "incomplete packing keys at {}",
                pack_res
            ))),
            None => Err(PdeError::Configuration(format!(
                "missing packing keys at {}",
                pack_res
            ))),
        }
    }
}

/// Public key material shared with the server
#[derive(Debug, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct KeyMaterial<E: Engine> {
    pub registry: ResolutionRegistry<E>,
    /// Relinearization, inner-sum and bootstrapping keys at the top resolution
    pub evaluation_keys: E::EvaluationKeys,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ClearEngine;

    fn test_params() -> PdeParams {
        PdeParams::test_small()
    }

    #[test]
    fn test_registry_chain() {
        let registry = ResolutionRegistry::<ClearEngine>::new(&test_params()).unwrap();
        assert_eq!(
            registry.resolutions(),
            vec![Resolution(4), Resolution(5), Resolution(6)]
        );
        assert_eq!(registry.parameters_at(Resolution(5)).unwrap().ring_dim(), 32);
        assert!(registry.parameters_at(Resolution(7)).is_err());
    }

    #[test]
    fn test_missing_keys() {
        let registry = ResolutionRegistry::<ClearEngine>::new(&test_params()).unwrap();

        assert!(matches!(
            registry.conversion_key(Resolution(4), Resolution(5)),
            Err(PdeError::MissingKeyMaterial { .. })
        ));
        assert!(matches!(
            registry.conversion_key(Resolution(4), Resolution(6)),
            Err(PdeError::ResolutionMismatch { .. })
        ));
        assert!(matches!(
            registry.pack_keys_at(Resolution(4)),
            Err(PdeError::PackingKeyMissing { .. })
        ));
        assert!(matches!(
            registry.validate(Resolution(4)),
            Err(PdeError::Configuration(_))
        ));
    }

    #[test]
    fn test_generated_registry_validates() {
        let engine = ClearEngine::with_seed(11);
        let (_, keys) = generate_key_material(&engine, &test_params()).unwrap();
        keys.registry.validate(Resolution(4)).unwrap();

        let pack = keys.registry.pack_keys_at(Resolution(4)).unwrap();
        assert_eq!(pack.galois_elements().collect::<Vec<_>>(), vec![3, 5, 9, 17]);
        assert!(keys.registry.conversion_key(Resolution(5), Resolution(6)).is_ok());
    }
}
