//! Client-side key generation
//!
//! The root secret lives at the evaluation resolution; every lower resolution
//! gets an independent fresh secret, so compromising one resolution's secret
//! reveals nothing about another. Adjacent secrets are linked only through
//! public conversion keys.

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::{debug, info};

use super::{KeyMaterial, PackingKeys, ResolutionRegistry};
use crate::engine::Engine;
use crate::error::{PdeError, Result, Stage};
use crate::math::galois::pack_galois_elements;
use crate::params::{PdeParams, Resolution};

/// Secret keys of every resolution; never leaves the client
pub struct SecretKeyChain<E: Engine> {
    secrets: BTreeMap<Resolution, E::SecretKey>,
}

impl<E: Engine> SecretKeyChain<E> {
    pub fn get(&self, res: Resolution) -> Result<&E::SecretKey> {
        self.secrets.get(&res).ok_or(PdeError::MissingKeyMaterial {
            what: "secret key",
            resolution: res,
        })
    }

    pub fn resolutions(&self) -> impl Iterator<Item = Resolution> + '_ {
        self.secrets.keys().copied()
    }
}

impl<E: Engine> Clone for SecretKeyChain<E> {
    fn clone(&self) -> Self {
        Self {
            secrets: self.secrets.clone(),
        }
    }
}

/// Generate the secret chain and the public key material of a query
///
/// # Returns
/// The secrets (kept by the client) and the registry plus evaluation keys
/// (sent to the server).
pub fn generate_key_material<E: Engine>(
    engine: &E,
    params: &PdeParams,
) -> Result<(SecretKeyChain<E>, KeyMaterial<E>)> {
    let start = Instant::now();
    let mut registry = ResolutionRegistry::<E>::new(params)?;

    let max = params.max_resolution();
    let min = params.min_resolution();

    let mut secrets = BTreeMap::new();
    for res in params.resolutions().into_iter().rev() {
        let res_params = registry.parameters_at(res)?;
        secrets.insert(res, engine.gen_secret_key(res_params));
    }

    for res in params.resolutions() {
        if res == max {
            break;
        }
        let key = engine
            .gen_conversion_key(&secrets[&res], &secrets[&res.next()])
            .map_err(PdeError::engine(Stage::KeyGeneration))?;
        registry.insert_conversion_key(res, key);
        debug!("conversion key {} -> {}", res, res.next());
    }

    let mut pack_keys = PackingKeys::new(min);
    for g in pack_galois_elements(min.log_n()) {
        let key = engine
            .gen_galois_key(&secrets[&min], g)
            .map_err(PdeError::engine(Stage::KeyGeneration))?;
        pack_keys.insert(g, key);
    }
    registry.insert_pack_keys(pack_keys);

    let evaluation_keys = engine
        .gen_evaluation_keys(&secrets[&max], registry.parameters_at(max)?, &params.bootstrap)
        .map_err(PdeError::engine(Stage::KeyGeneration))?;

    info!(
        "key material for {}..{} generated in {:.2?}",
        min,
        max,
        start.elapsed()
    );

    Ok((
        SecretKeyChain { secrets },
        KeyMaterial {
            registry,
            evaluation_keys,
        },
    ))
}
