//! Intermediate-value inspection for development runs
//!
//! Holds the client's secrets, so it only ever belongs in a test or demo
//! process playing both roles.

use tracing::{debug, enabled, Level};

use crate::engine::{CiphertextInfo, Engine};
use crate::registry::SecretKeyChain;

/// Decrypts pipeline intermediates and logs their first values at `debug`
pub struct DebugDecryptor<E: Engine> {
    secrets: SecretKeyChain<E>,
}

const PREVIEW: usize = 4;

impl<E: Engine> DebugDecryptor<E> {
    pub fn new(secrets: SecretKeyChain<E>) -> Self {
        Self { secrets }
    }

    /// Decrypted values of `ct`, multiplied by `scaling`
    pub fn peek(&self, engine: &E, ct: &E::Ciphertext, scaling: f64) -> Option<Vec<f64>> {
        let sk = self.secrets.get(ct.resolution()).ok()?;
        let pt = engine.decrypt(ct, sk).ok()?;
        Some(
            engine
                .decode(&pt)
                .into_iter()
                .take(PREVIEW)
                .map(|v| v * scaling)
                .collect(),
        )
    }

    pub fn log(&self, engine: &E, label: &str, ct: &E::Ciphertext, scaling: f64) {
        if !enabled!(Level::DEBUG) {
            return;
        }
        match self.peek(engine, ct, scaling) {
            Some(values) => debug!(
                "{} [{} level {}]: {:?}",
                label,
                ct.resolution(),
                ct.level(),
                values
            ),
            None => debug!("{}: not decryptable with the debug keys", label),
        }
    }
}
