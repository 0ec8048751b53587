//! Client → server messages

use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::error::Result;
use crate::lut::LookupTable;
use crate::params::PdeParams;
use crate::registry::KeyMaterial;

/// Encrypted threshold and, for the local stage, its normalization
#[derive(Debug, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct PrivateThreshold<E: Engine> {
    /// Threshold broadcast to every slot
    pub threshold: E::Ciphertext,
    /// Reciprocal of the widest |sum - threshold + 0.5| over the reachable
    /// row sums; `None` for the global stage
    pub normalization: Option<E::Ciphertext>,
}

/// One exploration query
#[derive(Debug, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Request<E: Engine> {
    /// Public parameters the keys were generated for
    pub params: PdeParams,
    pub keys: KeyMaterial<E>,
    /// One table per database column
    pub tables: Vec<LookupTable<E>>,
    /// Per-row threshold
    pub local: PrivateThreshold<E>,
    /// Threshold on the row count
    pub global: PrivateThreshold<E>,
    /// Number of database rows the global threshold was prepared for
    pub rows: usize,
}

/// Serialized sizes of a request's parts, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestSizes {
    pub keys: u64,
    pub tables: u64,
    pub thresholds: u64,
}

impl RequestSizes {
    pub fn total(&self) -> u64 {
        self.keys + self.tables + self.thresholds
    }
}

impl<E: Engine> Request<E> {
    /// Size of the whole request under bincode
    pub fn serialized_size(&self) -> Result<u64> {
        Ok(bincode::serialized_size(self)?)
    }

    pub fn sizes(&self) -> Result<RequestSizes> {
        Ok(RequestSizes {
            keys: bincode::serialized_size(&self.keys)?,
            tables: bincode::serialized_size(&self.tables)?,
            thresholds: bincode::serialized_size(&self.local)?
                + bincode::serialized_size(&self.global)?,
        })
    }
}
