//! Client role: key generation, request construction, decryption

use std::time::Instant;

use tracing::{debug, info};

use super::{Database, PrivateThreshold, Request};
use crate::engine::{CiphertextInfo, Engine};
use crate::error::{invalid_argument, PdeError, Result, Stage};
use crate::lut::{LookupTable, LookupTableEncoder, ScoringFunction};
use crate::params::PdeParams;
use crate::registry::{generate_key_material, KeyMaterial, SecretKeyChain};
use crate::threshold::{GLOBAL_SIGN, LOCAL_SIGN};

/// Owner of the secret key chain
pub struct Client<'a, E: Engine> {
    engine: &'a E,
    params: PdeParams,
    secrets: SecretKeyChain<E>,
}

impl<'a, E: Engine> Client<'a, E> {
    /// Generate every secret and the public key material of a query
    pub fn init(engine: &'a E, params: PdeParams) -> Result<(Self, KeyMaterial<E>)> {
        params.validate()?;
        let (secrets, keys) = generate_key_material(engine, &params)?;
        Ok((
            Self {
                engine,
                params,
                secrets,
            },
            keys,
        ))
    }

    pub fn params(&self) -> &PdeParams {
        &self.params
    }

    /// Secret keys, for attaching a debug decryptor to a local server
    pub fn secrets(&self) -> &SecretKeyChain<E> {
        &self.secrets
    }

    /// Encrypt one lookup table per scoring function at the packing resolution
    ///
    /// Stored values are pre-scaled by 2^-log_score_scaling so that a row sum
    /// survives the modular reduction of the scheme switch.
    pub fn gen_encrypted_functions(
        &self,
        functions: &[ScoringFunction],
    ) -> Result<Vec<LookupTable<E>>> {
        let start = Instant::now();
        let scaling = self.params.score_scaling();

        // EvalMod reduces modulo the message ratio: |Σf·2^-s| must stay below half of it
        let bound = sum_of_maxima(functions) * scaling;
        let ratio = self.params.bootstrap.message_ratio();
        if bound >= 0.5 * ratio {
            return Err(PdeError::Configuration(format!(
                "scaled row sums reach {:.4}, above the EvalMod range {:.4}; \
                 raise log_score_scaling",
                bound,
                0.5 * ratio
            )));
        }

        let pack_res = self.params.min_resolution();
        let pack_params = self.params.resolution_params(pack_res)?;
        let sk = self.secrets.get(pack_res)?;
        let encoder = LookupTableEncoder::new(self.engine, &pack_params).with_output_scale(scaling);

        let tables = functions
            .iter()
            .map(|f| encoder.encode(f, sk))
            .collect::<Result<Vec<_>>>()?;

        info!(
            "encrypted {} lookup tables ({} blocks) at {} in {:.2?}",
            tables.len(),
            tables.iter().map(LookupTable::len).sum::<usize>(),
            pack_res,
            start.elapsed()
        );
        Ok(tables)
    }

    /// Encrypt the per-row threshold and its normalization
    ///
    /// Row sums lie in [lo, hi], the sums of the table minima and maxima
    /// (padding slots add 0). A threshold outside [lo, hi + 1] is clamped to
    /// it, which keeps every comparison outcome, and the normalization is the
    /// reciprocal of the widest |sum - threshold + 0.5| so the sign input stays
    /// in [-1, 1].
    pub fn gen_private_threshold(
        &self,
        threshold: f64,
        functions: &[ScoringFunction],
    ) -> Result<PrivateThreshold<E>> {
        if !threshold.is_finite() {
            return Err(invalid_argument!("local threshold {} is not finite", threshold));
        }
        let (lo, hi) = functions
            .iter()
            .map(ScoringFunction::range)
            .fold((0.0_f64, 0.0_f64), |(lo, hi), (min, max)| (lo + min, hi + max));
        let (lo, hi) = (lo.min(0.0), hi.max(0.0));

        let clamped = threshold.clamp(lo, hi + 1.0);
        let width = (clamped - 0.5 - lo).max(hi - clamped + 0.5).max(0.5);
        if 0.5 / width < (-(LOCAL_SIGN.log_alpha as f64)).exp2() {
            return Err(PdeError::Configuration(format!(
                "row sums span [{}, {}], too wide for the local comparison",
                lo, hi
            )));
        }
        if clamped != threshold {
            debug!("local threshold {} clamped to {}", threshold, clamped);
        }

        let top = self.params.resolution_params(self.params.max_resolution())?;
        // Encoded at the scale of the prime the following rescale drops
        let log_rescale = top.log_q_at(top.max_level()) as f64;
        Ok(PrivateThreshold {
            threshold: self.encrypt_broadcast(clamped, top.log_default_scale as f64)?,
            normalization: Some(self.encrypt_broadcast(1.0 / width, log_rescale)?),
        })
    }

    /// Encrypt the threshold on the number of passing rows out of `rows`
    ///
    /// Clamped to [0, rows + 1]; the server divides by rows + 1, so the count
    /// comparison must still be resolvable at the global sign precision.
    pub fn gen_count_threshold(&self, threshold: f64, rows: usize) -> Result<PrivateThreshold<E>> {
        if !threshold.is_finite() {
            return Err(invalid_argument!("global threshold {} is not finite", threshold));
        }
        if rows == 0 {
            return Err(invalid_argument!("global threshold over an empty database"));
        }
        let span = rows as f64 + 1.0;
        if 0.5 / span < (-(GLOBAL_SIGN.log_alpha as f64)).exp2() {
            return Err(PdeError::Configuration(format!(
                "{} rows exceed the resolution of the global comparison",
                rows
            )));
        }

        let clamped = threshold.clamp(0.0, span);
        if clamped != threshold {
            debug!("global threshold {} clamped to {}", threshold, clamped);
        }
        let top = self.params.resolution_params(self.params.max_resolution())?;
        Ok(PrivateThreshold {
            threshold: self.encrypt_broadcast(clamped, top.log_default_scale as f64)?,
            normalization: None,
        })
    }

    fn encrypt_broadcast(&self, value: f64, log_scale: f64) -> Result<E::Ciphertext> {
        let top = self.params.resolution_params(self.params.max_resolution())?;
        let sk = self.secrets.get(top.resolution)?;
        let pt = self
            .engine
            .encode_slots(&top, &vec![value; top.slots()], top.max_level(), log_scale)
            .map_err(PdeError::Encoding)?;
        self.engine
            .encrypt(&pt, sk)
            .map_err(PdeError::engine(Stage::Encryption))
    }

    /// Bundle keys, tables and both thresholds into a request over `rows` rows
    pub fn gen_request(
        &self,
        keys: KeyMaterial<E>,
        functions: &[ScoringFunction],
        local_threshold: f64,
        global_threshold: f64,
        rows: usize,
    ) -> Result<Request<E>> {
        if functions.is_empty() {
            return Err(invalid_argument!("a request needs at least one scoring function"));
        }
        let request = Request {
            params: self.params.clone(),
            keys,
            tables: self.gen_encrypted_functions(functions)?,
            local: self.gen_private_threshold(local_threshold, functions)?,
            global: self.gen_count_threshold(global_threshold, rows)?,
            rows,
        };

        let sizes = request.sizes()?;
        info!(
            "request: keys {:.2} MB, tables {:.2} MB, thresholds {:.2} MB",
            megabytes(sizes.keys),
            megabytes(sizes.tables),
            megabytes(sizes.thresholds)
        );
        Ok(request)
    }

    /// Decrypt and decode a ciphertext of any resolution
    pub fn decrypt(&self, ct: &E::Ciphertext) -> Result<Vec<f64>> {
        let sk = self.secrets.get(ct.resolution())?;
        let pt = self
            .engine
            .decrypt(ct, sk)
            .map_err(PdeError::engine(Stage::Decryption))?;
        Ok(self.engine.decode(&pt))
    }
}

/// Expected score computed in the clear
///
/// Mirrors the encrypted pipeline: each row's value is the sum of its
/// discretized scores, rows with `sum - t_local + 0.5 > 0` are counted, and
/// the result is the step of `count - t_global + 0.5`.
pub fn plaintext_score(
    db: &impl Database,
    functions: &[ScoringFunction],
    local_threshold: f64,
    global_threshold: f64,
) -> Result<f64> {
    let (rows, cols) = db.dims();
    if functions.len() != cols {
        return Err(invalid_argument!(
            "{} scoring functions for {} columns",
            functions.len(),
            cols
        ));
    }
    if rows == 0 {
        return Err(invalid_argument!("empty database"));
    }

    let mut count = 0usize;
    for i in 0..rows {
        let row = db.row(i).ok_or_else(|| invalid_argument!("row {} missing", i))?;
        let mut sum = 0.0;
        for (f, &x) in functions.iter().zip(row) {
            sum += f.discretize(x)?;
        }
        if sum - local_threshold + 0.5 > 0.0 {
            count += 1;
        }
    }

    let x = count as f64 - global_threshold + 0.5;
    Ok(if x > 0.0 {
        1.0
    } else if x < 0.0 {
        0.0
    } else {
        0.5
    })
}

fn sum_of_maxima(functions: &[ScoringFunction]) -> f64 {
    functions.iter().map(ScoringFunction::max).sum()
}

fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ClearEngine;
    use crate::pde::DenseDatabase;

    fn test_params() -> PdeParams {
        PdeParams::test_small()
    }

    fn step_functions() -> Vec<ScoringFunction> {
        vec![
            ScoringFunction::step((0.0, 64.0), 64, 8.0, 2.0).unwrap(),
            ScoringFunction::step((0.0, 64.0), 64, 16.0, 1.0).unwrap(),
        ]
    }

    fn broadcast_value(
        client: &Client<'_, ClearEngine>,
        ct: &<ClearEngine as Engine>::Ciphertext,
    ) -> f64 {
        let values = client.decrypt(ct).unwrap();
        assert!(values.iter().all(|v| (v - values[0]).abs() < 1e-9));
        values[0]
    }

    #[test]
    fn test_private_threshold() {
        let engine = ClearEngine::with_seed(81);
        let (client, _) = Client::init(&engine, test_params()).unwrap();

        // Row sums span [0, 17]; the widest gap from 12 - 0.5 is 11.5
        let local = client.gen_private_threshold(12.0, &step_functions()).unwrap();
        assert!((broadcast_value(&client, &local.threshold) - 12.0).abs() < 1e-6);
        let normalization = broadcast_value(&client, local.normalization.as_ref().unwrap());
        assert!((normalization - 1.0 / 11.5).abs() < 1e-9);

        let global = client.gen_count_threshold(0.04, 4).unwrap();
        assert!(global.normalization.is_none());
        assert!((broadcast_value(&client, &global.threshold) - 0.04).abs() < 1e-6);
    }

    #[test]
    fn test_local_threshold_clamped_to_reachable_sums() {
        let engine = ClearEngine::with_seed(84);
        let (client, _) = Client::init(&engine, test_params()).unwrap();
        let functions = step_functions();

        let cases = [(40.0, 18.0, 17.5), (-3.0, 0.0, 17.5), (0.25, 0.25, 17.25)];
        for (threshold, clamped, width) in cases {
            let local = client.gen_private_threshold(threshold, &functions).unwrap();
            assert!((broadcast_value(&client, &local.threshold) - clamped).abs() < 1e-6);
            let normalization = broadcast_value(&client, local.normalization.as_ref().unwrap());
            assert!((normalization - 1.0 / width).abs() < 1e-9, "threshold {}", threshold);
        }

        // Negative scores widen the range below zero
        let signed = ScoringFunction::new(|x| x - 2.0, (0.0, 4.0), 32, 2.0).unwrap();
        let local = client.gen_private_threshold(-10.0, &[signed]).unwrap();
        assert!((broadcast_value(&client, &local.threshold) + 2.0).abs() < 1e-6);

        assert!(client.gen_private_threshold(f64::NAN, &functions).is_err());
    }

    #[test]
    fn test_count_threshold_clamped_to_row_count() {
        let engine = ClearEngine::with_seed(85);
        let (client, _) = Client::init(&engine, test_params()).unwrap();

        let high = client.gen_count_threshold(63.0, 4).unwrap();
        assert!((broadcast_value(&client, &high.threshold) - 5.0).abs() < 1e-6);
        let negative = client.gen_count_threshold(-2.0, 4).unwrap();
        assert!(broadcast_value(&client, &negative.threshold).abs() < 1e-6);

        assert!(matches!(
            client.gen_count_threshold(1.0, 0),
            Err(PdeError::InvalidArgument(_))
        ));
        assert!(client.gen_count_threshold(1.0, 32767).is_ok());
        assert!(matches!(
            client.gen_count_threshold(1.0, 32768),
            Err(PdeError::Configuration(_))
        ));
    }

    #[test]
    fn test_tables_are_prescaled() {
        let engine = ClearEngine::with_seed(82);
        let params = test_params();
        let (client, _) = Client::init(&engine, params.clone()).unwrap();
        let functions = step_functions();
        let tables = client.gen_encrypted_functions(&functions).unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].len(), 4);

        let pack_params = params.resolution_params(params.min_resolution()).unwrap();
        let encoder = LookupTableEncoder::new(&engine, &pack_params);
        let ct = encoder.evaluate(&tables, &[56.0, 48.0]).unwrap();
        let value = client.decrypt(&ct).unwrap()[0];
        assert!((value / params.score_scaling() - 17.0).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_overflowing_scores() {
        let engine = ClearEngine::with_seed(83);
        let (client, _) = Client::init(&engine, test_params()).unwrap();
        let big = ScoringFunction::new(|x| x, (0.0, 256.0), 256, 255.0).unwrap();
        assert!(matches!(
            client.gen_encrypted_functions(&[big]),
            Err(PdeError::Configuration(_))
        ));
    }

    #[test]
    fn test_plaintext_score() {
        let db = DenseDatabase::from_rows(&[
            vec![56.0, 48.0],
            vec![8.0, 16.0],
            vec![52.0, 20.0],
            vec![24.0, 40.0],
        ])
        .unwrap();
        let functions = step_functions();

        assert_eq!(plaintext_score(&db, &functions, 12.0, 0.04).unwrap(), 1.0);
        assert_eq!(plaintext_score(&db, &functions, 12.0, 3.0).unwrap(), 0.0);
        assert_eq!(plaintext_score(&db, &functions, 18.0, 1.0).unwrap(), 0.0);
        assert_eq!(plaintext_score(&db, &functions, 40.0, 0.04).unwrap(), 1.0);
        assert_eq!(plaintext_score(&db, &functions, 0.0, 5.0).unwrap(), 0.0);
        assert_eq!(plaintext_score(&db, &functions, 12.0, 2.5).unwrap(), 0.5);
        assert!(plaintext_score(&db, &functions[..1], 12.0, 0.04).is_err());
    }
}
