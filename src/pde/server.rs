//! Server role: the exploration pipeline
//!
//! ```text
//! rows ──LUT──▶ per-row ct ──pack──▶ block ct (minRes)
//!      ──merge tree (2^(max-min) blocks)──▶ merged ct (maxRes)
//!      ──scheme switch──▶ real / imag ──local threshold──▶ score
//!      ──inner sum──▶ count ──padding discount──▶ count
//!      ──global threshold──▶ result
//! ```
//!
//! Blocks are packed and merged one chunk at a time, so at most one chunk of
//! packed blocks is alive at once.

use std::collections::BTreeMap;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info};

use super::{Database, DebugDecryptor, Request};
use crate::engine::{CiphertextInfo, Engine};
use crate::error::{invalid_argument, PdeError, Result, Stage};
use crate::lut::LookupTableEncoder;
use crate::registry::SecretKeyChain;
use crate::repack::{MergeEvaluator, PackEvaluator};
use crate::switch::SchemeSwitcher;
use crate::threshold::ThresholdEvaluator;

/// Evaluates requests against a plaintext database
pub struct Server<'a, E: Engine> {
    engine: &'a E,
    debug: Option<DebugDecryptor<E>>,
}

impl<'a, E: Engine> Server<'a, E> {
    pub fn new(engine: &'a E) -> Self {
        Self {
            engine,
            debug: None,
        }
    }

    /// Log decrypted intermediates at `debug` level; never changes results
    pub fn with_debug_keys(mut self, secrets: SecretKeyChain<E>) -> Self {
        self.debug = Some(DebugDecryptor::new(secrets));
        self
    }

    fn inspect(&self, label: &str, ct: &E::Ciphertext, scaling: f64) {
        if let Some(debug) = &self.debug {
            debug.log(self.engine, label, ct, scaling);
        }
    }

    /// Run the whole pipeline and return the encrypted score
    pub fn process_request(
        &self,
        request: &Request<E>,
        db: &impl Database,
    ) -> Result<E::Ciphertext> {
        let total = Instant::now();
        self.validate(request, db)?;

        let params = &request.params;
        let registry = &request.keys.registry;
        let evk = &request.keys.evaluation_keys;
        let pack_res = registry.min_resolution();
        let pack_params = registry.parameters_at(pack_res)?;
        let top_params = registry.parameters_at(registry.max_resolution())?;
        let (rows, cols) = db.dims();

        let normalization = request.local.normalization.as_ref().ok_or_else(|| {
            invalid_argument!("local threshold carries no normalization")
        })?;

        let encoder = LookupTableEncoder::new(self.engine, pack_params);
        let packer = PackEvaluator::new(self.engine, registry);
        let merger = MergeEvaluator::new(self.engine, registry)?;
        let switcher = SchemeSwitcher::new(self.engine, top_params, evk, params.log_score_scaling);
        let thresholds = ThresholdEvaluator::new(self.engine, top_params, evk);

        // Lookup tables, packing and merging, one chunk of blocks at a time
        let start = Instant::now();
        let n = pack_params.ring_dim();
        let blocks = (rows + n - 1) / n;
        let ratio = params.merge_ratio();
        let mut merged = Vec::with_capacity((blocks + ratio - 1) / ratio);
        for chunk_start in (0..blocks).step_by(ratio) {
            let chunk_end = (chunk_start + ratio).min(blocks);
            let packed = (chunk_start..chunk_end)
                .map(|block| self.pack_block(&encoder, &packer, request, db, block, n))
                .collect::<Result<Vec<_>>>()?;
            let ct = merger.merge_tree(packed)?;
            self.inspect("merged", &ct, 1.0 / params.score_scaling());
            merged.push(ct);
        }
        info!(
            "{} x {} rows in {} blocks merged into {} ciphertexts at {} in {:.2?}",
            rows,
            cols,
            blocks,
            merged.len(),
            top_params.resolution,
            start.elapsed()
        );

        // Scheme switch and local threshold
        let start = Instant::now();
        let mut score = thresholds.new_score();
        let mut slots_seen = 0;
        for (i, ct) in merged.into_iter().enumerate() {
            let (real, imag) = switcher.switch_domain(&ct)?;
            drop(ct);
            self.inspect("switched real", &real, 1.0);

            let halves: Vec<&E::Ciphertext> = std::iter::once(&real).chain(imag.as_ref()).collect();
            slots_seen += halves.len() * top_params.slots();
            let contributions = halves
                .par_iter()
                .map(|half| {
                    thresholds.local_contribution(half, &request.local.threshold, normalization)
                })
                .collect::<Result<Vec<_>>>()?;
            for contribution in &contributions {
                self.engine
                    .add_assign(&mut score, contribution)
                    .map_err(PdeError::engine(Stage::LocalThreshold))?;
            }
            debug!("local threshold on merged ciphertext {} ({} halves)", i, halves.len());
        }
        self.inspect("local score", &score, 1.0);
        info!("scheme switch and local threshold in {:.2?}", start.elapsed());

        let start = Instant::now();
        let count = thresholds.inner_sum(&score)?;
        let empty = slots_seen.saturating_sub(rows);
        let count = thresholds.discount_empty_slots(
            &count,
            &request.local.threshold,
            normalization,
            empty,
        )?;
        debug!("{} padding slots discounted", empty);
        self.inspect("row count", &count, 1.0);
        let result = thresholds.global_threshold(&count, &request.global.threshold, rows)?;
        self.inspect("global score", &result, 1.0);
        info!("inner sum and global threshold in {:.2?}", start.elapsed());

        info!("request processed in {:.2?}", total.elapsed());
        Ok(result)
    }

    /// Configuration checks run before any row is touched
    fn validate(&self, request: &Request<E>, db: &impl Database) -> Result<()> {
        request.params.validate()?;

        let registry = &request.keys.registry;
        if registry.resolutions() != request.params.resolutions() {
            return Err(PdeError::Configuration(format!(
                "key material covers {}..{} but parameters ask for {}..{}",
                registry.min_resolution(),
                registry.max_resolution(),
                request.params.min_resolution(),
                request.params.max_resolution()
            )));
        }
        let pack_res = registry.min_resolution();
        registry.validate(pack_res)?;

        let (rows, cols) = db.dims();
        if rows == 0 {
            return Err(invalid_argument!("empty database"));
        }
        if request.rows != rows {
            return Err(invalid_argument!(
                "request prepared for {} rows, database has {}",
                request.rows,
                rows
            ));
        }
        if request.tables.len() != cols {
            return Err(invalid_argument!(
                "{} lookup tables for {} columns",
                request.tables.len(),
                cols
            ));
        }
        if let Some(table) = request.tables.iter().find(|t| t.resolution() != pack_res) {
            return Err(PdeError::ResolutionMismatch {
                expected: pack_res,
                found: table.resolution(),
            });
        }
        Ok(())
    }

    /// Evaluate every row of `block` and pack the row sums into one ciphertext
    fn pack_block(
        &self,
        encoder: &LookupTableEncoder<'_, E>,
        packer: &PackEvaluator<'_, E>,
        request: &Request<E>,
        db: &impl Database,
        block: usize,
        n: usize,
    ) -> Result<E::Ciphertext> {
        let (rows, _) = db.dims();
        let first = block * n;
        let last = (first + n).min(rows);

        let per_row = (first..last)
            .into_par_iter()
            .map(|i| {
                let row = db.row(i).ok_or_else(|| invalid_argument!("row {} missing", i))?;
                let ct = encoder.evaluate(&request.tables, row)?;
                Ok((i - first, ct))
            })
            .collect::<Result<BTreeMap<usize, E::Ciphertext>>>()?;

        let packed = packer.pack(&per_row)?;
        debug!(
            "block {}: {} rows packed at {} (level {})",
            block,
            per_row.len(),
            packed.resolution(),
            packed.level()
        );
        Ok(packed)
    }
}
