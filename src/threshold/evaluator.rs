//! Local and global threshold stages

use tracing::debug;

use super::{ComparisonEvaluator, CompositeSignPreset, GLOBAL_SIGN, LOCAL_SIGN};
use crate::engine::{CiphertextInfo, Engine};
use crate::error::{invalid_argument, PdeError, Result, Stage};
use crate::params::ResolutionParams;

/// Two-stage threshold and aggregate evaluator at the evaluation resolution
pub struct ThresholdEvaluator<'a, E: Engine> {
    engine: &'a E,
    params: &'a ResolutionParams,
    evk: &'a E::EvaluationKeys,
    local: ComparisonEvaluator<'a, E>,
    global: ComparisonEvaluator<'a, E>,
}

impl<'a, E: Engine> ThresholdEvaluator<'a, E> {
    /// Evaluator with the [`LOCAL_SIGN`] and [`GLOBAL_SIGN`] presets
    pub fn new(engine: &'a E, params: &'a ResolutionParams, evk: &'a E::EvaluationKeys) -> Self {
        Self::with_presets(engine, params, evk, LOCAL_SIGN, GLOBAL_SIGN)
    }

    pub fn with_presets(
        engine: &'a E,
        params: &'a ResolutionParams,
        evk: &'a E::EvaluationKeys,
        local: CompositeSignPreset,
        global: CompositeSignPreset,
    ) -> Self {
        Self {
            engine,
            params,
            evk,
            local: ComparisonEvaluator::new(engine, evk, local, Stage::LocalThreshold),
            global: ComparisonEvaluator::new(engine, evk, global, Stage::GlobalThreshold),
        }
    }

    /// Empty running score: slot-encoded zero at the top level
    pub fn new_score(&self) -> E::Ciphertext {
        self.engine.zero(self.params, self.params.max_level(), true)
    }

    /// Step((value - threshold + 0.5)·normalization), one value per slot
    ///
    /// The normalization maps the row sums into [-1, 1] before the sign
    /// approximation; the +0.5 makes integer sums equal to the threshold count.
    pub fn local_contribution(
        &self,
        value: &E::Ciphertext,
        threshold: &E::Ciphertext,
        normalization: &E::Ciphertext,
    ) -> Result<E::Ciphertext> {
        let err = || PdeError::engine(Stage::LocalThreshold);

        let diff = self.engine.sub(value, threshold).map_err(err())?;
        let shifted = self.engine.add_const(&diff, 0.5).map_err(err())?;
        let scaled = self
            .engine
            .mul_relin(&shifted, normalization, self.evk)
            .and_then(|ct| self.engine.rescale(&ct))
            .map_err(err())?;

        self.local.step(&scaled)
    }

    /// Add the local contribution of `value` into `score`
    pub fn local_threshold(
        &self,
        value: &E::Ciphertext,
        threshold: &E::Ciphertext,
        normalization: &E::Ciphertext,
        score: &mut E::Ciphertext,
    ) -> Result<()> {
        let contribution = self.local_contribution(value, threshold, normalization)?;
        self.engine
            .add_assign(score, &contribution)
            .map_err(PdeError::engine(Stage::LocalThreshold))
    }

    /// Remove from `count` what `empty` zero-valued padding slots added
    ///
    /// The threshold is private, so padding slots are compared like any other
    /// slot and pass whenever it is at most 0.5. The same comparison on a
    /// trivial zero, times `empty`, cancels them.
    pub fn discount_empty_slots(
        &self,
        count: &E::Ciphertext,
        threshold: &E::Ciphertext,
        normalization: &E::Ciphertext,
        empty: usize,
    ) -> Result<E::Ciphertext> {
        if empty == 0 {
            return Ok(count.clone());
        }
        let err = || PdeError::engine(Stage::InnerSum);

        let zero = self.engine.zero(self.params, self.params.max_level(), true);
        let padding = self.local_contribution(&zero, threshold, normalization)?;
        let padding = self.engine.mul_int(&padding, empty as i64).map_err(err())?;
        self.engine.sub(count, &padding).map_err(err())
    }

    /// Fold every slot of the score into every slot
    pub fn inner_sum(&self, score: &E::Ciphertext) -> Result<E::Ciphertext> {
        self.engine
            .inner_sum(score, 1, self.params.slots(), self.evk)
            .map_err(PdeError::engine(Stage::InnerSum))
    }

    /// Bootstrap `ct` if its level is exhausted
    ///
    /// # Returns
    /// The (possibly refreshed) ciphertext and whether a bootstrap ran.
    pub fn recover_if_exhausted(&self, ct: E::Ciphertext) -> Result<(E::Ciphertext, bool)> {
        if ct.level() > 0 {
            return Ok((ct, false));
        }
        debug!("level exhausted at {}, bootstrapping", ct.resolution());
        let refreshed = self
            .engine
            .bootstrap(&ct, self.evk)
            .map_err(PdeError::engine(Stage::Bootstrap))?;
        Ok((refreshed, true))
    }

    /// Step((aggregate - threshold + 0.5) / (rows + 1))
    ///
    /// With the threshold in [0, rows + 1] the sign input stays inside (-1, 1).
    pub fn global_threshold(
        &self,
        aggregate: &E::Ciphertext,
        threshold: &E::Ciphertext,
        rows: usize,
    ) -> Result<E::Ciphertext> {
        if rows == 0 {
            return Err(invalid_argument!("global threshold over an empty database"));
        }
        let err = || PdeError::engine(Stage::GlobalThreshold);

        let diff = self.engine.sub(aggregate, threshold).map_err(err())?;
        let (diff, _) = self.recover_if_exhausted(diff)?;

        let shifted = self.engine.add_const(&diff, 0.5).map_err(err())?;
        let scaled = self
            .engine
            .mul_const(&shifted, 1.0 / (rows as f64 + 1.0))
            .and_then(|ct| self.engine.rescale(&ct))
            .map_err(err())?;

        self.global.step(&scaled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ClearEngine;
    use crate::params::PdeParams;

    struct Fixture {
        engine: ClearEngine,
        top: ResolutionParams,
        sk: <ClearEngine as Engine>::SecretKey,
        evk: <ClearEngine as Engine>::EvaluationKeys,
    }

    fn fixture(seed: u64) -> Fixture {
        let params = PdeParams::test_small();
        let top = params.resolution_params(params.max_resolution()).unwrap();
        let engine = ClearEngine::with_seed(seed);
        let sk = engine.gen_secret_key(&top);
        let evk = engine.gen_evaluation_keys(&sk, &top, &params.bootstrap).unwrap();
        Fixture { engine, top, sk, evk }
    }

    impl Fixture {
        fn encrypt(&self, values: &[f64], log_scale: f64) -> <ClearEngine as Engine>::Ciphertext {
            let pt = self
                .engine
                .encode_slots(&self.top, values, self.top.max_level(), log_scale)
                .unwrap();
            self.engine.encrypt(&pt, &self.sk).unwrap()
        }

        fn broadcast(&self, value: f64, log_scale: f64) -> <ClearEngine as Engine>::Ciphertext {
            self.encrypt(&vec![value; self.top.slots()], log_scale)
        }
    }

    #[test]
    fn test_local_threshold_monotone() {
        let f = fixture(71);
        let eval = ThresholdEvaluator::new(&f.engine, &f.top, &f.evk);
        let scale = f.top.log_default_scale as f64;

        // Row sums around the threshold 12 with Σmax = 17
        let sums: Vec<f64> = (0..f.top.slots()).map(|i| (i % 18) as f64).collect();
        let value = f.encrypt(&sums, scale);
        let threshold = f.broadcast(12.0, scale);
        let normalization = f.broadcast(1.0 / 17.0, f.top.log_q_at(f.top.max_level()) as f64);

        let mut score = eval.new_score();
        eval.local_threshold(&value, &threshold, &normalization, &mut score)
            .unwrap();

        for (i, &s) in sums.iter().enumerate() {
            let want = if s >= 12.0 { 1.0 } else { 0.0 };
            let got = score.values()[i];
            assert!((got - want).abs() < 1e-3, "sum {} gave {}", s, got);
        }
    }

    #[test]
    fn test_inner_sum_counts() {
        let f = fixture(72);
        let eval = ThresholdEvaluator::new(&f.engine, &f.top, &f.evk);
        let scale = f.top.log_default_scale as f64;

        let flags: Vec<f64> = (0..f.top.slots())
            .map(|i| if i % 8 == 0 { 1.0 } else { 0.0 })
            .collect();
        let summed = eval.inner_sum(&f.encrypt(&flags, scale)).unwrap();
        assert!(summed.values().iter().all(|v| (v - 4.0).abs() < 1e-6));
    }

    #[test]
    fn test_discount_empty_slots() {
        let f = fixture(75);
        let eval = ThresholdEvaluator::new(&f.engine, &f.top, &f.evk);
        let scale = f.top.log_default_scale as f64;
        let log_rescale = f.top.log_q_at(f.top.max_level()) as f64;

        // Ten rows with sums 0..9, the other slots are zero padding
        let rows = 10;
        let empty = f.top.slots() - rows;
        let sums: Vec<f64> = (0..f.top.slots())
            .map(|i| if i < rows { i as f64 } else { 0.0 })
            .collect();
        let value = f.encrypt(&sums, scale);
        let normalization = f.broadcast(1.0 / 17.5, log_rescale);

        for (t, passing) in [(0.25, 10.0), (4.0, 6.0)] {
            let threshold = f.broadcast(t, scale);
            let mut score = eval.new_score();
            eval.local_threshold(&value, &threshold, &normalization, &mut score)
                .unwrap();
            let count = eval.inner_sum(&score).unwrap();
            let count = eval
                .discount_empty_slots(&count, &threshold, &normalization, empty)
                .unwrap();
            let got = count.values()[0];
            assert!((got - passing).abs() < 1e-2, "threshold {}: {}", t, got);
        }
    }

    #[test]
    fn test_recover_only_at_level_zero() {
        let f = fixture(73);
        let eval = ThresholdEvaluator::new(&f.engine, &f.top, &f.evk);
        let ct = f.broadcast(0.25, f.top.log_default_scale as f64);

        let one_left = f.engine.drop_level(&ct, ct.level() - 1).unwrap();
        let (same, refreshed) = eval.recover_if_exhausted(one_left).unwrap();
        assert!(!refreshed);
        assert_eq!(same.level(), 1);

        let exhausted = f.engine.drop_level(&same, 1).unwrap();
        let (recovered, refreshed) = eval.recover_if_exhausted(exhausted).unwrap();
        assert!(refreshed);
        assert_eq!(recovered.level(), f.top.max_level());
        assert_eq!(f.engine.bootstrap_count(), 1);
    }

    #[test]
    fn test_global_threshold_bootstraps_exhausted_input() {
        let f = fixture(74);
        let eval = ThresholdEvaluator::new(&f.engine, &f.top, &f.evk);
        let scale = f.top.log_default_scale as f64;

        let aggregate = f.broadcast(3.0, scale);
        let aggregate = f.engine.drop_level(&aggregate, aggregate.level()).unwrap();
        let threshold = f.broadcast(0.04, scale);

        let out = eval.global_threshold(&aggregate, &threshold, 4).unwrap();
        assert!((out.values()[0] - 1.0).abs() < 2e-3);
        assert!(f.engine.bootstrap_count() >= 1);

        let high = f.broadcast(5.0, scale);
        let out = eval.global_threshold(&aggregate, &high, 4).unwrap();
        assert!(out.values()[0].abs() < 2e-3);

        // Thresholds at both ends of [0, rows + 1] keep the sign input inside (-1, 1)
        let none = f.broadcast(0.0, scale);
        let all = f.broadcast(5.0, scale);
        let out = eval.global_threshold(&f.broadcast(0.0, scale), &none, 4).unwrap();
        assert!((out.values()[0] - 1.0).abs() < 2e-3);
        let out = eval.global_threshold(&f.broadcast(4.0, scale), &all, 4).unwrap();
        assert!(out.values()[0].abs() < 2e-3);

        assert!(matches!(
            eval.global_threshold(&aggregate, &threshold, 0),
            Err(PdeError::InvalidArgument(_))
        ));
    }
}
