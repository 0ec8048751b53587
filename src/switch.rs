//! Scheme switching
//!
//! Moves a maximum-resolution coefficient-encoded ciphertext into the slot
//! domain, where the comparison polynomials run. The coefficient vector is
//! split into a real half (coefficients 0..N/2) and, for fully packed inputs,
//! an imaginary half (coefficients N/2..N).
//!
//! Steps, each delegated to the engine:
//!
//! 1. ScaleDown: bring the message to level 0 at the default scale
//! 2. ModUp: lift to the bootstrapping modulus (adds a q0-multiple overflow)
//! 3. CoeffsToSlots
//! 4. EvalMod on each half (removes the overflow)
//! 5. drop to the evaluation chain's top level and multiply by 2^s, undoing
//!    the client's 2^-s pre-scaling of the lookup tables

use std::time::Instant;

use tracing::debug;

use crate::engine::{CiphertextInfo, Engine};
use crate::error::{PdeError, Result, SwitchStep};
use crate::params::ResolutionParams;

/// Scheme switcher bound to the evaluation resolution's keys
pub struct SchemeSwitcher<'a, E: Engine> {
    engine: &'a E,
    params: &'a ResolutionParams,
    evk: &'a E::EvaluationKeys,
    /// 2^log_score_scaling
    score_scaling: i64,
}

impl<'a, E: Engine> SchemeSwitcher<'a, E> {
    pub fn new(
        engine: &'a E,
        params: &'a ResolutionParams,
        evk: &'a E::EvaluationKeys,
        log_score_scaling: u32,
    ) -> Self {
        Self {
            engine,
            params,
            evk,
            score_scaling: 1i64 << log_score_scaling,
        }
    }

    /// Switch `ct` into the slot domain
    ///
    /// # Returns
    /// `(real, imag)`; `imag` is `None` when `ct` does not fill the whole ring.
    pub fn switch_domain(
        &self,
        ct: &E::Ciphertext,
    ) -> Result<(E::Ciphertext, Option<E::Ciphertext>)> {
        if ct.resolution() != self.params.resolution {
            return Err(PdeError::ResolutionMismatch {
                expected: self.params.resolution,
                found: ct.resolution(),
            });
        }
        let start = Instant::now();

        let scaled = self
            .engine
            .scale_down(ct, self.evk)
            .map_err(PdeError::switch(SwitchStep::ScaleDown))?;
        let lifted = self
            .engine
            .mod_up(&scaled, self.evk)
            .map_err(PdeError::switch(SwitchStep::ModUp))?;
        let (real, imag) = self
            .engine
            .coeffs_to_slots(&lifted, self.evk)
            .map_err(PdeError::switch(SwitchStep::CoeffsToSlots))?;

        let real = self.finish_half(&real)?;
        let imag = imag.map(|imag| self.finish_half(&imag)).transpose()?;

        debug!(
            "scheme switch at {}: level {}, imag half {}, {:.2?}",
            ct.resolution(),
            real.level(),
            if imag.is_some() { "present" } else { "absent" },
            start.elapsed()
        );
        Ok((real, imag))
    }

    /// EvalMod, drop to the top evaluation level, then undo the pre-scaling
    fn finish_half(&self, half: &E::Ciphertext) -> Result<E::Ciphertext> {
        let reduced = self
            .engine
            .eval_mod(half, self.evk)
            .map_err(PdeError::switch(SwitchStep::EvalMod))?;

        let max_level = self.params.max_level();
        let reduced = if reduced.level() > max_level {
            self.engine
                .drop_level(&reduced, reduced.level() - max_level)
                .map_err(PdeError::switch(SwitchStep::DropLevel))?
        } else {
            reduced
        };

        self.engine
            .mul_int(&reduced, self.score_scaling)
            .map_err(PdeError::switch(SwitchStep::Rescale))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ClearEngine;
    use crate::params::{BootstrapParams, PdeParams};

    fn test_params() -> (PdeParams, ResolutionParams) {
        let params = PdeParams::test_small();
        let top = params.resolution_params(params.max_resolution()).unwrap();
        (params, top)
    }

    #[test]
    fn test_switch_full_ring() {
        let engine = ClearEngine::with_seed(51);
        let (params, top) = test_params();
        let sk = engine.gen_secret_key(&top);
        let evk = engine.gen_evaluation_keys(&sk, &top, &params.bootstrap).unwrap();

        let scaling = params.score_scaling();
        let mut coeffs = vec![0.0; top.ring_dim()];
        coeffs[0] = 17.0 * scaling;
        coeffs[5] = 3.0 * scaling;
        coeffs[40] = 9.0 * scaling;
        let pt = engine.encode_coeffs(&top, &coeffs, 0, 45.0).unwrap();
        let ct = engine.encrypt(&pt, &sk).unwrap();

        let switcher = SchemeSwitcher::new(&engine, &top, &evk, params.log_score_scaling);
        let (real, imag) = switcher.switch_domain(&ct).unwrap();
        let imag = imag.unwrap();

        assert!(real.is_batched());
        assert_eq!(real.level(), top.max_level());
        assert!((real.values()[0] - 17.0).abs() < 1e-4);
        assert!((real.values()[5] - 3.0).abs() < 1e-4);
        assert!(real.values()[1].abs() < 1e-4);
        assert!((imag.values()[8] - 9.0).abs() < 1e-4);
    }

    #[test]
    fn test_switch_sparse_has_no_imag() {
        let engine = ClearEngine::with_seed(52);
        let (params, top) = test_params();
        let sk = engine.gen_secret_key(&top);
        let evk = engine.gen_evaluation_keys(&sk, &top, &params.bootstrap).unwrap();

        let pt = engine.encode_coeffs(&top, &[0.01], 0, 45.0).unwrap();
        let mut ct = engine.encrypt(&pt, &sk).unwrap();
        ct.set_log_slots(3);

        let switcher = SchemeSwitcher::new(&engine, &top, &evk, params.log_score_scaling);
        let (real, imag) = switcher.switch_domain(&ct).unwrap();
        assert!(imag.is_none());
        assert_eq!(real.values().len(), 8);
    }

    #[test]
    fn test_switch_failure_names_step() {
        let engine = ClearEngine::with_seed(53);
        let (params, top) = test_params();
        let sk = engine.gen_secret_key(&top);
        // No room for CoeffsToSlots after ModUp
        let starved = BootstrapParams {
            extra_levels: 0,
            coeffs_to_slots_depth: top.max_level() + 1,
            ..params.bootstrap.clone()
        };
        let evk = engine.gen_evaluation_keys(&sk, &top, &starved).unwrap();

        let pt = engine.encode_coeffs(&top, &[0.01], 0, 45.0).unwrap();
        let ct = engine.encrypt(&pt, &sk).unwrap();

        let switcher = SchemeSwitcher::new(&engine, &top, &evk, params.log_score_scaling);
        assert!(matches!(
            switcher.switch_domain(&ct),
            Err(PdeError::SchemeSwitchFailed {
                step: SwitchStep::CoeffsToSlots,
                ..
            })
        ));
    }
}
