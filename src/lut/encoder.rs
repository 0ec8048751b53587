//! Lookup-table encoding (client) and evaluation (server)

use rayon::prelude::*;

use super::{LookupTable, ScoringFunction};
use crate::engine::{CiphertextInfo, Engine};
use crate::error::{invalid_argument, PdeError, Result, Stage};
use crate::params::ResolutionParams;

/// Encodes scoring functions as encrypted selector tables and evaluates them
/// against plaintext values
pub struct LookupTableEncoder<'a, E: Engine> {
    engine: &'a E,
    params: &'a ResolutionParams,
    output_scale: f64,
}

impl<'a, E: Engine> LookupTableEncoder<'a, E> {
    pub fn new(engine: &'a E, params: &'a ResolutionParams) -> Self {
        Self {
            engine,
            params,
            output_scale: 1.0,
        }
    }

    /// Multiply every stored value by `scale` (the client's score pre-scaling)
    pub fn with_output_scale(mut self, scale: f64) -> Self {
        self.output_scale = scale;
        self
    }

    /// Encode and encrypt `function` as a table at this encoder's resolution
    ///
    /// # Arguments
    /// * `function` - Scoring function to tabulate
    /// * `sk` - Secret key of the packing resolution
    ///
    /// # Returns
    /// `ceil(points / N)` Montgomery-form ciphertexts at level 0
    pub fn encode(&self, function: &ScoringFunction, sk: &E::SecretKey) -> Result<LookupTable<E>> {
        let n = self.params.ring_dim();
        let domain = *function.domain();

        let blocks = (0..domain.blocks(n))
            .into_par_iter()
            .map(|i| {
                let start = i * n;
                let block_len = n.min(domain.points - start);

                let mut u = vec![0.0; n];
                u[0] = function.eval(domain.grid_point(start)) * self.output_scale;
                for k in 1..block_len {
                    u[n - k] = -function.eval(domain.grid_point(start + k)) * self.output_scale;
                }

                let pt = self
                    .engine
                    .encode_coeffs(self.params, &u, 0, self.params.log_default_scale as f64)
                    .map_err(PdeError::Encoding)?;
                let ct = self
                    .engine
                    .encrypt(&pt, sk)
                    .map_err(PdeError::engine(Stage::Encryption))?;
                self.engine
                    .to_montgomery(&ct)
                    .map_err(PdeError::engine(Stage::LookupTable))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(LookupTable {
            domain,
            resolution: self.params.resolution,
            blocks,
        })
    }

    /// Evaluate one value per table and sum the results
    pub fn evaluate(&self, tables: &[LookupTable<E>], values: &[f64]) -> Result<E::Ciphertext> {
        let mut acc = self.engine.zero(self.params, 0, false);
        self.evaluate_into(tables, values, &mut acc)?;
        Ok(acc)
    }

    /// Evaluate `tables[i]` at `values[i]` and sum into `acc`
    ///
    /// The first lookup overwrites `acc`, later lookups add into it. Each
    /// lookup selects the block holding the grid index and multiplies it by
    /// the monomial X^slot, which moves the stored value to coefficient 0.
    pub fn evaluate_into(
        &self,
        tables: &[LookupTable<E>],
        values: &[f64],
        acc: &mut E::Ciphertext,
    ) -> Result<()> {
        if tables.len() != values.len() {
            return Err(invalid_argument!(
                "{} tables for {} values",
                tables.len(),
                values.len()
            ));
        }
        if tables.is_empty() {
            return Err(invalid_argument!("no lookup table to evaluate"));
        }

        let n = self.params.ring_dim();
        for (i, (table, &x)) in tables.iter().zip(values).enumerate() {
            if table.resolution != self.params.resolution {
                return Err(PdeError::ResolutionMismatch {
                    expected: self.params.resolution,
                    found: table.resolution,
                });
            }

            let position = table.domain.position(x)?;
            let (block, slot) = (position / n, position % n);
            let block = table.blocks.get(block).ok_or_else(|| {
                invalid_argument!("table has {} blocks, index {} requested", table.len(), block)
            })?;
            debug_assert_eq!(block.resolution(), self.params.resolution);

            let selector = self
                .engine
                .encode_monomial(self.params, slot, false)
                .map_err(PdeError::Encoding)?;

            if i == 0 {
                *acc = self
                    .engine
                    .mul_plain(block, &selector)
                    .map_err(PdeError::engine(Stage::LookupTable))?;
            } else {
                self.engine
                    .mul_plain_then_add(block, &selector, acc)
                    .map_err(PdeError::engine(Stage::LookupTable))?;
            }
        }

        Ok(())
    }
}
