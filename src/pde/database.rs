//! Plaintext database access

use crate::error::{invalid_argument, Result};
use crate::math::GaussianSampler;

/// Row-indexed read access to a real-valued matrix
pub trait Database: Sync {
    /// (rows, columns)
    fn dims(&self) -> (usize, usize);

    /// Row `i`, or `None` past the last row
    fn row(&self, i: usize) -> Option<&[f64]>;
}

/// Row-major in-memory matrix
#[derive(Debug, Clone, PartialEq)]
pub struct DenseDatabase {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl DenseDatabase {
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(invalid_argument!(
                "{} values for a {} x {} database",
                data.len(),
                rows,
                cols
            ));
        }
        Ok(Self { rows, cols, data })
    }

    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if let Some(row) = rows.iter().find(|r| r.len() != cols) {
            return Err(invalid_argument!(
                "ragged rows: {} and {} columns",
                cols,
                row.len()
            ));
        }
        Self::new(rows.len(), cols, rows.concat())
    }

    /// Values 1 + |z| with z standard normal conditioned on |z| < 1
    pub fn synthetic(rows: usize, cols: usize, seed: u64) -> Self {
        let mut sampler = GaussianSampler::with_seed(1.0, seed);
        let data = (0..rows * cols)
            .map(|_| loop {
                let z = sampler.standard().abs();
                if z < 1.0 {
                    break z + 1.0;
                }
            })
            .collect();
        Self { rows, cols, data }
    }
}

impl Database for DenseDatabase {
    fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    fn row(&self, i: usize) -> Option<&[f64]> {
        if i >= self.rows {
            return None;
        }
        Some(&self.data[i * self.cols..(i + 1) * self.cols])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthetic_range() {
        let db = DenseDatabase::synthetic(64, 3, 7);
        assert_eq!(db.dims(), (64, 3));
        for i in 0..64 {
            assert!(db.row(i).unwrap().iter().all(|&v| (1.0..2.0).contains(&v)));
        }
        assert!(db.row(64).is_none());
        assert_eq!(db, DenseDatabase::synthetic(64, 3, 7));
    }

    #[test]
    fn test_from_rows() {
        let db = DenseDatabase::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(db.row(1).unwrap(), &[3.0, 4.0]);
        assert!(DenseDatabase::from_rows(&[vec![1.0], vec![2.0, 3.0]]).is_err());
    }
}
