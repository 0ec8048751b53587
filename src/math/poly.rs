//! Negacyclic polynomial helpers over R[X]/(X^N + 1).
//!
//! Coefficients are plain `f64` message values; the ring structure (X^N = -1)
//! is what the packing and merging algorithms rely on.

/// Multiply by the monomial X^k, k taken modulo 2N.
pub fn mul_monomial(coeffs: &[f64], k: usize) -> Vec<f64> {
    let n = coeffs.len();
    let k = k % (2 * n);
    let mut result = vec![0.0; n];

    for (i, &c) in coeffs.iter().enumerate() {
        let idx = i + k;
        let (pos, negate) = match idx / n {
            0 => (idx, false),
            1 => (idx - n, true),
            2 => (idx - 2 * n, false),
            _ => (idx - 3 * n, true),
        };
        result[pos] = if negate { -c } else { c };
    }

    result
}

/// Negacyclic product a·b mod (X^N + 1)
///
/// Sparse right-hand sides (monomial selectors, X^(2^k) tables) take an
/// O(N·nnz) path instead of the O(N^2) schoolbook product.
pub fn negacyclic_mul(a: &[f64], b: &[f64]) -> Vec<f64> {
    let n = a.len();
    assert_eq!(n, b.len(), "ring dimension mismatch");

    let mut result = vec![0.0; n];
    for (k, &bk) in b.iter().enumerate() {
        if bk == 0.0 {
            continue;
        }
        for (i, &ai) in a.iter().enumerate() {
            let idx = i + k;
            if idx < n {
                result[idx] += ai * bk;
            } else {
                result[idx - n] -= ai * bk;
            }
        }
    }

    result
}

/// Embed p(Y) into R[X]/(X^{2N} + 1) with Y = X^2: coefficient j moves to 2j.
pub fn embed_square(coeffs: &[f64]) -> Vec<f64> {
    let mut result = vec![0.0; 2 * coeffs.len()];
    for (j, &c) in coeffs.iter().enumerate() {
        result[2 * j] = c;
    }
    result
}

/// a += b
pub fn add_assign(a: &mut [f64], b: &[f64]) {
    for (x, y) in a.iter_mut().zip(b) {
        *x += y;
    }
}

/// a *= s
pub fn scale_assign(a: &mut [f64], s: f64) {
    for x in a.iter_mut() {
        *x *= s;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monomial(n: usize, k: usize) -> Vec<f64> {
        let mut v = vec![0.0; n];
        v[k] = 1.0;
        v
    }

    #[test]
    fn test_mul_monomial_wraps_negacyclically() {
        let a = vec![1.0, 2.0, 3.0, 4.0];
        // X · (1 + 2X + 3X^2 + 4X^3) = -4 + X + 2X^2 + 3X^3
        assert_eq!(mul_monomial(&a, 1), vec![-4.0, 1.0, 2.0, 3.0]);
        // X^N = -1
        assert_eq!(mul_monomial(&a, 4), vec![-1.0, -2.0, -3.0, -4.0]);
        // X^2N = 1
        assert_eq!(mul_monomial(&a, 8), a);
    }

    #[test]
    fn test_negacyclic_mul_matches_monomial_shift() {
        let a: Vec<f64> = (0..16).map(|i| i as f64 * 0.5 - 3.0).collect();
        for k in 0..16 {
            assert_eq!(negacyclic_mul(&a, &monomial(16, k)), mul_monomial(&a, k));
        }
    }

    #[test]
    fn test_negacyclic_mul_dense() {
        // (1 + X)(1 - X) = 1 - X^2
        let a = vec![1.0, 1.0, 0.0, 0.0];
        let b = vec![1.0, -1.0, 0.0, 0.0];
        assert_eq!(negacyclic_mul(&a, &b), vec![1.0, 0.0, -1.0, 0.0]);
    }

    #[test]
    fn test_embed_square() {
        let a = vec![1.0, 2.0, 3.0];
        assert_eq!(embed_square(&a), vec![1.0, 0.0, 2.0, 0.0, 3.0, 0.0]);
    }
}
