//! Chebyshev series over [-1, 1]
//!
//! The sign-approximation presets store coefficients in the Chebyshev basis:
//! p(x) = Σ c_k T_k(x), with T_0 = 1, T_1 = x, T_{k+1} = 2x·T_k - T_{k-1}.

/// Evaluate Σ c_k T_k(x) with Clenshaw's recurrence
pub fn eval_series(coeffs: &[f64], x: f64) -> f64 {
    let mut b1 = 0.0;
    let mut b2 = 0.0;
    for &c in coeffs.iter().skip(1).rev() {
        let b0 = 2.0 * x * b1 - b2 + c;
        b2 = b1;
        b1 = b0;
    }
    coeffs.first().copied().unwrap_or(0.0) + x * b1 - b2
}

/// Evaluate a composition p_k ∘ ... ∘ p_1 of Chebyshev series
pub fn eval_composite(polys: &[&[f64]], x: f64) -> f64 {
    polys.iter().fold(x, |acc, p| eval_series(p, acc))
}

/// Levels consumed by T_k under the doubling recurrences: ⌈log2 k⌉
pub fn basis_depth(k: usize) -> usize {
    (usize::BITS - k.saturating_sub(1).leading_zeros()) as usize
}

/// Depth of a degree-d series: ⌈log2 d⌉ for the basis plus one for the coefficients
pub fn series_depth(degree: usize) -> usize {
    basis_depth(degree) + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chebyshev_identities() {
        // T_2 = 2x^2 - 1, T_3 = 4x^3 - 3x
        for &x in &[-0.9, -0.3, 0.0, 0.4, 1.0] {
            assert!((eval_series(&[0.0, 0.0, 1.0], x) - (2.0 * x * x - 1.0)).abs() < 1e-12);
            assert!(
                (eval_series(&[0.0, 0.0, 0.0, 1.0], x) - (4.0 * x * x * x - 3.0 * x)).abs()
                    < 1e-12
            );
        }
    }

    #[test]
    fn test_series_depth() {
        assert_eq!(basis_depth(1), 0);
        assert_eq!(basis_depth(2), 1);
        assert_eq!(basis_depth(5), 3);
        assert_eq!(series_depth(1), 1);
        assert_eq!(series_depth(3), 3);
        assert_eq!(series_depth(15), 5);
        assert_eq!(series_depth(16), 5);
    }
}
