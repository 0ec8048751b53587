//! Galois automorphisms for R = R[X]/(X^N + 1)
//!
//! Galois automorphisms τ_g: R → R are ring automorphisms defined by
//! τ_g(X) = X^g for odd g ∈ Z_{2N}^*.

/// Apply Galois automorphism τ_g to a coefficient vector
///
/// τ_g(p(X)) = p(X^g) mod (X^N + 1)
///
/// For X^N + 1, we have X^N = -1, so:
/// - X^i maps to X^(g·i mod 2N) with sign flip if (g·i / N) is odd
///
/// # Arguments
/// * `coeffs` - Input coefficients
/// * `g` - Galois element (must be odd)
pub fn apply_automorphism(coeffs: &[f64], g: usize) -> Vec<f64> {
    let n = coeffs.len();
    let two_n = 2 * n;

    let mut result = vec![0.0; n];

    for (i, &c) in coeffs.iter().enumerate() {
        if c == 0.0 {
            continue;
        }

        let new_idx = (g * i) % two_n;

        if new_idx < n {
            result[new_idx] += c;
        } else {
            result[new_idx - n] -= c;
        }
    }

    result
}

/// Galois elements used by the automorphism tree: t = 2^ℓ + 1 for ℓ = 1..=log N
pub fn pack_galois_elements(log_n: u32) -> Vec<usize> {
    (1..=log_n).map(|ell| (1usize << ell) + 1).collect()
}

/// Check if g is a valid Galois element (odd and below 2N)
pub fn is_valid_galois_element(g: usize, n: usize) -> bool {
    g % 2 == 1 && g < 2 * n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_automorphism_identity() {
        let coeffs: Vec<f64> = (0..16).map(|i| i as f64).collect();
        assert_eq!(apply_automorphism(&coeffs, 1), coeffs);
    }

    #[test]
    fn test_automorphism_composition() {
        let n = 32;
        let coeffs: Vec<f64> = (0..n).map(|i| (i * 7 % 11) as f64 - 5.0).collect();

        let (g1, g2) = (3, 5);
        let composed = apply_automorphism(&apply_automorphism(&coeffs, g2), g1);
        // τ_{g1} ∘ τ_{g2} = τ_{g1·g2 mod 2N}
        let direct = apply_automorphism(&coeffs, (g1 * g2) % (2 * n));

        assert_eq!(composed, direct);
    }

    #[test]
    fn test_n_plus_one_negates_odd_coefficients() {
        // τ_{N+1}(X^i) = X^{i(N+1)} = (-1)^i X^i
        let n = 8;
        let coeffs: Vec<f64> = (1..=n).map(|i| i as f64).collect();
        let result = apply_automorphism(&coeffs, n + 1);
        for i in 0..n {
            let expected = if i % 2 == 0 { coeffs[i] } else { -coeffs[i] };
            assert_eq!(result[i], expected);
        }
    }

    #[test]
    fn test_pack_galois_elements() {
        assert_eq!(pack_galois_elements(4), vec![3, 5, 9, 17]);
        for g in pack_galois_elements(10) {
            assert!(is_valid_galois_element(g, 1 << 10));
        }
    }
}
