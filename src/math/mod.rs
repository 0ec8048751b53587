//! Mathematical primitives for the exploration pipeline.
//!
//! - **Negacyclic ring helpers** over R = R[X]/(X^N + 1) on `f64` coefficients
//! - **Galois automorphisms** τ_g(X) = X^g and the packing element schedule
//! - **Gaussian sampling** for error terms
//! - **Chebyshev series** evaluation for the sign-approximation presets
//!
//! # Example
//!
//! ```
//! use pde_explore::math::poly::{mul_monomial, negacyclic_mul};
//!
//! // X^3 · X^2 = X^5 in R[X]/(X^8 + 1)
//! let mut x3 = vec![0.0; 8];
//! x3[3] = 1.0;
//! let x5 = mul_monomial(&x3, 2);
//! assert_eq!(x5[5], 1.0);
//!
//! let mut x7 = vec![0.0; 8];
//! x7[7] = 1.0;
//! // X^7 · X^3 = X^10 = -X^2
//! assert_eq!(negacyclic_mul(&x7, &x3)[2], -1.0);
//! ```

pub mod chebyshev;
pub mod galois;
pub mod gaussian;
pub mod poly;

pub use galois::{apply_automorphism, is_valid_galois_element, pack_galois_elements};
pub use gaussian::GaussianSampler;
