//! Composite sign-approximation presets
//!
//! Each preset is a chain of odd degree-15 polynomials in the Chebyshev basis.
//! Their composition maps [-1, -2^-α] to ≈ -1 and [2^-α, 1] to ≈ +1, with
//! error about 2^-err. Coefficient tables are calibrated data: change them only
//! together with `id`.

use crate::math::chebyshev;

/// A named, versioned composite sign polynomial
#[derive(Debug, Clone, Copy)]
pub struct CompositeSignPreset {
    pub id: &'static str,
    /// Smallest |x| resolved, as log2 of its inverse
    pub log_alpha: u32,
    /// log2 of the inverse of the approximation error
    pub log_err: u32,
    /// Chebyshev coefficients of each stage, applied first to last
    pub polys: &'static [&'static [f64]],
}

impl CompositeSignPreset {
    /// Plaintext evaluation of the composite sign approximation
    pub fn eval_sign(&self, x: f64) -> f64 {
        chebyshev::eval_composite(self.polys, x)
    }

    /// Plaintext evaluation of (sign(x) + 1) / 2
    pub fn eval_step(&self, x: f64) -> f64 {
        (self.eval_sign(x) + 1.0) / 2.0
    }

    /// Levels consumed by the whole chain, without bootstraps
    pub fn depth(&self) -> usize {
        self.polys
            .iter()
            .map(|p| chebyshev::series_depth(p.len().saturating_sub(1)))
            .sum()
    }
}

/// Local stage: resolves deltas down to 2^-8 with 2^-12 error
pub const LOCAL_SIGN: CompositeSignPreset = CompositeSignPreset {
    id: "sign-a8-e12-v1",
    log_alpha: 8,
    log_err: 12,
    polys: &[
        &[
            0.0, 0.667972070856, 0.0, -0.223989523020, 0.0, 0.136121229346, 0.0,
            -0.099160550898, 0.0, 0.079224867308, 0.0, -0.067250088206, 0.0, 0.059852569462,
            0.0, -0.503955481350,
        ],
        &[
            0.0, 0.955669291788, 0.0, -0.317870998995, 0.0, 0.189953989728, 0.0,
            -0.134924463410, 0.0, 0.104260767625, 0.0, -0.084798113265, 0.0, 0.071534728674,
            0.0, -0.282024623439,
        ],
        &[
            0.0, 1.254717353059, 0.0, -0.371638622338, 0.0, 0.175181567419, 0.0,
            -0.085946606966, 0.0, 0.039326533561, 0.0, -0.015616729371, 0.0, 0.004903749402,
            0.0, -0.000987938705,
        ],
    ],
};

/// Global stage: resolves deltas down to 2^-16 with 2^-20 error
///
/// Five contraction stages lift |x| >= 2^-16 into [0.997, 1]; the last stage
/// converges there.
pub const GLOBAL_SIGN: CompositeSignPreset = CompositeSignPreset {
    id: "sign-a16-e20-v2",
    log_alpha: 16,
    log_err: 20,
    polys: &[
        &[
            0.0, 0.637269449737188, 0.0, -0.213843738417344, 0.0, 0.130068234633099, 0.0,
            -0.094901096397645, 0.0, 0.076054497059607, 0.0, -0.064781919022414, 0.0,
            0.057798576485175, 0.0, -0.527470919569878,
        ],
        &[
            0.0, 0.638700181260247, 0.0, -0.214317824735468, 0.0, 0.130349622789681, 0.0,
            -0.095098659395767, 0.0, 0.076204287409461, 0.0, -0.064900468612766, 0.0,
            0.057894666845681, 0.0, -0.526389807685290,
        ],
        &[
            0.0, 0.656660515643463, 0.0, -0.220265838921563, 0.0, 0.133874818140956, 0.0,
            -0.097566936454763, 0.0, 0.078071784608327, 0.0, -0.066374945505020, 0.0,
            0.059082559860421, 0.0, -0.512808664320444,
        ],
        &[
            0.0, 0.856365262752726, 0.0, -0.285853799670911, 0.0, 0.172037630504081, 0.0,
            -0.123530309364609, 0.0, 0.096888417957145, 0.0, -0.080313662412427, 0.0,
            0.069335330251446, 0.0, -0.359982743680861,
        ],
        &[
            0.0, 1.259472936757338, 0.0, -0.388942411554557, 0.0, 0.199680748236659, 0.0,
            -0.111948691559903, 0.0, 0.061917947978468, 0.0, -0.031924778682602, 0.0,
            0.014450752248998, 0.0, -0.005483758067711,
        ],
        &[
            0.0, 1.456685872769563, 0.0, -0.843090543719575, 0.0, 0.645851531230379, 0.0,
            -0.382317848515512, 0.0, 0.161674553383947, 0.0, -0.046174810175712, 0.0,
            0.008010742976542, 0.0, -0.000639497949633,
        ],
    ],
};
