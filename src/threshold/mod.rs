//! Homomorphic threshold and aggregation
//!
//! - Local stage: each slot holds one row's summed score; it becomes 1 when the
//!   sum reaches the private per-row threshold and 0 otherwise, and is added
//!   into a running score. An inner sum then folds all slots into the count.
//! - Global stage: the count is compared against the private global threshold
//!   and normalized by the row count.
//!
//! Both stages run the same comparison shape over different sign presets.

mod comparison;
mod evaluator;
mod presets;

pub use comparison::ComparisonEvaluator;
pub use evaluator::ThresholdEvaluator;
pub use presets::{CompositeSignPreset, GLOBAL_SIGN, LOCAL_SIGN};
