//! Ring packing and merging across resolutions
//!
//! - [`PackEvaluator`] packs up to N single-value ciphertexts at resolution r
//!   into one ciphertext at r, using the automorphism tree τ_{2^ℓ+1}.
//! - [`MergeEvaluator`] merges two ciphertexts at r into one at r+1 as
//!   `even(Y) + X·odd(Y)` with Y = X², and raises any batch to the top
//!   resolution with a binary merge tree.
//!
//! # Example
//!
//! ```ignore
//! let packer = PackEvaluator::new(&engine, &keys.registry);
//! let packed = packer.pack(&per_row)?;          // resolution r
//!
//! let merger = MergeEvaluator::new(&engine, &keys.registry)?;
//! let top = merger.merge_tree(vec![packed])?;   // resolution maxRes
//! ```

mod merge;
mod pack;
mod xpow;

pub use merge::MergeEvaluator;
pub use pack::PackEvaluator;
pub use xpow::XPow2Table;
