//! Goodness-of-fit evaluators.
//!
//! - `stats`: chi-square on plain vectors (diagonal and full covariance)
//! - `context`: per-observable evaluators and the combined selector sum

pub mod context;
pub mod stats;

pub use context::*;
pub use stats::*;
