//! Grid scan orchestration.
//!
//! Responsibilities:
//!
//! - generate the `ω_dm`, `ω_Λ` and `ln τ` axes
//! - evaluate the combined chi-square at every cell (parallel)
//! - pick the best cell deterministically

pub mod axes;
pub mod scan;

pub use axes::*;
pub use scan::*;
