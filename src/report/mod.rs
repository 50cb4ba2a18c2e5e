//! Reporting utilities: best-cell rankings and formatted terminal output.

pub mod format;

pub use format::*;
