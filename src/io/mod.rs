//! Input/output helpers.
//!
//! - dataset and covariance ingest (`ingest`)
//! - tensor, summary and dataset writers (`export`)
//! - tensor read-back and marginalisation (`tensor`)

pub mod export;
pub mod ingest;
pub mod tensor;

pub use export::*;
pub use ingest::*;
pub use tensor::*;
