//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - parameter points, observations, and datasets
//! - the observable selector (`ObservableSet`) and its members
//! - scan axes, the chi-square tensor, and the JSON run summary

pub mod types;

pub use types::*;
