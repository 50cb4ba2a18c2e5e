//! `dm-decay-scan` library crate.
//!
//! The binary (`dmscan`) is a thin wrapper around this library so that:
//!
//! - the numerical core is testable without spawning processes
//! - the chi-square evaluators can be reused outside the grid scan

pub mod app;
pub mod chi2;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
pub mod solver;
pub mod telemetry;
