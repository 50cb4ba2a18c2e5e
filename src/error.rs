//! Error types.
//!
//! Two layers:
//!
//! - [`ModelError`]: tagged failures from the numerical core (ODE model, solver,
//!   quadrature, chi-square evaluators). These never abort the process; callers
//!   decide what a failed grid cell means.
//! - [`AppError`]: application-level error carrying a process exit code.
//!
//! Exit codes:
//! - `2`: usage, configuration, or input file problems
//! - `3`: no usable data after ingest
//! - `4`: computation failure

use thiserror::Error;

/// Failures raised by the cosmology model and the numerics built on it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error(
        "total density is non-positive at x={x}: omega_dm={omega_dm:e}, omega_dr={omega_dr:e}, tau={tau}"
    )]
    NonPositiveDensity {
        x: f64,
        omega_dm: f64,
        omega_dr: f64,
        tau: f64,
    },
    #[error(
        "total density overflowed at x={x}: omega_dm={omega_dm:e}, omega_dr={omega_dr:e}, tau={tau}"
    )]
    DensityOverflow {
        x: f64,
        omega_dm: f64,
        omega_dr: f64,
        tau: f64,
    },
    #[error("invalid model parameter {name}={value} (must be finite and > 0)")]
    InvalidParameter { name: &'static str, value: f64 },
    #[error("query coordinate x={x} lies before the initial condition x_ini={x_ini}")]
    QueryBeforeInitial { x: f64, x_ini: f64 },
    #[error("query coordinate at index {index} is not finite")]
    NonFiniteQuery { index: usize },
    #[error("ODE integration exceeded {max_steps} steps at x={x} (target {target})")]
    StepLimit { max_steps: usize, x: f64, target: f64 },
    #[error("ODE step size underflow at x={x}")]
    StepUnderflow { x: f64 },
    #[error("non-finite {what} at x={x}")]
    NonFinite { what: &'static str, x: f64 },
    #[error("chi-square is not finite at omega_dm={omega_dm}, omega_lambda={omega_lambda}, tau={tau}")]
    NonFiniteChi2 {
        omega_dm: f64,
        omega_lambda: f64,
        tau: f64,
    },
    #[error("redshift must be finite and >= 0, got {z}")]
    InvalidRedshift { z: f64 },
    #[error("{what} dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("observable {observable} requires the {dataset} dataset, which is not loaded")]
    MissingDataset {
        observable: &'static str,
        dataset: &'static str,
    },
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<ModelError> for AppError {
    fn from(err: ModelError) -> Self {
        AppError::new(4, format!("Model evaluation failed: {err}"))
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
