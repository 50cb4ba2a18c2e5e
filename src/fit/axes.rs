//! Scan axis generation.
//!
//! The densities are scanned on linear grids; the decay timescale spans orders
//! of magnitude, so its axis is linear in `ln τ`.

use crate::domain::ScanAxes;
use crate::error::AppError;

/// Generate `steps` evenly spaced points between `min` and `max` (inclusive).
///
/// `steps == 1` yields `[min]` and requires `min == max`.
pub fn linspace(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, AppError> {
    if !(min.is_finite() && max.is_finite() && max >= min) {
        return Err(AppError::new(
            2,
            format!("Invalid axis range: min={min}, max={max} (must be finite and max>=min)."),
        ));
    }
    if steps == 0 {
        return Err(AppError::new(2, "Axis steps must be >= 1."));
    }
    if steps == 1 {
        if max != min {
            return Err(AppError::new(2, "A single-step axis needs min == max."));
        }
        return Ok(vec![min]);
    }

    let step = (max - min) / (steps as f64 - 1.0);
    let mut out = Vec::with_capacity(steps);
    for i in 0..steps {
        out.push(min + step * i as f64);
    }
    // Pin the last point so it is exactly `max`.
    if let Some(last) = out.last_mut() {
        *last = max;
    }
    Ok(out)
}

/// `ln τ` axis for `steps` log-spaced timescales between `tau_min` and `tau_max`.
pub fn log_tau_axis(tau_min: f64, tau_max: f64, steps: usize) -> Result<Vec<f64>, AppError> {
    if !(tau_min.is_finite() && tau_max.is_finite() && tau_min > 0.0 && tau_max > 0.0) {
        return Err(AppError::new(
            2,
            format!("Invalid tau range: min={tau_min}, max={tau_max} (must be finite and >0)."),
        ));
    }
    linspace(tau_min.ln(), tau_max.ln(), steps)
}

/// Assemble and validate the three scan axes.
///
/// Densities must be strictly positive (the dark matter state is logarithmic)
/// and every axis must be non-empty.
pub fn build_axes(omega_dm: Vec<f64>, omega_lambda: Vec<f64>, log_tau: Vec<f64>) -> Result<ScanAxes, AppError> {
    for (name, axis) in [("omega_dm", &omega_dm), ("omega_lambda", &omega_lambda)] {
        if axis.is_empty() {
            return Err(AppError::new(2, format!("Axis {name} is empty.")));
        }
        if let Some(v) = axis.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
            return Err(AppError::new(
                2,
                format!("Axis {name} contains {v}; values must be finite and > 0."),
            ));
        }
    }
    if log_tau.is_empty() {
        return Err(AppError::new(2, "Axis log_tau is empty."));
    }
    if let Some(v) = log_tau.iter().find(|v| !v.is_finite()) {
        return Err(AppError::new(2, format!("Axis log_tau contains non-finite value {v}.")));
    }
    Ok(ScanAxes {
        omega_dm,
        omega_lambda,
        log_tau,
    })
}
