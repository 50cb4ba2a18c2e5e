//! Chi-square statistics on prediction/observation vectors.

use nalgebra::{DMatrix, DVector};
use tracing::warn;

use crate::error::ModelError;

/// `Σ (pred − obs)² / σ²`.
pub fn diagonal_chi2(predicted: &[f64], observed: &[f64], sigma: &[f64]) -> Result<f64, ModelError> {
    check_len("observed", predicted.len(), observed.len())?;
    check_len("sigma", predicted.len(), sigma.len())?;
    Ok(predicted
        .iter()
        .zip(observed)
        .zip(sigma)
        .map(|((p, o), s)| {
            let r = (p - o) / s;
            r * r
        })
        .sum())
}

/// `rᵀ C⁻¹ r` with `r = pred − obs`.
pub fn covariance_chi2(
    predicted: &[f64],
    observed: &[f64],
    inv_cov: &DMatrix<f64>,
) -> Result<f64, ModelError> {
    check_len("observed", predicted.len(), observed.len())?;
    check_len("inverse covariance", predicted.len(), inv_cov.nrows())?;
    check_len("inverse covariance", predicted.len(), inv_cov.ncols())?;
    let r = DVector::from_iterator(
        predicted.len(),
        predicted.iter().zip(observed).map(|(p, o)| p - o),
    );
    Ok(r.dot(&(inv_cov * &r)))
}

/// Invert a covariance matrix.
///
/// Cholesky is tried first. A matrix that is invertible but not positive
/// definite (text-rounded tables can end up slightly indefinite) falls back to
/// LU with a warning. Returns `None` for singular or non-finite input.
pub fn invert_covariance(cov: DMatrix<f64>) -> Option<DMatrix<f64>> {
    if !cov.is_square() || cov.iter().any(|v| !v.is_finite()) {
        return None;
    }
    if let Some(chol) = cov.clone().cholesky() {
        let inv = chol.inverse();
        if inv.iter().all(|v| v.is_finite()) {
            return Some(inv);
        }
    }
    let inv = cov.try_inverse()?;
    if !inv.iter().all(|v| v.is_finite()) {
        return None;
    }
    warn!(n = inv.nrows(), "covariance is not positive definite; inverted with LU");
    Some(inv)
}

fn check_len(what: &'static str, expected: usize, actual: usize) -> Result<(), ModelError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ModelError::DimensionMismatch {
            what,
            expected,
            actual,
        })
    }
}
