//! Reading a finished scan back and reducing it to two dimensions.
//!
//! Marginalising over one axis uses the profile-free Gaussian likelihood sum
//!
//! `χ²_marg(a, b) = −2 ln Σ_c exp(−Δχ²(a, b, c) / 2)`, with `Δχ² = χ² − min χ²`,
//!
//! evaluated with log-sum-exp so that large `Δχ²` never underflows to `ln 0`.
//! The reported grid is shifted so that its own minimum is zero.

use std::fs::{self, File};
use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::domain::{ChiSquareTensor, ScanAxes, ScanSummary};
use crate::error::AppError;

/// `Δχ²` levels of the 68.3% and 95.4% regions for two parameters.
pub const CONTOUR_LEVELS: [(f64, &str); 2] = [(2.3, "1sigma"), (5.0, "2sigma")];

/// The axis summed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MarginalAxis {
    /// Keep `(ω_dm, ω_Λ)`.
    Tau,
    /// Keep `(ω_dm, τ)`.
    Lambda,
}

/// Two-dimensional `Δχ²` grid; `delta_chi2[a * columns.len() + b]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Marginal2d {
    pub row_name: &'static str,
    pub rows: Vec<f64>,
    pub column_name: &'static str,
    pub columns: Vec<f64>,
    pub delta_chi2: Vec<f64>,
    /// `(row, column)` of the zero of `delta_chi2`.
    pub peak: (usize, usize),
}

impl Marginal2d {
    pub fn get(&self, a: usize, b: usize) -> f64 {
        self.delta_chi2[a * self.columns.len() + b]
    }
}

pub fn read_summary_json(path: &Path) -> Result<ScanSummary, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open summary JSON '{}': {e}", path.display())))?;
    serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid summary JSON: {e}")))
}

/// Read a raw little-endian tensor of the given shape.
pub fn read_tensor(path: &Path, shape: [usize; 3]) -> Result<ChiSquareTensor, AppError> {
    let bytes = fs::read(path)
        .map_err(|e| AppError::new(2, format!("Failed to read tensor file '{}': {e}", path.display())))?;
    let n = shape[0] * shape[1] * shape[2];
    if bytes.len() != n * 8 {
        return Err(AppError::new(
            2,
            format!(
                "Tensor file '{}' has {} bytes, expected {} for shape {:?}.",
                path.display(),
                bytes.len(),
                n * 8,
                shape
            ),
        ));
    }
    let values = bytes
        .chunks_exact(8)
        .map(|chunk| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            f64::from_le_bytes(raw)
        })
        .collect();
    ChiSquareTensor::from_flat(shape, values)
        .ok_or_else(|| AppError::new(2, "Tensor shape does not match its contents."))
}

/// Sum the likelihood over `axis` and return the remaining `Δχ²` grid.
pub fn marginalize(tensor: &ChiSquareTensor, axes: &ScanAxes, axis: MarginalAxis) -> Result<Marginal2d, AppError> {
    if tensor.shape() != axes.shape() {
        return Err(AppError::new(
            2,
            format!(
                "Tensor shape {:?} does not match axes {:?}.",
                tensor.shape(),
                axes.shape()
            ),
        ));
    }
    let Some((_, chi2_min)) = tensor.argmin() else {
        return Err(AppError::new(3, "Tensor has no finite chi-square values."));
    };

    let [n_dm, n_l, n_t] = tensor.shape();
    let (n_cols, summed, column_name, columns) = match axis {
        MarginalAxis::Tau => (n_l, n_t, "omega_lambda", axes.omega_lambda.clone()),
        MarginalAxis::Lambda => (n_t, n_l, "tau", axes.log_tau.iter().map(|v| v.exp()).collect()),
    };

    let mut grid = Vec::with_capacity(n_dm * n_cols);
    for i in 0..n_dm {
        for b in 0..n_cols {
            let terms = (0..summed).map(|c| {
                let (j, k) = match axis {
                    MarginalAxis::Tau => (b, c),
                    MarginalAxis::Lambda => (c, b),
                };
                -(tensor.get(i, j, k) - chi2_min) / 2.0
            });
            grid.push(-2.0 * log_sum_exp(terms));
        }
    }

    let mut peak = 0usize;
    for (idx, v) in grid.iter().enumerate() {
        if *v < grid[peak] {
            peak = idx;
        }
    }
    let floor = grid[peak];
    for v in &mut grid {
        *v -= floor;
    }

    Ok(Marginal2d {
        row_name: "omega_dm",
        rows: axes.omega_dm.clone(),
        column_name,
        columns,
        delta_chi2: grid,
        peak: (peak / n_cols, peak % n_cols),
    })
}

/// Write the grid as long-format CSV: `row, column, delta_chi2, region`.
pub fn write_marginal_csv(path: &Path, marginal: &Marginal2d) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to create marginal CSV '{}': {e}", path.display())))?;
    writer
        .write_record([marginal.row_name, marginal.column_name, "delta_chi2", "region"])
        .map_err(|e| AppError::new(2, format!("Failed to write marginal CSV header: {e}")))?;

    for (a, row) in marginal.rows.iter().enumerate() {
        for (b, col) in marginal.columns.iter().enumerate() {
            let d = marginal.get(a, b);
            let region = CONTOUR_LEVELS
                .iter()
                .find(|(level, _)| d <= *level)
                .map(|(_, name)| *name)
                .unwrap_or("");
            writer
                .write_record([row.to_string(), col.to_string(), format!("{d:.6}"), region.to_string()])
                .map_err(|e| AppError::new(2, format!("Failed to write marginal CSV row: {e}")))?;
        }
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to write marginal CSV: {e}")))?;
    Ok(())
}

/// `ln Σ exp(t)`; `-inf` when every term is `-inf`.
fn log_sum_exp(terms: impl Iterator<Item = f64> + Clone) -> f64 {
    let max = terms.clone().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    max + terms.map(|t| (t - max).exp()).sum::<f64>().ln()
}
