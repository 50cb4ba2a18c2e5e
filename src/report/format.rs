//! Formatted terminal output.
//!
//! Formatting lives here so the numerical code never builds strings, and so
//! output changes stay local.

use std::path::Path;

use crate::chi2::ChiSquareContext;
use crate::domain::{ChiSquareTensor, ScanAxes, ScanSummary};
use crate::io::tensor::Marginal2d;

/// One ranked grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedCell {
    pub index: [usize; 3],
    pub omega_dm: f64,
    pub omega_lambda: f64,
    pub tau: f64,
    pub chi2: f64,
}

/// The `top_n` lowest finite cells, ascending; ties keep flat-index order.
pub fn rank_cells(tensor: &ChiSquareTensor, axes: &ScanAxes, top_n: usize) -> Vec<RankedCell> {
    let mut finite: Vec<(usize, f64)> = tensor
        .values()
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .collect();
    finite.sort_by(|a, b| a.1.total_cmp(&b.1));

    finite
        .into_iter()
        .take(top_n)
        .map(|(flat, chi2)| {
            let [i, j, k] = tensor.unravel(flat);
            let p = axes.point(i, j, k);
            RankedCell {
                index: [i, j, k],
                omega_dm: p.omega_dm,
                omega_lambda: p.omega_lambda,
                tau: p.tau,
                chi2,
            }
        })
        .collect()
}

/// Format the scan run summary (datasets, grid, best fit, outputs).
pub fn format_scan_summary(
    summary: &ScanSummary,
    ctx: &ChiSquareContext,
    tensor_path: &Path,
    summary_path: &Path,
) -> String {
    let mut out = String::new();

    out.push_str("=== dmscan - decaying dark matter chi-square scan ===\n");
    out.push_str(&format!(
        "Observables: {} ({})\n",
        summary.observables,
        summary
            .members
            .iter()
            .map(|m| m.display_name())
            .collect::<Vec<_>>()
            .join(" + ")
    ));
    if let Some(ohd) = ctx.ohd() {
        out.push_str(&format!("OHD: n={}\n", ohd.len()));
    }
    if let Some(sne) = ctx.sne() {
        let cov = if summary.sne_covariance { "full covariance" } else { "diagonal" };
        out.push_str(&format!("SNe: n={} ({cov})\n", sne.dataset.len()));
    }

    let axes = &summary.axes;
    out.push_str(&format!(
        "Grid: {} x {} x {} cells\n",
        summary.shape[0], summary.shape[1], summary.shape[2]
    ));
    out.push_str(&format!("  omega_dm     {}\n", fmt_range(&axes.omega_dm)));
    out.push_str(&format!("  omega_lambda {}\n", fmt_range(&axes.omega_lambda)));
    let taus: Vec<f64> = axes.log_tau.iter().map(|v| v.exp()).collect();
    out.push_str(&format!("  tau          {}\n", fmt_range(&taus)));
    if summary.failed_cells > 0 {
        out.push_str(&format!("Failed cells: {} (stored as +inf)\n", summary.failed_cells));
    }

    let b = &summary.best;
    out.push_str("\nBest fit:\n");
    out.push_str(&format!("- chi2         {:.6}\n", b.chi2));
    out.push_str(&format!("- omega_dm     {:.6}\n", b.omega_dm));
    out.push_str(&format!("- omega_lambda {:.6}\n", b.omega_lambda));
    out.push_str(&format!("- tau          {:.6} (ln tau = {:.6})\n", b.tau, b.log_tau));
    out.push_str(&format!("- index        {:?}\n", b.index));

    out.push_str("\nOutputs:\n");
    out.push_str(&format!("- {}\n", tensor_path.display()));
    out.push_str(&format!("- {}\n", summary_path.display()));
    out.push('\n');

    out
}

/// Format the lowest cells as a table.
pub fn format_ranked_cells(cells: &[RankedCell]) -> String {
    let mut out = String::new();
    out.push_str("Lowest chi-square cells:\n");
    out.push_str(
        format!(
            "{:>4} {:>12} {:>12} {:>14} {:>14}",
            "rank", "omega_dm", "omega_lambda", "tau", "chi2"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(format!("{:-<4} {:-<12} {:-<12} {:-<14} {:-<14}", "", "", "", "", "").trim_end());
    out.push('\n');
    for (rank, c) in cells.iter().enumerate() {
        out.push_str(&format!(
            "{:>4} {:>12.6} {:>12.6} {:>14.4} {:>14.6}\n",
            rank + 1,
            c.omega_dm,
            c.omega_lambda,
            c.tau,
            c.chi2
        ));
    }
    out
}

/// Format the peak and region sizes of a marginal grid.
pub fn format_marginal_summary(marginal: &Marginal2d, csv_path: &Path) -> String {
    let (a, b) = marginal.peak;
    let within = |level: f64| marginal.delta_chi2.iter().filter(|d| **d <= level).count();
    let mut out = String::new();
    out.push_str(&format!(
        "Marginal peak: {}={:.6}, {}={:.6}\n",
        marginal.row_name, marginal.rows[a], marginal.column_name, marginal.columns[b]
    ));
    out.push_str(&format!(
        "Cells within 1sigma: {} | within 2sigma: {} | total: {}\n",
        within(2.3),
        within(5.0),
        marginal.delta_chi2.len()
    ));
    out.push_str(&format!("Written: {}\n", csv_path.display()));
    out
}

fn fmt_range(v: &[f64]) -> String {
    match (v.first(), v.last()) {
        (Some(lo), Some(hi)) => format!("[{lo:.6}, {hi:.6}] ({} steps)", v.len()),
        _ => "[] (0 steps)".to_string(),
    }
}
