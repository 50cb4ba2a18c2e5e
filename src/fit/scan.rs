//! Three-dimensional chi-square grid scan.
//!
//! Given:
//! - axes `ω_dm` (outer), `ω_Λ` (middle), `ln τ` (inner)
//! - an observable selector
//! - an immutable chi-square context
//!
//! we evaluate the combined chi-square at every cell, store it at the row-major
//! flat index `(i·n_Λ + j)·n_τ + k`, and report the smallest cell.
//!
//! Cells are independent, so they are evaluated in parallel by default. The
//! result buffer is indexed by flat position, and the minimum is chosen by
//! `(chi2, flat index)`, which is exactly "first encountered in iteration
//! order" for the sequential loop. Under the abort policy the reported cell
//! is likewise the failing cell with the lowest flat index.

use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::chi2::ChiSquareContext;
use crate::domain::{BestFit, CellFailure, ChiSquareTensor, ObservableSet, ParamPoint, ScanAxes};
use crate::error::{AppError, ModelError};

/// Scan behaviour switches.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub on_failure: CellFailure,
    /// Evaluate cells one after another on the calling thread.
    pub sequential: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            on_failure: CellFailure::Abort,
            sequential: false,
        }
    }
}

/// Completed scan.
#[derive(Debug, Clone)]
pub struct ScanOutput {
    pub tensor: ChiSquareTensor,
    pub best: BestFit,
    /// Cells replaced by `+inf` under [`CellFailure::Sentinel`].
    pub failed_cells: usize,
}

#[derive(Debug, Clone)]
struct CellFailureInfo {
    index: [usize; 3],
    point: ParamPoint,
    error: ModelError,
}

/// Run the full grid scan.
pub fn scan_grid(
    ctx: &ChiSquareContext,
    set: ObservableSet,
    axes: &ScanAxes,
    opts: &ScanOptions,
) -> Result<ScanOutput, AppError> {
    ctx.ensure_supports(set)
        .map_err(|e| AppError::new(2, format!("Cannot scan '{set}': {e}")))?;

    let shape = axes.shape();
    let n = axes.cell_count();
    if n == 0 {
        return Err(AppError::new(2, "Scan grid is empty."));
    }

    info!(
        observables = %set,
        n_omega_dm = shape[0],
        n_omega_lambda = shape[1],
        n_tau = shape[2],
        parallel = !opts.sequential,
        "starting chi-square grid scan"
    );
    let started = Instant::now();

    let evaluate = |flat: usize| -> Result<f64, CellFailureInfo> {
        let index = unravel(shape, flat);
        let point = axes.point(index[0], index[1], index[2]);
        let chi2 = ctx
            .combined(set, &point)
            .and_then(|v| {
                if v.is_finite() {
                    Ok(v)
                } else {
                    Err(ModelError::NonFiniteChi2 {
                        omega_dm: point.omega_dm,
                        omega_lambda: point.omega_lambda,
                        tau: point.tau,
                    })
                }
            })
            .map_err(|error| CellFailureInfo { index, point, error })?;
        debug!(
            omega_dm = point.omega_dm,
            omega_lambda = point.omega_lambda,
            log_tau = axes.log_tau[index[2]],
            chi2,
            "cell"
        );
        Ok(chi2)
    };

    let (values, failed_cells) = match opts.on_failure {
        CellFailure::Abort => {
            let values: Result<Vec<f64>, CellFailureInfo> = if opts.sequential {
                (0..n).map(evaluate).collect()
            } else {
                // Run every cell so the reported failure is the lowest flat index,
                // as in the sequential loop.
                let outcomes: Vec<Result<f64, CellFailureInfo>> =
                    (0..n).into_par_iter().map(evaluate).collect();
                outcomes.into_iter().collect()
            };
            (values.map_err(abort_error)?, 0)
        }
        CellFailure::Sentinel => {
            let outcomes: Vec<Result<f64, CellFailureInfo>> = if opts.sequential {
                (0..n).map(evaluate).collect()
            } else {
                (0..n).into_par_iter().map(evaluate).collect()
            };
            let mut failed = 0usize;
            let values = outcomes
                .into_iter()
                .map(|outcome| match outcome {
                    Ok(v) => v,
                    Err(info) => {
                        failed += 1;
                        warn!(
                            index = ?info.index,
                            omega_dm = info.point.omega_dm,
                            omega_lambda = info.point.omega_lambda,
                            tau = info.point.tau,
                            error = %info.error,
                            "cell failed; recording +inf"
                        );
                        f64::INFINITY
                    }
                })
                .collect();
            (values, failed)
        }
    };

    let tensor = ChiSquareTensor::from_flat(shape, values)
        .ok_or_else(|| AppError::new(4, "Chi-square buffer does not match the grid shape."))?;

    let Some((flat, chi2)) = tensor.argmin() else {
        return Err(AppError::new(
            4,
            format!("No grid cell produced a finite chi-square ({failed_cells} failed)."),
        ));
    };
    let [i, j, k] = tensor.unravel(flat);
    let best = BestFit {
        index: [i, j, k],
        omega_dm: axes.omega_dm[i],
        omega_lambda: axes.omega_lambda[j],
        log_tau: axes.log_tau[k],
        tau: axes.log_tau[k].exp(),
        chi2,
    };

    info!(
        cells = n,
        failed = failed_cells,
        elapsed_s = started.elapsed().as_secs_f64(),
        min_chi2 = best.chi2,
        omega_dm = best.omega_dm,
        omega_lambda = best.omega_lambda,
        tau = best.tau,
        "grid scan finished"
    );

    Ok(ScanOutput {
        tensor,
        best,
        failed_cells,
    })
}

fn unravel(shape: [usize; 3], flat: usize) -> [usize; 3] {
    let k = flat % shape[2];
    let j = (flat / shape[2]) % shape[1];
    let i = flat / (shape[1] * shape[2]);
    [i, j, k]
}

fn abort_error(info: CellFailureInfo) -> AppError {
    AppError::new(
        4,
        format!(
            "Grid cell {:?} (omega_dm={}, omega_lambda={}, tau={}) failed: {}",
            info.index, info.point.omega_dm, info.point.omega_lambda, info.point.tau, info.error
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chi2::H0Measurement;
    use crate::chi2::SneData;
    use crate::data::synthetic::{distance_modulus_dataset, hubble_dataset};
    use crate::domain::Dataset;
    use crate::fit::build_axes;
    use crate::math::QuadOptions;
    use crate::solver::HubbleSolver;

    const REDSHIFTS: [f64; 6] = [0.07, 0.2, 0.48, 0.9, 1.3, 1.75];

    fn scenario_axes() -> ScanAxes {
        build_axes(vec![0.1, 0.2], vec![0.5, 0.7], vec![500f64.ln(), 1000f64.ln()]).unwrap()
    }

    fn truth() -> ParamPoint {
        ParamPoint {
            omega_dm: 0.2,
            omega_lambda: 0.5,
            tau: 500.0,
        }
    }

    fn context_for(ds: Dataset) -> ChiSquareContext {
        ChiSquareContext::new(
            HubbleSolver::default(),
            QuadOptions::default(),
            Some(ds),
            None,
            H0Measurement::default(),
        )
        .unwrap()
    }

    fn synthetic(sigma: f64) -> Dataset {
        hubble_dataset(&HubbleSolver::default(), &truth(), &REDSHIFTS, sigma, None).unwrap()
    }

    #[test]
    fn two_by_two_by_two_scenario_finds_generating_cell() {
        let ctx = context_for(synthetic(5.0));
        let out = scan_grid(&ctx, ObservableSet::Ohd, &scenario_axes(), &ScanOptions::default()).unwrap();

        assert_eq!(out.tensor.shape(), [2, 2, 2]);
        assert_eq!(out.tensor.values().len(), 8);
        assert!(out.tensor.values().iter().all(|v| v.is_finite() && *v >= 0.0));
        assert_eq!(out.best.index, [1, 0, 0]);
        assert!(out.best.chi2 < 1e-12);
        assert!((out.best.tau - 500.0).abs() < 1e-9);
        assert_eq!(out.failed_cells, 0);
    }

    #[test]
    fn tensor_order_matches_nested_iteration() {
        let ctx = context_for(synthetic(5.0));
        let axes = scenario_axes();
        let out = scan_grid(&ctx, ObservableSet::Ohd, &axes, &ScanOptions::default()).unwrap();
        let mut flat = 0;
        for i in 0..2 {
            for j in 0..2 {
                for k in 0..2 {
                    let p = axes.point(i, j, k);
                    let direct = ctx.combined(ObservableSet::Ohd, &p).unwrap();
                    assert_eq!(out.tensor.values()[flat], direct);
                    flat += 1;
                }
            }
        }
    }

    #[test]
    fn parallel_and_sequential_scans_are_identical() {
        let ctx = context_for(synthetic(5.0));
        let axes = scenario_axes();
        let par = scan_grid(&ctx, ObservableSet::OhdH0, &axes, &ScanOptions::default()).unwrap();
        let seq = scan_grid(
            &ctx,
            ObservableSet::OhdH0,
            &axes,
            &ScanOptions {
                sequential: true,
                ..ScanOptions::default()
            },
        )
        .unwrap();
        let again = scan_grid(&ctx, ObservableSet::OhdH0, &axes, &ScanOptions::default()).unwrap();
        assert_eq!(par.tensor, seq.tensor);
        assert_eq!(par.tensor, again.tensor);
        assert_eq!(par.best, seq.best);
    }

    #[test]
    fn scaling_sigma_scales_tensor_and_keeps_best_fit() {
        let k = 4.0;
        let base = scan_grid(
            &context_for(synthetic(3.0)),
            ObservableSet::Ohd,
            &scenario_axes(),
            &ScanOptions::default(),
        )
        .unwrap();
        let scaled = scan_grid(
            &context_for(synthetic(3.0 * k)),
            ObservableSet::Ohd,
            &scenario_axes(),
            &ScanOptions::default(),
        )
        .unwrap();
        for (a, b) in base.tensor.values().iter().zip(scaled.tensor.values()) {
            assert!((a / (k * k) - b).abs() <= 1e-12 * a.max(1e-300));
        }
        assert_eq!(base.best.index, scaled.best.index);
    }

    #[test]
    fn failing_cells_abort_by_default() {
        let ctx = context_for(synthetic(5.0));
        // A large negative ω_Λ drives the total density below zero before today.
        let axes = ScanAxes {
            omega_dm: vec![0.2],
            omega_lambda: vec![-1e3, 0.5],
            log_tau: vec![500f64.ln()],
        };
        let err = scan_grid(&ctx, ObservableSet::Ohd, &axes, &ScanOptions::default()).unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(err.to_string().contains("non-positive"));
    }

    #[test]
    fn parallel_abort_reports_the_first_failing_cell() {
        let ctx = context_for(synthetic(5.0));
        let axes = ScanAxes {
            omega_dm: vec![0.2],
            omega_lambda: vec![-1e3, -2e3, 0.5],
            log_tau: vec![500f64.ln()],
        };
        for _ in 0..5 {
            let err = scan_grid(&ctx, ObservableSet::Ohd, &axes, &ScanOptions::default()).unwrap_err();
            assert_eq!(err.exit_code(), 4);
            let msg = err.to_string();
            assert!(msg.contains("[0, 0, 0]"), "{msg}");
            assert!(msg.contains("omega_lambda=-1000,"), "{msg}");
        }
    }

    #[test]
    fn supernova_only_scan_finds_generating_cell() {
        let solver = HubbleSolver::default();
        let quad = QuadOptions::default();
        let sne = distance_modulus_dataset(&solver, &quad, &truth(), &[0.05, 0.2, 0.5, 0.9], 0.15, None).unwrap();
        let ctx = ChiSquareContext::new(
            solver,
            quad,
            None,
            Some(SneData { dataset: sne, inv_cov: None }),
            H0Measurement::default(),
        )
        .unwrap();
        let out = scan_grid(&ctx, ObservableSet::Sne, &scenario_axes(), &ScanOptions::default()).unwrap();
        assert_eq!(out.tensor.shape(), [2, 2, 2]);
        assert!(out.tensor.values().iter().all(|v| v.is_finite() && *v >= 0.0));
        assert_eq!(out.best.index, [1, 0, 0]);
        assert!(out.best.chi2 < 1e-12);
    }

    #[test]
    fn sentinel_policy_records_infinity_and_keeps_scanning() {
        let ctx = context_for(synthetic(5.0));
        let axes = ScanAxes {
            omega_dm: vec![0.2],
            omega_lambda: vec![-1e3, 0.5],
            log_tau: vec![500f64.ln()],
        };
        let opts = ScanOptions {
            on_failure: CellFailure::Sentinel,
            sequential: true,
        };
        let out = scan_grid(&ctx, ObservableSet::Ohd, &axes, &opts).unwrap();
        assert_eq!(out.failed_cells, 1);
        assert!(out.tensor.values()[0].is_infinite());
        assert_eq!(out.best.index, [0, 1, 0]);
    }

    #[test]
    fn missing_dataset_is_a_configuration_error() {
        let ctx = context_for(synthetic(5.0));
        let err = scan_grid(&ctx, ObservableSet::Sne, &scenario_axes(), &ScanOptions::default()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
