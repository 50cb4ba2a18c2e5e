//! Shared pipeline logic behind the CLI subcommands.
//!
//! Keeping the workflow here keeps `app.rs` about presentation:
//! load datasets -> build chi-square context -> grid scan -> tensor + summary

use std::path::{Path, PathBuf};

use crate::chi2::{ChiSquareContext, H0Measurement};
use crate::domain::{Dataset, ParamPoint, ScanConfig, ScanSummary};
use crate::error::AppError;
use crate::fit::{ScanOptions, ScanOutput, scan_grid};
use crate::io::tensor::{Marginal2d, MarginalAxis};
use crate::math::QuadOptions;
use crate::solver::HubbleSolver;

/// All outputs of a single `dmscan scan` run.
#[derive(Debug, Clone)]
pub struct ScanRun {
    pub context: ChiSquareContext,
    pub output: ScanOutput,
    pub summary: ScanSummary,
    pub tensor_path: PathBuf,
    pub summary_path: PathBuf,
}

/// Load the datasets named in `config` and validate them into a context.
pub fn build_context(config: &ScanConfig) -> Result<ChiSquareContext, AppError> {
    let ohd = config
        .ohd_path
        .as_deref()
        .map(|path| crate::io::ingest::load_ohd(path, &config.ohd_format))
        .transpose()?;
    let sne = config
        .sne_path
        .as_deref()
        .map(|path| crate::io::ingest::load_sne(path, &config.sne_format, config.sne_cov_path.as_deref()))
        .transpose()?;

    let h0 = H0Measurement {
        value: config.h0_value,
        sigma: config.h0_sigma,
    };
    let ctx = ChiSquareContext::new(HubbleSolver::default(), QuadOptions::default(), ohd, sne, h0)
        .map_err(|e| AppError::new(2, format!("Invalid input data: {e}")))?;
    ctx.ensure_supports(config.observables)
        .map_err(|e| AppError::new(2, format!("Cannot scan '{}': {e}", config.observables)))?;
    Ok(ctx)
}

/// Execute the full scan pipeline, writing the tensor and its summary.
pub fn run_scan(config: &ScanConfig) -> Result<ScanRun, AppError> {
    let ctx = build_context(config)?;
    run_scan_with_context(config, ctx)
}

/// Execute the scan with a pre-built context.
///
/// Nothing is written unless every cell was handled under the failure policy.
pub fn run_scan_with_context(config: &ScanConfig, ctx: ChiSquareContext) -> Result<ScanRun, AppError> {
    let opts = ScanOptions {
        on_failure: config.on_failure,
        sequential: config.sequential,
    };
    let output = scan_grid(&ctx, config.observables, &config.axes, &opts)?;

    crate::io::export::ensure_output_dir(&config.output_dir)?;
    let (tensor_path, summary_path) =
        crate::io::export::output_paths(&config.output_dir, config.observables, output.tensor.shape());
    crate::io::export::write_tensor(&tensor_path, &output.tensor)?;

    let summary = crate::io::export::build_summary(
        config.observables,
        &config.axes,
        &output,
        ctx.has_sne_covariance(),
        &tensor_path,
    );
    crate::io::export::write_summary_json(&summary_path, &summary)?;

    Ok(ScanRun {
        context: ctx,
        output,
        summary,
        tensor_path,
        summary_path,
    })
}

/// Read a finished scan, marginalise it and write the CSV grid.
pub fn run_marginalize(
    summary_path: &Path,
    axis: MarginalAxis,
    output: Option<&Path>,
) -> Result<(Marginal2d, PathBuf), AppError> {
    let summary = crate::io::tensor::read_summary_json(summary_path)?;
    let tensor_path = summary_path.with_file_name(&summary.tensor_file);
    let tensor = crate::io::tensor::read_tensor(&tensor_path, summary.shape)?;
    let marginal = crate::io::tensor::marginalize(&tensor, &summary.axes, axis)?;

    let csv_path = match output {
        Some(p) => p.to_path_buf(),
        None => default_marginal_path(summary_path, axis),
    };
    crate::io::tensor::write_marginal_csv(&csv_path, &marginal)?;
    Ok((marginal, csv_path))
}

/// Generate a synthetic OHD table and write it to `output`.
pub fn run_simulate(
    truth: &ParamPoint,
    redshifts: &[f64],
    sigma: f64,
    seed: Option<u64>,
    output: &Path,
) -> Result<Dataset, AppError> {
    let dataset = crate::data::synthetic::hubble_dataset(&HubbleSolver::default(), truth, redshifts, sigma, seed)?;
    crate::io::export::write_dataset_text(output, &dataset)?;
    Ok(dataset)
}

/// `<summary stem>-marg-<axis>.csv` next to the summary.
fn default_marginal_path(summary: &Path, axis: MarginalAxis) -> PathBuf {
    let stem = summary
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "chi2file".to_string());
    let axis = match axis {
        MarginalAxis::Tau => "tau",
        MarginalAxis::Lambda => "lambda",
    };
    summary.with_file_name(format!("{stem}-marg-{axis}.csv"))
}
