//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and installs logging
//! - parses CLI arguments
//! - runs the scan, marginalisation or simulation pipeline
//! - prints reports

use clap::Parser;
use clap::error::ErrorKind;
use tracing::info;

use crate::cli::{Cli, Command, MarginalizeArgs, ScanArgs, SimulateArgs};
use crate::domain::{DatasetFormat, Observable, ParamPoint, ScanConfig};
use crate::error::AppError;
use crate::fit::{build_axes, linspace, log_tau_axis};

pub mod pipeline;

/// Entry point for the `dmscan` binary.
pub fn run() -> Result<(), AppError> {
    // Environment defaults for data paths may live in `.env`.
    dotenvy::dotenv().ok();
    crate::telemetry::init_tracing();

    let argv = rewrite_args(std::env::args().collect());
    let cli = match Cli::try_parse_from(argv) {
        Ok(cli) => cli,
        Err(err) => return handle_parse_error(err),
    };

    match cli.command {
        Command::Scan(args) => handle_scan(args),
        Command::Marginalize(args) => handle_marginalize(args),
        Command::Simulate(args) => handle_simulate(args),
    }
}

/// Usage problems (including `-h`) exit with status 2; `--version` succeeds.
fn handle_parse_error(err: clap::Error) -> Result<(), AppError> {
    let _ = err.print();
    match err.kind() {
        ErrorKind::DisplayVersion => Ok(()),
        _ => Err(AppError::new(2, "")),
    }
}

fn handle_scan(args: ScanArgs) -> Result<(), AppError> {
    let config = scan_config_from_args(&args)?;
    let run = pipeline::run_scan(&config)?;

    println!(
        "{}",
        crate::report::format_scan_summary(&run.summary, &run.context, &run.tensor_path, &run.summary_path)
    );
    if args.top > 0 {
        let cells = crate::report::rank_cells(&run.output.tensor, &config.axes, args.top);
        println!("{}", crate::report::format_ranked_cells(&cells));
    }
    Ok(())
}

fn handle_marginalize(args: MarginalizeArgs) -> Result<(), AppError> {
    let (marginal, csv_path) = pipeline::run_marginalize(&args.summary, args.axis, args.output.as_deref())?;
    print!("{}", crate::report::format_marginal_summary(&marginal, &csv_path));
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let truth = ParamPoint {
        omega_dm: args.omega_dm,
        omega_lambda: args.omega_lambda,
        tau: args.tau,
    };
    let redshifts = linspace(args.z_min, args.z_max, args.points)?;
    let dataset = pipeline::run_simulate(&truth, &redshifts, args.sigma, args.seed, &args.output)?;
    info!(points = dataset.len(), file = %args.output.display(), "synthetic dataset written");
    println!("Wrote {} points to {}", dataset.len(), args.output.display());
    Ok(())
}

pub fn scan_config_from_args(args: &ScanArgs) -> Result<ScanConfig, AppError> {
    let axes = build_axes(
        linspace(args.dm_min, args.dm_max, args.dm_steps)?,
        linspace(args.lambda_min, args.lambda_max, args.lambda_steps)?,
        log_tau_axis(args.tau_min, args.tau_max, args.tau_steps)?,
    )?;

    let set = args.observables;
    let needs = |o: Observable| set.contains(o);
    let sne_needed = needs(Observable::Sne);

    Ok(ScanConfig {
        observables: set,
        axes,
        ohd_path: needs(Observable::Ohd).then(|| args.ohd.clone()),
        ohd_format: DatasetFormat {
            skip_rows: args.ohd_skip_rows,
            first_column: args.ohd_column,
            delimiter: args.delimiter,
        },
        sne_path: sne_needed.then(|| args.sne.clone()),
        sne_format: DatasetFormat {
            skip_rows: args.sne_skip_rows,
            first_column: args.sne_column,
            delimiter: args.delimiter,
        },
        sne_cov_path: (sne_needed && !args.no_sne_cov).then(|| args.sne_cov.clone()),
        h0_value: args.h0,
        h0_sigma: args.h0_sigma,
        output_dir: args.output_dir.clone(),
        on_failure: args.on_failure,
        sequential: args.sequential,
    })
}

/// Rewrite argv so a bare selector means `scan`.
///
/// Rules:
/// - `dmscan 3 ...`              -> `dmscan scan 3 ...`
/// - `dmscan --ohd f.txt 0`      -> `dmscan scan --ohd f.txt 0`
/// - `dmscan`                    -> unchanged (clap prints usage, exit 2)
/// - `dmscan --help/--version`   -> unchanged
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        return argv;
    };

    let is_top_level_help_or_version = matches!(arg1.as_str(), "-h" | "--help" | "-V" | "--version" | "help");
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(arg1.as_str(), "scan" | "marginalize" | "simulate");
    if is_subcommand {
        return argv;
    }

    argv.insert(1, "scan".to_string());
    argv
}
