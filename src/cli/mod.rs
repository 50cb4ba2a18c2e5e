//! Command-line parsing for the decaying dark matter grid scanner.
//!
//! Argument parsing and command dispatch stay separate from the numerics; this
//! module only describes flags.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::{CellFailure, Delimiter, ObservableSet};
use crate::io::tensor::MarginalAxis;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "dmscan",
    version,
    about = "Chi-square grid scan for decaying dark matter cosmologies"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan the (omega_dm, omega_lambda, tau) grid and write the chi-square tensor.
    ///
    /// OBS selects the observables: 0=ohd, 1=ohd+H0, 2=sne, 3=sne+ohd,
    /// 4=sne+ohd+H0, 5=sne+ohd+H0+Om (index or name, any case).
    Scan(ScanArgs),
    /// Marginalise a finished scan over one axis and export the 2-D grid as CSV.
    Marginalize(MarginalizeArgs),
    /// Write a synthetic OHD dataset generated from the model.
    Simulate(SimulateArgs),
}

/// Options for a grid scan.
#[derive(Debug, Parser, Clone)]
pub struct ScanArgs {
    /// Observable set (0..5 or a name such as `sne+ohd`).
    #[arg(value_name = "OBS", value_parser = parse_observable_set)]
    pub observables: ObservableSet,

    /// OHD table (`z H sigma`).
    #[arg(long, env = "DMSCAN_OHD", default_value = "ohd.txt")]
    pub ohd: PathBuf,

    /// Header rows to skip in the OHD table.
    #[arg(long, default_value_t = 0)]
    pub ohd_skip_rows: usize,

    /// Zero-based column holding z in the OHD table.
    #[arg(long, default_value_t = 0)]
    pub ohd_column: usize,

    /// Supernova table (`name z mu sigma ...`).
    #[arg(long, env = "DMSCAN_SNE", default_value = "SCPUnion2.1_mu_vs_z.txt")]
    pub sne: PathBuf,

    /// Header rows to skip in the supernova table.
    #[arg(long, default_value_t = 5)]
    pub sne_skip_rows: usize,

    /// Zero-based column holding z in the supernova table.
    #[arg(long, default_value_t = 1)]
    pub sne_column: usize,

    /// Supernova covariance matrix, in the supernova table's row order.
    #[arg(long, env = "DMSCAN_SNE_COV", default_value = "SCPUnion2.1_covmat_sys.txt")]
    pub sne_cov: PathBuf,

    /// Ignore the covariance and use per-point sigma only.
    #[arg(long)]
    pub no_sne_cov: bool,

    /// Column separator in all data files.
    #[arg(long, value_enum, default_value_t = Delimiter::Whitespace)]
    pub delimiter: Delimiter,

    /// Minimum omega_dm (at the initial redshift).
    #[arg(long, default_value_t = 0.1)]
    pub dm_min: f64,

    /// Maximum omega_dm.
    #[arg(long, default_value_t = 0.5)]
    pub dm_max: f64,

    /// omega_dm grid steps.
    #[arg(long, default_value_t = 9)]
    pub dm_steps: usize,

    /// Minimum omega_lambda.
    #[arg(long, default_value_t = 0.5)]
    pub lambda_min: f64,

    /// Maximum omega_lambda.
    #[arg(long, default_value_t = 0.9)]
    pub lambda_max: f64,

    /// omega_lambda grid steps.
    #[arg(long, default_value_t = 9)]
    pub lambda_steps: usize,

    /// Minimum decay timescale (units of 1/H_100).
    #[arg(long, default_value_t = 10.0)]
    pub tau_min: f64,

    /// Maximum decay timescale.
    #[arg(long, default_value_t = 1.0e4)]
    pub tau_max: f64,

    /// tau grid steps (log spaced).
    #[arg(long, default_value_t = 10)]
    pub tau_steps: usize,

    /// Local H0 measurement (km/s/Mpc).
    #[arg(long, default_value_t = 73.8)]
    pub h0: f64,

    /// Uncertainty of the local H0 measurement.
    #[arg(long, default_value_t = 2.4)]
    pub h0_sigma: f64,

    /// Directory for the tensor and its JSON summary.
    #[arg(long, env = "DMSCAN_OUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// What to do when a grid cell cannot be evaluated.
    #[arg(long, value_enum, default_value_t = CellFailure::Abort)]
    pub on_failure: CellFailure,

    /// Evaluate cells on a single thread.
    #[arg(long)]
    pub sequential: bool,

    /// Show the N lowest cells.
    #[arg(long, default_value_t = 5)]
    pub top: usize,
}

/// Options for marginalising a finished scan.
#[derive(Debug, Parser, Clone)]
pub struct MarginalizeArgs {
    /// JSON summary written next to the tensor by `dmscan scan`.
    #[arg(long, value_name = "JSON")]
    pub summary: PathBuf,

    /// Axis to sum out.
    #[arg(long, value_enum, default_value_t = MarginalAxis::Tau)]
    pub axis: MarginalAxis,

    /// Output CSV (defaults to `<stem>-marg-<axis>.csv` next to the summary).
    #[arg(long)]
    pub output: Option<PathBuf>,
}

/// Options for generating a synthetic OHD table.
#[derive(Debug, Parser, Clone)]
pub struct SimulateArgs {
    /// omega_dm at the initial redshift.
    #[arg(long, default_value_t = 0.3)]
    pub omega_dm: f64,

    #[arg(long, default_value_t = 0.7)]
    pub omega_lambda: f64,

    /// Decay timescale (units of 1/H_100).
    #[arg(long, default_value_t = 1000.0)]
    pub tau: f64,

    #[arg(long, default_value_t = 0.05)]
    pub z_min: f64,

    #[arg(long, default_value_t = 2.0)]
    pub z_max: f64,

    /// Number of redshifts (evenly spaced).
    #[arg(long, default_value_t = 20)]
    pub points: usize,

    /// Uncertainty assigned to every point (km/s/Mpc).
    #[arg(long, default_value_t = 5.0)]
    pub sigma: f64,

    /// Add Gaussian noise drawn with this seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Output file.
    #[arg(long, short = 'o', default_value = "ohd-synthetic.txt")]
    pub output: PathBuf,
}

fn parse_observable_set(raw: &str) -> Result<ObservableSet, String> {
    raw.parse()
}
