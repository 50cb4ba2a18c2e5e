//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during the scan
//! - exported to JSON alongside the binary tensor
//! - reloaded later for marginalisation

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// One point in parameter space.
///
/// `omega_dm` is the dark matter density at the initial redshift, not today.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamPoint {
    pub omega_dm: f64,
    pub omega_lambda: f64,
    pub tau: f64,
}

/// A single measurement `(z, value, σ)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub z: f64,
    pub value: f64,
    pub sigma: f64,
}

/// An observational dataset sorted ascending by redshift.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub name: String,
    pub points: Vec<Observation>,
}

impl Dataset {
    /// Build a dataset, sorting by redshift (stable for equal `z`).
    pub fn new(name: impl Into<String>, mut points: Vec<Observation>) -> Self {
        points.sort_by(|a, b| a.z.total_cmp(&b.z));
        Self {
            name: name.into(),
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn redshifts(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.z).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn sigmas(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.sigma).collect()
    }
}

/// A single chi-square term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Observable {
    /// Cosmic chronometer `H(z)` data.
    Ohd,
    /// Supernova distance moduli (covariance form when available).
    Sne,
    /// Local `H0` measurement.
    H0,
    /// Dark matter density prior. Contributes zero; reserved so selector sets
    /// that name it stay stable once a real prior exists.
    DensityPrior,
}

impl Observable {
    pub fn display_name(self) -> &'static str {
        match self {
            Observable::Ohd => "OHD",
            Observable::Sne => "SNe",
            Observable::H0 => "H0",
            Observable::DensityPrior => "Om prior",
        }
    }
}

/// Which observables are summed into the combined chi-square.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObservableSet {
    #[serde(rename = "ohd")]
    Ohd,
    #[serde(rename = "ohd+H0", alias = "ohd+h0")]
    OhdH0,
    #[serde(rename = "sne")]
    Sne,
    #[serde(rename = "sne+ohd")]
    SneOhd,
    #[serde(rename = "sne+ohd+H0", alias = "sne+ohd+h0")]
    SneOhdH0,
    #[serde(rename = "sne+ohd+H0+Om", alias = "sne+ohd+h0+om")]
    SneOhdH0Om,
}

impl ObservableSet {
    /// All sets, in selector-index order.
    pub const ALL: [ObservableSet; 6] = [
        ObservableSet::Ohd,
        ObservableSet::OhdH0,
        ObservableSet::Sne,
        ObservableSet::SneOhd,
        ObservableSet::SneOhdH0,
        ObservableSet::SneOhdH0Om,
    ];

    /// Observables summed for this set; each appears at most once.
    pub fn members(self) -> &'static [Observable] {
        match self {
            ObservableSet::Ohd => &[Observable::Ohd],
            ObservableSet::OhdH0 => &[Observable::Ohd, Observable::H0],
            ObservableSet::Sne => &[Observable::Sne],
            ObservableSet::SneOhd => &[Observable::Sne, Observable::Ohd],
            ObservableSet::SneOhdH0 => &[Observable::Sne, Observable::Ohd, Observable::H0],
            ObservableSet::SneOhdH0Om => &[
                Observable::Sne,
                Observable::Ohd,
                Observable::H0,
                Observable::DensityPrior,
            ],
        }
    }

    pub fn contains(self, observable: Observable) -> bool {
        self.members().contains(&observable)
    }

    /// Selector index used on the command line.
    pub fn index(self) -> usize {
        match self {
            ObservableSet::Ohd => 0,
            ObservableSet::OhdH0 => 1,
            ObservableSet::Sne => 2,
            ObservableSet::SneOhd => 3,
            ObservableSet::SneOhdH0 => 4,
            ObservableSet::SneOhdH0Om => 5,
        }
    }

    /// Token used on the command line and in output file names.
    pub fn token(self) -> &'static str {
        match self {
            ObservableSet::Ohd => "ohd",
            ObservableSet::OhdH0 => "ohd+H0",
            ObservableSet::Sne => "sne",
            ObservableSet::SneOhd => "sne+ohd",
            ObservableSet::SneOhdH0 => "sne+ohd+H0",
            ObservableSet::SneOhdH0Om => "sne+ohd+H0+Om",
        }
    }
}

impl fmt::Display for ObservableSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for ObservableSet {
    type Err = String;

    /// Accepts a selector index (`0`..`5`) or a token such as `sne+ohd`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        if let Ok(idx) = raw.parse::<usize>() {
            return ObservableSet::ALL
                .get(idx)
                .copied()
                .ok_or_else(|| unknown_selector(raw));
        }
        ObservableSet::ALL
            .iter()
            .copied()
            .find(|set| set.token().eq_ignore_ascii_case(raw))
            .ok_or_else(|| unknown_selector(raw))
    }
}

fn unknown_selector(raw: &str) -> String {
    let options: Vec<String> = ObservableSet::ALL
        .iter()
        .map(|s| format!("{} = {}", s.index(), s.token()))
        .collect();
    format!(
        "No such observation probe '{raw}'. Choose one of: {}",
        options.join(", ")
    )
}

/// What the scan does when a single grid cell fails to evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CellFailure {
    /// Stop the whole scan on the first failing cell (nothing is written).
    Abort,
    /// Record `+inf` for the cell, log it, and keep going.
    Sentinel,
}

/// Column separator in observational data files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Delimiter {
    /// Runs of spaces (and tabs within space-padded files).
    Whitespace,
    Tab,
    Comma,
}

/// Layout of a whitespace/tab/comma separated data file.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetFormat {
    /// Leading records to skip (header lines that are not `#` comments).
    pub skip_rows: usize,
    /// Column holding `z`; value and `σ` follow in the next two columns.
    pub first_column: usize,
    pub delimiter: Delimiter,
}

impl DatasetFormat {
    /// `z H σ` per line.
    pub fn ohd() -> Self {
        Self {
            skip_rows: 0,
            first_column: 0,
            delimiter: Delimiter::Whitespace,
        }
    }

    /// Union2.1 `name z μ σ p` with a five-line header.
    pub fn union21() -> Self {
        Self {
            skip_rows: 5,
            first_column: 1,
            delimiter: Delimiter::Whitespace,
        }
    }
}

/// Parameter axes of the grid scan.
///
/// The timescale axis stores `ln τ`; cells receive `τ = exp(ln τ)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanAxes {
    pub omega_dm: Vec<f64>,
    pub omega_lambda: Vec<f64>,
    pub log_tau: Vec<f64>,
}

impl ScanAxes {
    pub fn shape(&self) -> [usize; 3] {
        [self.omega_dm.len(), self.omega_lambda.len(), self.log_tau.len()]
    }

    pub fn cell_count(&self) -> usize {
        self.omega_dm.len() * self.omega_lambda.len() * self.log_tau.len()
    }

    /// Parameter triple for grid indices `(i, j, k)`.
    pub fn point(&self, i: usize, j: usize, k: usize) -> ParamPoint {
        ParamPoint {
            omega_dm: self.omega_dm[i],
            omega_lambda: self.omega_lambda[j],
            tau: self.log_tau[k].exp(),
        }
    }
}

/// Chi-square values over the scan grid, row-major in `(dm, Λ, ln τ)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChiSquareTensor {
    shape: [usize; 3],
    values: Vec<f64>,
}

impl ChiSquareTensor {
    /// Wrap a flat row-major buffer; `None` if the length does not match the shape.
    pub fn from_flat(shape: [usize; 3], values: Vec<f64>) -> Option<Self> {
        if shape[0] * shape[1] * shape[2] != values.len() {
            return None;
        }
        Some(Self { shape, values })
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn flat_index(&self, i: usize, j: usize, k: usize) -> usize {
        (i * self.shape[1] + j) * self.shape[2] + k
    }

    pub fn unravel(&self, flat: usize) -> [usize; 3] {
        let k = flat % self.shape[2];
        let j = (flat / self.shape[2]) % self.shape[1];
        let i = flat / (self.shape[1] * self.shape[2]);
        [i, j, k]
    }

    pub fn get(&self, i: usize, j: usize, k: usize) -> f64 {
        self.values[self.flat_index(i, j, k)]
    }

    /// Smallest cell; ties go to the lowest flat index. Non-finite cells never win.
    pub fn argmin(&self) -> Option<(usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, &v) in self.values.iter().enumerate() {
            if !v.is_finite() {
                continue;
            }
            match best {
                Some((_, b)) if v >= b => {}
                _ => best = Some((idx, v)),
            }
        }
        best
    }
}

/// The winning grid cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestFit {
    pub index: [usize; 3],
    pub omega_dm: f64,
    pub omega_lambda: f64,
    pub log_tau: f64,
    pub tau: f64,
    pub chi2: f64,
}

/// JSON sidecar written next to the binary tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub tool: String,
    pub generated_at: String,
    pub observables: ObservableSet,
    pub members: Vec<Observable>,
    pub sne_covariance: bool,
    pub shape: [usize; 3],
    pub axes: ScanAxes,
    pub best: BestFit,
    pub failed_cells: usize,
    pub tensor_file: String,
    /// Byte order of the tensor file.
    pub byte_order: String,
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus environment defaults).
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub observables: ObservableSet,
    pub axes: ScanAxes,

    pub ohd_path: Option<PathBuf>,
    pub ohd_format: DatasetFormat,
    pub sne_path: Option<PathBuf>,
    pub sne_format: DatasetFormat,
    pub sne_cov_path: Option<PathBuf>,

    pub h0_value: f64,
    pub h0_sigma: f64,

    pub output_dir: PathBuf,
    pub on_failure: CellFailure,
    pub sequential: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_parses_indices_and_tokens() {
        assert_eq!("0".parse::<ObservableSet>().unwrap(), ObservableSet::Ohd);
        assert_eq!("5".parse::<ObservableSet>().unwrap(), ObservableSet::SneOhdH0Om);
        assert_eq!("SNE+OHD".parse::<ObservableSet>().unwrap(), ObservableSet::SneOhd);
        assert_eq!("ohd+h0".parse::<ObservableSet>().unwrap(), ObservableSet::OhdH0);
        assert_eq!("sne+ohd+H0+Om".parse::<ObservableSet>().unwrap(), ObservableSet::SneOhdH0Om);
        assert!("6".parse::<ObservableSet>().is_err());
        assert!("cmb".parse::<ObservableSet>().is_err());
    }

    #[test]
    fn selector_index_and_token_round_trip() {
        for set in ObservableSet::ALL {
            assert_eq!(set.index().to_string().parse::<ObservableSet>().unwrap(), set);
            assert_eq!(set.token().parse::<ObservableSet>().unwrap(), set);
        }
    }

    #[test]
    fn summary_names_accept_lowercase_spelling() {
        let set: ObservableSet = serde_json::from_str("\"sne+ohd+h0+om\"").unwrap();
        assert_eq!(set, ObservableSet::SneOhdH0Om);
        assert_eq!(serde_json::to_string(&set).unwrap(), "\"sne+ohd+H0+Om\"");
    }

    #[test]
    fn members_are_unique() {
        for set in ObservableSet::ALL {
            let m = set.members();
            for (i, a) in m.iter().enumerate() {
                assert!(!m[i + 1..].contains(a), "{set} repeats {a:?}");
            }
        }
    }

    #[test]
    fn dataset_is_sorted_by_redshift() {
        let ds = Dataset::new(
            "t",
            vec![
                Observation { z: 1.0, value: 1.0, sigma: 1.0 },
                Observation { z: 0.1, value: 2.0, sigma: 1.0 },
            ],
        );
        assert_eq!(ds.redshifts(), vec![0.1, 1.0]);
    }

    #[test]
    fn tensor_layout_is_row_major() {
        let t = ChiSquareTensor::from_flat([2, 3, 4], (0..24).map(|v| v as f64).collect()).unwrap();
        assert_eq!(t.flat_index(1, 2, 3), 23);
        assert_eq!(t.get(1, 0, 2), 14.0);
        assert_eq!(t.unravel(14), [1, 0, 2]);
        assert!(ChiSquareTensor::from_flat([2, 2, 2], vec![0.0; 7]).is_none());
    }

    #[test]
    fn argmin_prefers_first_of_ties_and_skips_infinite() {
        let t = ChiSquareTensor::from_flat([1, 1, 4], vec![f64::INFINITY, 2.0, 1.0, 1.0]).unwrap();
        assert_eq!(t.argmin(), Some((2, 1.0)));
        let all_bad = ChiSquareTensor::from_flat([1, 1, 2], vec![f64::INFINITY, f64::NAN]).unwrap();
        assert_eq!(all_bad.argmin(), None);
    }
}
