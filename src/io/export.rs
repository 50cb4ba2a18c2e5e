//! Scan outputs.
//!
//! - the chi-square tensor as raw little-endian `f64`, row-major `(dm, Λ, τ)`
//! - a JSON summary next to it (axes, best fit, counts)
//! - OHD-format text files for synthetic datasets

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::domain::{ChiSquareTensor, Dataset, ObservableSet, ScanAxes, ScanSummary};
use crate::error::AppError;
use crate::fit::ScanOutput;

/// `chi2file-<token>-<n_dm>-<n_Λ>-<n_τ>`, without extension.
pub fn tensor_file_stem(set: ObservableSet, shape: [usize; 3]) -> String {
    format!("chi2file-{}-{}-{}-{}", set.token(), shape[0], shape[1], shape[2])
}

/// Paths of the tensor (`.bin`) and summary (`.json`) inside `dir`.
pub fn output_paths(dir: &Path, set: ObservableSet, shape: [usize; 3]) -> (PathBuf, PathBuf) {
    let stem = tensor_file_stem(set, shape);
    (dir.join(format!("{stem}.bin")), dir.join(format!("{stem}.json")))
}

/// Create `dir` (and parents) if missing.
pub fn ensure_output_dir(dir: &Path) -> Result<(), AppError> {
    fs::create_dir_all(dir)
        .map_err(|e| AppError::new(2, format!("Failed to create output directory '{}': {e}", dir.display())))
}

/// Write the tensor as a flat sequence of little-endian `f64`.
pub fn write_tensor(path: &Path, tensor: &ChiSquareTensor) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create tensor file '{}': {e}", path.display())))?;
    let mut out = BufWriter::new(file);
    for v in tensor.values() {
        out.write_all(&v.to_le_bytes())
            .map_err(|e| AppError::new(2, format!("Failed to write tensor file: {e}")))?;
    }
    out.flush()
        .map_err(|e| AppError::new(2, format!("Failed to write tensor file: {e}")))?;
    Ok(())
}

/// Assemble the JSON summary for a finished scan.
pub fn build_summary(
    set: ObservableSet,
    axes: &ScanAxes,
    output: &ScanOutput,
    sne_covariance: bool,
    tensor_file: &Path,
) -> ScanSummary {
    ScanSummary {
        tool: "dmscan".to_string(),
        generated_at: Utc::now().to_rfc3339(),
        observables: set,
        members: set.members().to_vec(),
        sne_covariance,
        shape: output.tensor.shape(),
        axes: axes.clone(),
        best: output.best.clone(),
        failed_cells: output.failed_cells,
        tensor_file: tensor_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        byte_order: "little-endian".to_string(),
    }
}

pub fn write_summary_json(path: &Path, summary: &ScanSummary) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create summary JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, summary)
        .map_err(|e| AppError::new(2, format!("Failed to write summary JSON: {e}")))?;
    Ok(())
}

/// Write a dataset as `z value σ` lines, readable with the OHD layout.
pub fn write_dataset_text(path: &Path, dataset: &Dataset) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create data file '{}': {e}", path.display())))?;
    let mut out = BufWriter::new(file);

    writeln!(out, "# {} ({} points): z value sigma", dataset.name, dataset.len())
        .map_err(|e| AppError::new(2, format!("Failed to write data file header: {e}")))?;
    for p in &dataset.points {
        writeln!(out, "{:.6} {:.10} {:.10}", p.z, p.value, p.sigma)
            .map_err(|e| AppError::new(2, format!("Failed to write data file row: {e}")))?;
    }
    out.flush()
        .map_err(|e| AppError::new(2, format!("Failed to write data file: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DatasetFormat, Observation};
    use crate::io::ingest::load_ohd;

    #[test]
    fn file_names_follow_selector_and_shape() {
        assert_eq!(tensor_file_stem(ObservableSet::SneOhdH0, [9, 8, 10]), "chi2file-sne+ohd+H0-9-8-10");
        let (bin, json) = output_paths(Path::new("out"), ObservableSet::Ohd, [2, 2, 2]);
        assert_eq!(bin, Path::new("out/chi2file-ohd-2-2-2.bin"));
        assert_eq!(json, Path::new("out/chi2file-ohd-2-2-2.json"));
    }

    #[test]
    fn file_names_keep_mixed_case_selector_names() {
        assert_eq!(tensor_file_stem(ObservableSet::OhdH0, [9, 9, 10]), "chi2file-ohd+H0-9-9-10");
        assert_eq!(
            tensor_file_stem(ObservableSet::SneOhdH0Om, [9, 9, 10]),
            "chi2file-sne+ohd+H0+Om-9-9-10"
        );
    }

    #[test]
    fn tensor_bytes_are_little_endian_row_major() {
        let tensor = ChiSquareTensor::from_flat([1, 2, 2], vec![1.0, 2.5, -0.0, f64::INFINITY]).unwrap();
        let path = std::env::temp_dir().join(format!("dmscan-export-{}.bin", std::process::id()));
        write_tensor(&path, &tensor).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[8..16], &2.5f64.to_le_bytes());
        assert_eq!(&bytes[24..32], &f64::INFINITY.to_le_bytes());
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn dataset_text_reads_back_as_ohd() {
        let ds = Dataset::new(
            "synthetic-ohd",
            vec![
                Observation {
                    z: 0.1,
                    value: 70.25,
                    sigma: 3.0,
                },
                Observation {
                    z: 1.2,
                    value: 130.5,
                    sigma: 9.5,
                },
            ],
        );
        let path = std::env::temp_dir().join(format!("dmscan-export-{}.txt", std::process::id()));
        write_dataset_text(&path, &ds).unwrap();
        let back = load_ohd(&path, &DatasetFormat::ohd()).unwrap();
        assert_eq!(back.values(), ds.values());
        assert_eq!(back.redshifts(), ds.redshifts());
        std::fs::remove_file(path).ok();
    }
}
