//! Observational data ingest.
//!
//! Turns the plain-text tables used by the cosmology community into clean
//! [`Dataset`]s:
//!
//! - OHD files: `z H σ` per line
//! - supernova files: `name z μ σ …` per line, usually after a fixed header
//! - supernova covariance: a square matrix, one row per line, in file order
//!
//! Lines starting with `#` are comments. Bad rows are skipped and reported,
//! except when a covariance matrix is attached: then every row must parse or the
//! matrix would no longer line up with the data.
//!
//! Datasets are sorted ascending by redshift. The covariance is permuted with
//! the same permutation so that entry `(a, b)` still belongs to rows `a` and `b`.

use std::fs::File;
use std::path::Path;

use csv::StringRecord;
use nalgebra::DMatrix;
use tracing::{info, warn};

use crate::chi2::{SneData, invert_covariance};
use crate::domain::{Dataset, DatasetFormat, Delimiter, Observation};
use crate::error::AppError;

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Ingest output: sorted dataset plus bookkeeping.
#[derive(Debug, Clone)]
pub struct IngestedData {
    pub dataset: Dataset,
    /// `order[a]` is the position of sorted row `a` among the valid rows, in
    /// file order. It equals the file row index only when nothing was skipped.
    pub order: Vec<usize>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Load a `(z, value, σ)` table.
pub fn load_dataset(path: &Path, name: &str, format: &DatasetFormat) -> Result<IngestedData, AppError> {
    let records = read_records(path, format)?;

    let mut rows: Vec<(usize, Observation)> = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (line, fields) in records {
        rows_read += 1;
        match parse_observation(&fields, format.first_column) {
            Ok(obs) => rows.push((rows.len(), obs)),
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    for e in &row_errors {
        warn!(file = %path.display(), line = e.line, "skipping row: {}", e.message);
    }

    if rows.is_empty() {
        return Err(AppError::new(
            3,
            format!("No valid rows in '{}' ({rows_read} read).", path.display()),
        ));
    }

    rows.sort_by(|a, b| a.1.z.total_cmp(&b.1.z));
    let order: Vec<usize> = rows.iter().map(|(idx, _)| *idx).collect();
    let dataset = Dataset::new(name, rows.into_iter().map(|(_, obs)| obs).collect());

    info!(
        dataset = name,
        file = %path.display(),
        rows_read,
        rows_used = dataset.len(),
        skipped = row_errors.len(),
        "loaded dataset"
    );

    Ok(IngestedData {
        dataset,
        order,
        row_errors,
        rows_read,
    })
}

/// Load an OHD table.
pub fn load_ohd(path: &Path, format: &DatasetFormat) -> Result<Dataset, AppError> {
    Ok(load_dataset(path, "ohd", format)?.dataset)
}

/// Load supernova data and, if given, its covariance matrix.
///
/// The covariance is read in file order, permuted to the sorted order and
/// inverted. A singular covariance is rejected here, before any grid cell runs.
pub fn load_sne(path: &Path, format: &DatasetFormat, cov_path: Option<&Path>) -> Result<SneData, AppError> {
    let ingested = load_dataset(path, "sne", format)?;

    let Some(cov_path) = cov_path else {
        return Ok(SneData {
            dataset: ingested.dataset,
            inv_cov: None,
        });
    };

    if let Some(first) = ingested.row_errors.first() {
        return Err(AppError::new(
            2,
            format!(
                "'{}' has {} unreadable row(s) (first at line {}: {}); the covariance matrix cannot be aligned.",
                path.display(),
                ingested.row_errors.len(),
                first.line,
                first.message
            ),
        ));
    }

    let n = ingested.dataset.len();
    let cov = load_covariance(cov_path, n, format.delimiter)?;
    let cov = permute_covariance(&cov, &ingested.order);
    let inv_cov = invert_covariance(cov).ok_or_else(|| {
        AppError::new(
            2,
            format!(
                "Covariance matrix '{}' is singular or not finite.",
                cov_path.display()
            ),
        )
    })?;
    info!(file = %cov_path.display(), n, "loaded supernova covariance");

    Ok(SneData {
        dataset: ingested.dataset,
        inv_cov: Some(inv_cov),
    })
}

/// Read an `n × n` matrix, one row per non-comment line.
pub fn load_covariance(path: &Path, n: usize, delimiter: Delimiter) -> Result<DMatrix<f64>, AppError> {
    let format = DatasetFormat {
        skip_rows: 0,
        first_column: 0,
        delimiter,
    };
    let records = read_records(path, &format)?;
    if records.len() != n {
        return Err(AppError::new(
            2,
            format!(
                "Covariance '{}' has {} rows, expected {n}.",
                path.display(),
                records.len()
            ),
        ));
    }

    let mut values = Vec::with_capacity(n * n);
    for (line, fields) in &records {
        if fields.len() != n {
            return Err(AppError::new(
                2,
                format!(
                    "Covariance '{}' line {line}: {} columns, expected {n}.",
                    path.display(),
                    fields.len()
                ),
            ));
        }
        for field in fields {
            let v = parse_f64(field).ok_or_else(|| {
                AppError::new(
                    2,
                    format!("Covariance '{}' line {line}: invalid number '{field}'.", path.display()),
                )
            })?;
            values.push(v);
        }
    }
    Ok(DMatrix::from_row_slice(n, n, &values))
}

/// `C'[a][b] = C[order[a]][order[b]]`.
pub fn permute_covariance(cov: &DMatrix<f64>, order: &[usize]) -> DMatrix<f64> {
    let n = order.len();
    DMatrix::from_fn(n, n, |a, b| cov[(order[a], order[b])])
}

/// Non-comment records after the skipped header, as `(line, fields)`.
fn read_records(path: &Path, format: &DatasetFormat) -> Result<Vec<(usize, Vec<String>)>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open data file '{}': {e}", path.display())))?;

    let delimiter = match format.delimiter {
        Delimiter::Whitespace => b' ',
        Delimiter::Tab => b'\t',
        Delimiter::Comma => b',',
    };
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut out = Vec::new();
    let mut record = StringRecord::new();
    let mut seen = 0usize;
    loop {
        let more = reader.read_record(&mut record).map_err(|e| {
            AppError::new(2, format!("Failed to read '{}': {e}", path.display()))
        })?;
        if !more {
            break;
        }
        seen += 1;
        if seen <= format.skip_rows {
            continue;
        }
        let line = record.position().map(|p| p.line() as usize).unwrap_or(seen);
        let fields: Vec<String> = match format.delimiter {
            // Runs of spaces produce empty fields; tabs may hide inside a field.
            Delimiter::Whitespace => record
                .iter()
                .flat_map(|f| f.split_whitespace())
                .map(str::to_string)
                .collect(),
            Delimiter::Tab | Delimiter::Comma => record.iter().map(str::to_string).collect(),
        };
        match fields.first() {
            None => continue,
            Some(f) if f.starts_with('#') => continue,
            Some(_) => out.push((line, fields)),
        }
    }
    Ok(out)
}

fn parse_observation(fields: &[String], first_column: usize) -> Result<Observation, String> {
    let get = |offset: usize, what: &str| -> Result<f64, String> {
        let raw = fields
            .get(first_column + offset)
            .ok_or_else(|| format!("missing {what} column {}", first_column + offset))?;
        parse_f64(raw).ok_or_else(|| format!("invalid {what} '{raw}'"))
    };
    let z = get(0, "redshift")?;
    let value = get(1, "value")?;
    let sigma = get(2, "sigma")?;

    if !(z.is_finite() && z >= 0.0) {
        return Err(format!("redshift must be finite and >= 0, got {z}"));
    }
    if !value.is_finite() {
        return Err(format!("value must be finite, got {value}"));
    }
    if !(sigma.is_finite() && sigma > 0.0) {
        return Err(format!("sigma must be finite and > 0, got {sigma}"));
    }
    Ok(Observation { z, value, sigma })
}

fn parse_f64(s: &str) -> Option<f64> {
    let t = s.trim();
    if t.is_empty() {
        return None;
    }
    t.parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("dmscan-ingest-{}-{name}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn ohd_file_is_sorted_and_bad_rows_skipped() {
        let path = temp_file(
            "ohd.txt",
            "# z H sigma\n0.48  97.0 62.0\n0.07\t69.0 19.6\n0.1 abc 12.0\n0.2 72.9 29.6\n",
        );
        let ingested = load_dataset(&path, "ohd", &DatasetFormat::ohd()).unwrap();
        assert_eq!(ingested.dataset.redshifts(), vec![0.07, 0.2, 0.48]);
        // The skipped row does not take a slot: z=0.2 is valid row 2, file row 3.
        assert_eq!(ingested.order, vec![1, 2, 0]);
        assert_eq!(ingested.row_errors.len(), 1);
        assert!(ingested.row_errors[0].message.contains("invalid value"));
        assert_eq!(ingested.rows_read, 4);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn union_layout_skips_header_and_name_column() {
        let path = temp_file(
            "union.txt",
            "h1\nh2\nh3\nh4\nh5\nSN1 0.50 42.2 0.2 0.9\nSN2 0.03 35.9 0.1 0.8\n",
        );
        let ingested = load_dataset(&path, "sne", &DatasetFormat::union21()).unwrap();
        let ds = &ingested.dataset;
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.points[0].z, 0.03);
        assert_eq!(ds.points[0].value, 35.9);
        assert_eq!(ds.points[1].sigma, 0.2);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn comma_delimited_files_are_supported() {
        let path = temp_file("comma.csv", "0.3, 80.0, 5.0\n0.1,70.0,4.0\n");
        let format = DatasetFormat {
            delimiter: Delimiter::Comma,
            ..DatasetFormat::ohd()
        };
        let ds = load_ohd(&path, &format).unwrap();
        assert_eq!(ds.values(), vec![70.0, 80.0]);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn empty_dataset_is_no_data_error() {
        let path = temp_file("empty.txt", "# nothing here\n");
        let err = load_ohd(&path, &DatasetFormat::ohd()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn missing_file_is_input_error() {
        let err = load_ohd(Path::new("/definitely/not/here.txt"), &DatasetFormat::ohd()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn covariance_follows_the_redshift_sort() {
        let data = temp_file("sne.txt", "A 0.9 44.0 0.2\nB 0.1 38.0 0.1\nC 0.5 42.0 0.3\n");
        // Distinct diagonal entries identify rows: A=4, B=1, C=9; A–C correlated.
        let cov = temp_file("cov.txt", "4 0 1\n0 1 0\n1 0 9\n");
        let format = DatasetFormat {
            skip_rows: 0,
            first_column: 1,
            delimiter: Delimiter::Whitespace,
        };

        let raw = load_covariance(&cov, 3, Delimiter::Whitespace).unwrap();
        let ingested = load_dataset(&data, "sne", &format).unwrap();
        assert_eq!(ingested.order, vec![1, 2, 0]);
        let permuted = permute_covariance(&raw, &ingested.order);
        assert_eq!(permuted[(0, 0)], 1.0);
        assert_eq!(permuted[(1, 1)], 9.0);
        assert_eq!(permuted[(2, 2)], 4.0);
        assert_eq!(permuted[(1, 2)], 1.0);
        assert_eq!(permuted[(0, 1)], 0.0);

        let sne = load_sne(&data, &format, Some(&cov)).unwrap();
        let inv = sne.inv_cov.unwrap();
        let product = &inv * &permuted;
        let identity = DMatrix::<f64>::identity(3, 3);
        assert!((product - identity).abs().max() < 1e-12);

        std::fs::remove_file(data).ok();
        std::fs::remove_file(cov).ok();
    }

    #[test]
    fn covariance_with_wrong_size_or_skipped_rows_is_rejected() {
        let data = temp_file("sne-bad.txt", "A 0.9 44.0 0.2\nB 0.1 oops 0.1\nC 0.5 42.0 0.3\n");
        let cov2 = temp_file("cov2.txt", "1 0\n0 1\n");
        let format = DatasetFormat {
            skip_rows: 0,
            first_column: 1,
            delimiter: Delimiter::Whitespace,
        };
        // Row B is skipped, so a covariance cannot be aligned at all.
        assert_eq!(load_sne(&data, &format, Some(&cov2)).unwrap_err().exit_code(), 2);
        assert!(load_covariance(&cov2, 3, Delimiter::Whitespace).is_err());
        // Without a covariance the bad row is simply dropped.
        assert_eq!(load_sne(&data, &format, None).unwrap().dataset.len(), 2);
        std::fs::remove_file(data).ok();
        std::fs::remove_file(cov2).ok();
    }

    #[test]
    fn singular_covariance_is_rejected() {
        let data = temp_file("sne-ind.txt", "A 0.1 38.0 0.2\nB 0.2 39.0 0.1\n");
        let cov = temp_file("cov-ind.txt", "1 2\n2 4\n");
        let format = DatasetFormat {
            skip_rows: 0,
            first_column: 1,
            delimiter: Delimiter::Whitespace,
        };
        let err = load_sne(&data, &format, Some(&cov)).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("singular"));
        std::fs::remove_file(data).ok();
        std::fs::remove_file(cov).ok();
    }
}
