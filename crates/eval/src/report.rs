use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tally_core::Receipt;
use thiserror::Error;

use crate::evaluate::{evaluate, Evaluation};

/// File name of the batch-level report inside the results directory.
pub const COLLATED_REPORT: &str = "total.json";

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("IO error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Receipt {base} would overwrite the collated report {}", COLLATED_REPORT)]
    ReservedName { base: String },
}

/// Batch-level figure written next to the per-receipt reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollatedReport {
    /// Mean normalized error; null when nothing was evaluated.
    pub average_error: Option<f64>,
    pub evaluated: usize,
}

/// Running mean of per-receipt normalized errors.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    errors: Vec<f64>,
}

impl BatchSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, evaluation: &Evaluation) {
        self.errors.push(evaluation.normalized_error);
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn average(&self) -> Option<f64> {
        if self.errors.is_empty() {
            return None;
        }
        Some(self.errors.iter().sum::<f64>() / self.errors.len() as f64)
    }

    pub fn collated(&self) -> CollatedReport {
        CollatedReport {
            average_error: self.average(),
            evaluated: self.len(),
        }
    }

    /// Write the collated report to `<results_dir>/total.json`.
    pub fn write_collated(&self, results_dir: &Path) -> Result<PathBuf, EvalError> {
        let path = results_dir.join(COLLATED_REPORT);
        write_json(&path, &self.collated())?;
        Ok(path)
    }
}

/// Evaluate the produced document `<output_dir>/<base>.json` against the label
/// `<label_dir>/<base>.json` and write the report to `<results_dir>/<base>.json`.
///
/// A missing output document counts as an empty receipt, so a receipt the
/// pipeline failed on is still charged for every label character.
///
/// A receipt whose report would land on [`COLLATED_REPORT`] is refused with
/// `ReservedName`.
pub fn analyze_receipt(
    base: &str,
    output_dir: &Path,
    label_dir: &Path,
    results_dir: &Path,
) -> Result<Evaluation, EvalError> {
    let file_name = format!("{base}.json");
    if file_name == COLLATED_REPORT {
        return Err(EvalError::ReservedName { base: base.to_string() });
    }
    let label: Receipt = read_json(&label_dir.join(&file_name))?;

    let output_path = output_dir.join(&file_name);
    let output = match read_json::<Receipt>(&output_path) {
        Ok(receipt) => receipt,
        Err(EvalError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("No output document for {base}, scoring as empty");
            Receipt::default()
        }
        Err(e) => return Err(e),
    };

    let evaluation = evaluate(&label, &output);
    tracing::debug!(
        base,
        normalized_error = evaluation.normalized_error,
        "Receipt evaluated"
    );
    write_json(&results_dir.join(&file_name), &evaluation)?;
    Ok(evaluation)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, EvalError> {
    let bytes = std::fs::read(path).map_err(|source| EvalError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| EvalError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), EvalError> {
    let io_err = |source: std::io::Error| EvalError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser).map_err(|source| EvalError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, buf).map_err(io_err)
}
