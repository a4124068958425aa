//! File-extension based selection between the record formats.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::io_csv::{self, CsvRecord};
use super::io_protobin::{self, ProtobinRecord};
use super::{ErrorRate, IntegratedLabel, ObservedInstance, PredictedInstance};
use crate::error::LabelFuseError;

/// A record file format, chosen from the file extension only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    /// `.protobin`
    Protobin,
    /// `.csv`
    Csv,
}

impl RecordFormat {
    /// Picks the format from the extension of `path`.
    ///
    /// There is no fallback: any other extension is an error.
    pub fn from_path(path: &Path) -> Result<Self, LabelFuseError> {
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match extension {
            "protobin" => Ok(RecordFormat::Protobin),
            "csv" => Ok(RecordFormat::Csv),
            "" => Err(LabelFuseError::UnsupportedFormat(format!(
                "'{}' has no extension (supported: protobin, csv)",
                path.display()
            ))),
            other => Err(LabelFuseError::UnsupportedFormat(format!(
                "'.{}' (supported: protobin, csv)",
                other
            ))),
        }
    }

    /// The extension, without a leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            RecordFormat::Protobin => "protobin",
            RecordFormat::Csv => "csv",
        }
    }
}

/// A record kind that both formats can carry.
pub trait Record: ProtobinRecord + CsvRecord {}

impl<T: ProtobinRecord + CsvRecord> Record for T {}

/// Saves records in the format selected by the extension of `path`.
pub fn save_records<R: Record>(path: &Path, records: &[R]) -> Result<(), LabelFuseError> {
    match RecordFormat::from_path(path)? {
        RecordFormat::Protobin => io_protobin::write_protobin(path, records),
        RecordFormat::Csv => io_csv::write_csv(path, records),
    }
}

/// Loads records in the format selected by the extension of `path`.
pub fn load_records<R: Record>(path: &Path) -> Result<Vec<R>, LabelFuseError> {
    match RecordFormat::from_path(path)? {
        RecordFormat::Protobin => io_protobin::read_protobin(path),
        RecordFormat::Csv => io_csv::read_csv(path),
    }
}

pub fn save_predicted_instances(
    path: &Path,
    instances: &[PredictedInstance],
) -> Result<(), LabelFuseError> {
    save_records(path, instances)
}

pub fn load_predicted_instances(path: &Path) -> Result<Vec<PredictedInstance>, LabelFuseError> {
    load_records(path)
}

pub fn save_observed_instances(
    path: &Path,
    instances: &[ObservedInstance],
) -> Result<(), LabelFuseError> {
    save_records(path, instances)
}

pub fn load_observed_instances(path: &Path) -> Result<Vec<ObservedInstance>, LabelFuseError> {
    load_records(path)
}

pub fn save_error_rates(path: &Path, error_rates: &[ErrorRate]) -> Result<(), LabelFuseError> {
    save_records(path, error_rates)
}

pub fn load_error_rates(path: &Path) -> Result<Vec<ErrorRate>, LabelFuseError> {
    load_records(path)
}

/// Saves integrated labels in their wire form (predictions of source -1).
pub fn save_integrated_labels(
    path: &Path,
    labels: &[IntegratedLabel],
) -> Result<(), LabelFuseError> {
    let wire: Vec<PredictedInstance> = labels.iter().map(IntegratedLabel::to_predicted).collect();
    save_records(path, &wire)
}

/// Loads integrated labels, re-deriving hard labels from the soft values.
pub fn load_integrated_labels(path: &Path) -> Result<Vec<IntegratedLabel>, LabelFuseError> {
    let wire: Vec<PredictedInstance> = load_records(path)?;
    Ok(wire.iter().map(IntegratedLabel::from_predicted).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_format_from_extension() {
        assert_eq!(
            RecordFormat::from_path(Path::new("x/predicted.protobin")).unwrap(),
            RecordFormat::Protobin
        );
        assert_eq!(
            RecordFormat::from_path(Path::new("x/predicted.csv")).unwrap(),
            RecordFormat::Csv
        );
    }

    #[test]
    fn unknown_extension_is_named_in_error() {
        let err = RecordFormat::from_path(Path::new("data.json")).unwrap_err();
        assert!(matches!(err, LabelFuseError::UnsupportedFormat(_)));
        assert!(err.to_string().contains(".json"), "{err}");
    }

    #[test]
    fn missing_extension_is_rejected() {
        assert!(matches!(
            RecordFormat::from_path(Path::new("data")),
            Err(LabelFuseError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn integrated_labels_travel_as_predictions() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("integrated.csv");
        let labels = vec![IntegratedLabel::new(3, "a", 0.5), IntegratedLabel::new(4, "a", 0.75)];
        save_integrated_labels(&path, &labels).unwrap();
        let csv = std::fs::read_to_string(&path).unwrap();
        assert_eq!(csv, "ID,LABEL,FUNCTION_ID,VALUE\n3,a,-1,0.5\n4,a,-1,0.75\n");
        let loaded = load_integrated_labels(&path).unwrap();
        assert_eq!(loaded, labels);
        assert!(!loaded[0].hard);
    }
}
