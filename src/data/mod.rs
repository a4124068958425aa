//! Canonical data model and codecs.
//!
//! Every integrator reads the same three record kinds:
//!
//! - [`PredictedInstance`]: one source's prediction for an instance/label pair
//! - [`ObservedInstance`]: a known label for an instance
//! - [`ErrorRate`]: a source's probability of mislabelling a label
//!
//! and produces an [`IntegrationResult`]. Records are persisted in a binary
//! protocol-buffer format (`.protobin`) or in CSV (`.csv`); the file
//! extension alone selects the format.
//!
//! # Example
//!
//! ```
//! use labelfuse::data::{io_csv, PredictedInstance};
//!
//! let predictions = vec![PredictedInstance::new(0, "animal", 1, 0.5)];
//! let csv = io_csv::to_csv_string(&predictions).unwrap();
//! assert_eq!(csv, "ID,LABEL,FUNCTION_ID,VALUE\n0,animal,1,0.5\n");
//! ```

mod format;
pub mod io_csv;
pub mod io_protobin;
mod label;
mod model;

pub use format::{
    load_error_rates, load_integrated_labels, load_observed_instances, load_predicted_instances,
    load_records, save_error_rates, save_integrated_labels, save_observed_instances,
    save_predicted_instances, save_records, Record, RecordFormat,
};
pub use label::Label;
pub use model::{
    hard_label, ErrorRate, IntegratedLabel, IntegrationResult, ObservedInstance,
    PredictedInstance, HARD_LABEL_THRESHOLD, INTEGRATED_SOURCE_ID,
};
