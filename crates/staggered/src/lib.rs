#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/staggered/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod pipeline;
pub mod simulate;

// Re-export sub-crates
pub use staggered_estimate as estimate;
pub use staggered_inference as inference;
pub use staggered_output as output;
pub use staggered_panel as panel;

pub use error::FitError;
pub use pipeline::{DEFAULT_ANTICIPATION_SWEEP, StaggeredDid};
pub use simulate::SimulationConfig;

// Re-export the types most callers need
pub use staggered_estimate::{
    Aggregation, BasePeriod, CancelToken, ControlGroup, Diagnostic, EstimationMethod,
    EstimatorConfig, IntervalMethod, SkipReason,
};
pub use staggered_inference::InferenceMethod;
pub use staggered_output::{ExportFormat, Exporter, ResultSet, sweep_table};
pub use staggered_panel::{ColumnBindings, PanelRecord, PanelTable, load_panel};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
