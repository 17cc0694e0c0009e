#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/staggered/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod bindings;
pub mod cohort;
pub mod error;
pub mod loader;
pub mod prepare;
pub mod table;

pub use bindings::ColumnBindings;
pub use cohort::Cohort;
pub use error::{PanelError, Result};
pub use loader::{load_panel, read_csv, write_csv};
pub use prepare::{PrepareConfig, parse_adoption_dates, parse_date, prepare_panel};
pub use table::{PanelRecord, PanelTable, UnitSeries};
