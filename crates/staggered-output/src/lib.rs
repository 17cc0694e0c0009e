#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/staggered/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod export;
pub mod result;
pub mod summary;

pub use export::{ExportError, ExportFormat, Exporter};
pub use result::{
    EffectRow, EventStudyRow, GroupRow, GroupTimeRow, ResultSet, ResultSetBuilder,
    ResultSetError, SkippedCell,
};
pub use summary::sweep_table;
