#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/staggered/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod aggregate;
pub mod cancel;
pub mod cell;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod group_time;
pub mod nuisance;

// Re-export main types
pub use aggregate::{AggregateEffect, Aggregator};
pub use cancel::CancelToken;
pub use cell::{
    CellFit, CellSample, DidEstimator, DoublyRobust, InverseProbability, OutcomeRegression,
    PropensityOptions, estimator_for, unadjusted,
};
pub use config::{
    Aggregation, BasePeriod, ConfigError, ControlGroup, EstimationMethod, EstimatorConfig,
    IntervalMethod,
};
pub use diagnostics::{Diagnostic, SkipReason};
pub use error::EstimateError;
pub use group_time::{GroupTime, GroupTimeEffect, GroupTimeEngine, GroupTimeTable};
pub use nuisance::{LinearRegression, LogisticConfig, LogisticRegression, NuisanceError, NuisanceModel};
