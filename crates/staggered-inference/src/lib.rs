#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/staggered/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod analytic;
pub mod bootstrap;
pub mod engine;
pub mod error;
pub mod estimand;
pub mod interval;

pub use analytic::cluster_robust_variance;
pub use bootstrap::{BootstrapDraws, ClusterBootstrap};
pub use engine::{InferenceEngine, InferenceMethod, InferenceReport};
pub use error::InferenceError;
pub use estimand::{Estimand, EstimandValue, collect_estimands};
pub use interval::{
    Inference, normal_interval, normal_quantile, percentile_interval, quantile_sorted,
    sample_std, two_sided_p_value,
};
