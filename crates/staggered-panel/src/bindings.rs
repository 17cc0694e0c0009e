//! Column bindings between a raw table and the panel fields.

use serde::{Deserialize, Serialize};

/// Names of the columns that feed each panel field.
///
/// `cluster` defaults to the unit column when absent, and `never_treated`
/// is the `first_treat` value reserved for units that never adopt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnBindings {
    /// Outcome column
    pub outcome: String,
    /// Unit identifier column
    pub unit: String,
    /// Integer period column
    pub time: String,
    /// First-treatment period column
    pub first_treat: String,
    /// Optional cluster column for inference
    #[serde(default)]
    pub cluster: Option<String>,
    /// Optional covariate columns for the nuisance models
    #[serde(default)]
    pub covariates: Vec<String>,
    /// Sentinel marking never-treated units
    #[serde(default)]
    pub never_treated: i64,
}

impl Default for ColumnBindings {
    fn default() -> Self {
        Self {
            outcome: "outcome".to_string(),
            unit: "unit".to_string(),
            time: "time".to_string(),
            first_treat: "first_treat".to_string(),
            cluster: None,
            covariates: Vec::new(),
            never_treated: 0,
        }
    }
}

impl ColumnBindings {
    /// Bind the outcome column
    pub fn with_outcome(mut self, column: impl Into<String>) -> Self {
        self.outcome = column.into();
        self
    }

    /// Bind a cluster column
    pub fn with_cluster(mut self, column: impl Into<String>) -> Self {
        self.cluster = Some(column.into());
        self
    }

    /// Bind covariate columns
    pub fn with_covariates<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.covariates = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Use a different never-treated sentinel
    pub const fn with_never_treated(mut self, sentinel: i64) -> Self {
        self.never_treated = sentinel;
        self
    }

    /// All columns that must be present in the input table
    pub fn required_columns(&self) -> Vec<&str> {
        let mut columns = vec![
            self.unit.as_str(),
            self.time.as_str(),
            self.outcome.as_str(),
            self.first_treat.as_str(),
        ];
        if let Some(cluster) = &self.cluster {
            columns.push(cluster.as_str());
        }
        columns.extend(self.covariates.iter().map(String::as_str));
        columns
    }
}
