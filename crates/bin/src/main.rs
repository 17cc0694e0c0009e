//! Staggered CLI binary.
//!
//! Provides a command-line interface for staggered-adoption
//! difference-in-differences.

mod commands;

use clap::{Args, Parser, Subcommand};
use staggered::{
    Aggregation, BasePeriod, ColumnBindings, ControlGroup, EstimationMethod, EstimatorConfig,
    IntervalMethod,
};
use std::path::PathBuf;
use std::process;

#[derive(Debug, Parser)]
#[command(name = "staggered")]
#[command(about = "Staggered-adoption difference-in-differences", long_about = None)]
#[command(version)]
struct Cli {
    /// Log at debug level
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Estimate group-time effects and their aggregation
    Fit {
        /// Panel CSV file
        input: PathBuf,

        #[command(flatten)]
        columns: ColumnArgs,

        #[command(flatten)]
        estimator: EstimatorArgs,

        /// Output format (text, markdown, json or csv)
        #[arg(long, default_value = "text")]
        format: String,

        /// Also write the result tables into this directory
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Re-fit for several anticipation windows
    Anticipation {
        /// Panel CSV file
        input: PathBuf,

        #[command(flatten)]
        columns: ColumnArgs,

        #[command(flatten)]
        estimator: EstimatorArgs,

        /// Anticipation windows in periods
        #[arg(long, value_delimiter = ',', default_value = "0,1,7,14")]
        windows: Vec<u32>,

        /// Write one summary file per window into this directory
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// Turn a dated raw table into a panel CSV
    Prepare {
        /// Raw CSV file
        input: PathBuf,

        /// JSON object mapping unit to adoption date (YYYY-MM-DD)
        #[arg(long)]
        adoption_dates: PathBuf,

        /// Unit column of the raw table
        #[arg(long, default_value = "unit")]
        unit_column: String,

        /// Date column of the raw table
        #[arg(long, default_value = "date")]
        date_column: String,

        /// Outcome column of the raw table
        #[arg(long, default_value = "outcome")]
        outcome_column: String,

        /// Keep only these units
        #[arg(long, value_delimiter = ',')]
        keep_units: Vec<String>,

        /// first_treat value written for units without an adoption date
        #[arg(long, default_value = "0")]
        never_treated: i64,

        /// Panel CSV to write
        #[arg(long, short)]
        output: PathBuf,
    },

    /// Write a synthetic staggered panel
    Simulate {
        /// JSON simulation settings; flags below override it
        #[arg(long)]
        config: Option<PathBuf>,

        /// Number of units
        #[arg(long)]
        units: Option<usize>,

        /// Number of periods
        #[arg(long)]
        periods: Option<i64>,

        /// Adoption periods
        #[arg(long, value_delimiter = ',')]
        cohorts: Vec<i64>,

        /// Treatment effect
        #[arg(long)]
        effect: Option<f64>,

        /// Number of clusters
        #[arg(long)]
        clusters: Option<usize>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Panel CSV to write
        #[arg(long, short)]
        output: PathBuf,
    },
}

/// Panel column names.
#[derive(Debug, Args)]
struct ColumnArgs {
    /// Outcome column
    #[arg(long, default_value = "outcome")]
    outcome: String,

    /// Unit column
    #[arg(long, default_value = "unit")]
    unit: String,

    /// Period column
    #[arg(long, default_value = "time")]
    time: String,

    /// First-treatment period column
    #[arg(long, default_value = "first_treat")]
    first_treat: String,

    /// Cluster column (defaults to the unit)
    #[arg(long)]
    cluster: Option<String>,

    /// Covariate columns
    #[arg(long, value_delimiter = ',')]
    covariates: Vec<String>,

    /// first_treat value of never-treated units
    #[arg(long, default_value = "0")]
    never_treated: i64,
}

impl ColumnArgs {
    fn bindings(&self) -> ColumnBindings {
        ColumnBindings {
            outcome: self.outcome.clone(),
            unit: self.unit.clone(),
            time: self.time.clone(),
            first_treat: self.first_treat.clone(),
            cluster: self.cluster.clone(),
            covariates: self.covariates.clone(),
            never_treated: self.never_treated,
        }
    }
}

/// Estimator settings; flags override the JSON file.
#[derive(Debug, Args)]
struct EstimatorArgs {
    /// JSON estimator configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// never_treated or not_yet_treated
    #[arg(long)]
    control_group: Option<ControlGroup>,

    /// dr, ipw or reg
    #[arg(long)]
    method: Option<EstimationMethod>,

    /// overall, event_study, group or none
    #[arg(long)]
    aggregate: Option<Aggregation>,

    /// Anticipation window in periods
    #[arg(long)]
    anticipation: Option<u32>,

    /// universal or varying
    #[arg(long)]
    base_period: Option<BasePeriod>,

    /// Bootstrap replicates (0 for analytic standard errors)
    #[arg(long)]
    bootstrap: Option<usize>,

    /// Bootstrap seed
    #[arg(long)]
    seed: Option<u64>,

    /// Significance level
    #[arg(long)]
    alpha: Option<f64>,

    /// normal or percentile bootstrap intervals
    #[arg(long)]
    interval: Option<IntervalMethod>,

    /// Skip cohorts with fewer units
    #[arg(long)]
    min_cohort_size: Option<usize>,
}

impl EstimatorArgs {
    fn config(&self) -> Result<EstimatorConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
            None => EstimatorConfig::default(),
        };
        if let Some(v) = self.control_group {
            config.control_group = v;
        }
        if let Some(v) = self.method {
            config.estimation_method = v;
        }
        if let Some(v) = self.aggregate {
            config.aggregate = v;
        }
        if let Some(v) = self.anticipation {
            config.anticipation = v;
        }
        if let Some(v) = self.base_period {
            config.base_period = v;
        }
        if let Some(v) = self.bootstrap {
            config.n_bootstrap = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.alpha {
            config.alpha = v;
        }
        if let Some(v) = self.interval {
            config.interval = v;
        }
        if let Some(v) = self.min_cohort_size {
            config.min_cohort_size = v;
        }
        Ok(config)
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Fit {
            input,
            columns,
            estimator,
            format,
            output_dir,
        } => {
            let config = estimator.config()?;
            commands::fit(&input, &columns.bindings(), config, &format, output_dir.as_deref())?;
        }
        Commands::Anticipation {
            input,
            columns,
            estimator,
            windows,
            output_dir,
        } => {
            let config = estimator.config()?;
            commands::anticipation(
                &input,
                &columns.bindings(),
                config,
                &windows,
                output_dir.as_deref(),
            )?;
        }
        Commands::Prepare {
            input,
            adoption_dates,
            unit_column,
            date_column,
            outcome_column,
            keep_units,
            never_treated,
            output,
        } => {
            let mut config =
                staggered::panel::PrepareConfig::new(unit_column, date_column, outcome_column);
            config.never_treated = never_treated;
            if !keep_units.is_empty() {
                config = config.with_keep_units(keep_units);
            }
            commands::prepare(&input, &adoption_dates, config, &output)?;
        }
        Commands::Simulate {
            config,
            units,
            periods,
            cohorts,
            effect,
            clusters,
            seed,
            output,
        } => {
            let mut settings = match config {
                Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
                None => staggered::SimulationConfig::default(),
            };
            if let Some(v) = units {
                settings.n_units = v;
            }
            if let Some(v) = periods {
                settings.n_periods = v;
            }
            if !cohorts.is_empty() {
                settings.cohorts = cohorts;
            }
            if let Some(v) = effect {
                settings.effect = v;
            }
            if clusters.is_some() {
                settings.n_clusters = clusters;
            }
            if let Some(v) = seed {
                settings.seed = v;
            }
            commands::simulate(&settings, &output)?;
        }
    }

    Ok(())
}
