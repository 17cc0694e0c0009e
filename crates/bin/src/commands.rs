//! Subcommand implementations.

use indicatif::{ProgressBar, ProgressStyle};
use staggered::simulate::simulate_dataframe;
use staggered::{
    ColumnBindings, EstimatorConfig, ExportFormat, Exporter, ResultSet, SimulationConfig,
    StaggeredDid, load_panel, sweep_table,
};
use staggered_panel::{PrepareConfig, parse_adoption_dates, prepare_panel, read_csv, write_csv};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Spinner shown while bootstrap replicates run; `None` for analytic fits.
fn bootstrap_spinner(config: &EstimatorConfig, label: &str) -> Option<ProgressBar> {
    if !config.uses_bootstrap() {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) =
        ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed}]")
    {
        pb.set_style(style);
    }
    pb.set_message(format!("{label}: {} bootstrap replicates", config.n_bootstrap));
    pb.enable_steady_tick(Duration::from_millis(100));
    Some(pb)
}

fn render(results: &ResultSet, format: &str) -> CliResult<String> {
    match format {
        "text" => Ok(results.to_ascii_table()),
        "markdown" | "md" => Ok(results.to_markdown()),
        "json" => Ok(results.export_to_string(ExportFormat::PrettyJson)?),
        "csv" => Ok(results.export_to_string(ExportFormat::Csv)?),
        other => Err(format!(
            "Unknown output format '{other}' (expected text, markdown, json or csv)"
        )
        .into()),
    }
}

pub(crate) fn fit(
    input: &Path,
    bindings: &ColumnBindings,
    config: EstimatorConfig,
    format: &str,
    output_dir: Option<&Path>,
) -> CliResult<()> {
    let panel = load_panel(input, bindings)?;
    let did = StaggeredDid::new(config)?;

    let spinner = bootstrap_spinner(did.config(), "Fitting");
    let fitted = did.fit(&panel);
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let results = fitted?;

    println!("{}", render(&results, format)?);

    if let Some(dir) = output_dir {
        fs::create_dir_all(dir)?;
        let export_format = if format == "json" {
            ExportFormat::PrettyJson
        } else {
            ExportFormat::Csv
        };
        let mut written = results.export_tables(dir, "staggered", export_format)?;

        let summary = dir.join("staggered_summary.txt");
        fs::write(&summary, results.to_ascii_table())?;
        written.push(summary);

        for path in written {
            eprintln!("Wrote {}", path.display());
        }
    }

    Ok(())
}

pub(crate) fn anticipation(
    input: &Path,
    bindings: &ColumnBindings,
    config: EstimatorConfig,
    windows: &[u32],
    output_dir: Option<&Path>,
) -> CliResult<()> {
    let panel = load_panel(input, bindings)?;
    let did = StaggeredDid::new(config)?;

    let spinner = bootstrap_spinner(did.config(), "Anticipation sweep");
    let swept = did.anticipation_sweep(&panel, windows);
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let runs = swept?;

    if runs.len() < windows.len() {
        let fitted: Vec<u32> = runs.iter().map(|(k, _)| *k).collect();
        let missing: Vec<String> = windows
            .iter()
            .filter(|k| !fitted.contains(*k))
            .map(ToString::to_string)
            .collect();
        eprintln!(
            "Skipped anticipation windows without feasible cells: {}",
            missing.join(", ")
        );
    }

    println!("{}", sweep_table(&runs));

    if let Some(dir) = output_dir {
        fs::create_dir_all(dir)?;
        for (anticipation, results) in &runs {
            let path = dir.join(format!("anticipation_{anticipation}.txt"));
            fs::write(&path, results.to_ascii_table())?;
            eprintln!("Wrote {}", path.display());
        }
    }

    Ok(())
}

pub(crate) fn prepare(
    input: &Path,
    adoption_dates: &Path,
    config: PrepareConfig,
    output: &Path,
) -> CliResult<()> {
    let raw_dates: BTreeMap<String, String> =
        serde_json::from_str(&fs::read_to_string(adoption_dates)?)?;
    let config = config.with_adoption_dates(parse_adoption_dates(&raw_dates)?);

    let raw = read_csv(input)?;
    let mut panel = prepare_panel(&raw, &config)?;
    write_csv(&mut panel, output)?;

    println!(
        "Prepared {} rows ({} units with adoption dates) -> {}",
        panel.height(),
        config.adoption_dates.len(),
        output.display()
    );
    Ok(())
}

pub(crate) fn simulate(settings: &SimulationConfig, output: &Path) -> CliResult<()> {
    let mut df = simulate_dataframe(settings)?;
    write_csv(&mut df, output)?;

    println!(
        "Simulated {} units over {} periods (cohorts {:?}, effect {}) -> {}",
        settings.n_units,
        settings.n_periods,
        settings.cohorts,
        settings.effect,
        output.display()
    );
    Ok(())
}
