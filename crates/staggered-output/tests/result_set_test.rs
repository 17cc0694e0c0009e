//! Result assembly and export from a freshly estimated panel.

use approx::assert_relative_eq;
use staggered_estimate::{Aggregation, EstimatorConfig, GroupTimeEngine};
use staggered_inference::{InferenceEngine, collect_estimands};
use staggered_output::{ExportFormat, Exporter, ResultSet, ResultSetBuilder};
use staggered_panel::{PanelRecord, PanelTable};

fn panel() -> PanelTable {
    let cohorts = [3, 3, 4, 4, 4, 0, 0, 0];
    let records = cohorts
        .iter()
        .enumerate()
        .flat_map(|(i, &g)| {
            (1..=5i64).map(move |t| PanelRecord {
                unit: format!("s{i}"),
                time: t,
                outcome: 10.0 + i as f64 + t as f64
                    + ((i + 2 * t as usize) % 3) as f64 * 0.2
                    + if g > 0 && t >= g { 1.0 } else { 0.0 },
                first_treat: g,
                cluster: Some(format!("c{}", i % 4)),
                covariates: Vec::new(),
            })
        })
        .collect();
    PanelTable::from_records(records, vec![], 0).unwrap()
}

fn fit(aggregate: Aggregation) -> ResultSet {
    let config = EstimatorConfig {
        aggregate,
        ..EstimatorConfig::default()
    };
    let panel = panel();
    let table = GroupTimeEngine::new(&config).unwrap().estimate(&panel).unwrap();
    let estimands = collect_estimands(&table, config.aggregate);
    let report = InferenceEngine::new(&config)
        .unwrap()
        .infer(&panel, &estimands)
        .unwrap();
    ResultSetBuilder::new()
        .config(config)
        .panel(&panel)
        .table(&table)
        .inference(&report)
        .build()
        .unwrap()
}

#[test]
fn test_json_round_trip_keeps_tables() {
    let results = fit(Aggregation::EventStudy);
    let json = results.export_to_string(ExportFormat::Json).unwrap();
    let restored: ResultSet = serde_json::from_str(&json).unwrap();

    assert_eq!(restored.n_clusters(), 4);
    assert_eq!(restored.event_study().len(), results.event_study().len());
    assert_eq!(restored.aggregation(), Aggregation::EventStudy);
    assert_relative_eq!(
        restored.overall().unwrap().estimate,
        results.overall().unwrap().estimate
    );
}

#[test]
fn test_missing_builder_input() {
    let err = ResultSetBuilder::new()
        .config(EstimatorConfig::default())
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("panel"));
}

#[test]
fn test_group_rows_only_for_group_aggregation() {
    let by_group = fit(Aggregation::Group);
    assert_eq!(by_group.groups().len(), 2);
    assert!(by_group.event_study().is_empty());
    assert_eq!(by_group.groups()[0].cohort_size, 2);

    let none = fit(Aggregation::None);
    assert!(none.overall().is_none());
    assert!(none.groups().is_empty());
}

#[test]
fn test_export_tables_as_json() {
    let results = fit(Aggregation::Group);
    let dir = std::env::temp_dir().join(format!("staggered-export-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();

    let written = results
        .export_tables(&dir, "run", ExportFormat::PrettyJson)
        .unwrap();
    let names: Vec<String> = written
        .iter()
        .filter_map(|p| p.file_name()?.to_str().map(str::to_string))
        .collect();
    assert_eq!(names, vec!["run_group_time.json", "run_groups.json"]);

    let content = std::fs::read_to_string(&written[1]).unwrap();
    let rows: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(rows.as_array().map(Vec::len), Some(2));

    std::fs::remove_dir_all(dir).ok();
}
