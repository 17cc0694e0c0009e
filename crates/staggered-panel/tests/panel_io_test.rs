//! Integration tests for preparing, writing and reloading panels.

use polars::prelude::*;
use staggered_panel::{
    ColumnBindings, PanelError, PrepareConfig, load_panel, parse_date, prepare_panel, write_csv,
};
use std::collections::BTreeMap;
use std::path::PathBuf;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("staggered-panel-{}-{name}", std::process::id()))
}

fn raw_mobility() -> DataFrame {
    let mut states = Vec::new();
    let mut days = Vec::new();
    let mut values = Vec::new();
    for (state, base) in [("California", -2.0), ("Texas", -1.0), ("South Dakota", 0.5)] {
        for day in 1..=9 {
            states.push(state);
            days.push(format!("2020-03-{day:02}"));
            values.push(base - f64::from(day) * 0.1);
        }
    }
    df!("sub_region_1" => states, "date" => days, "workplaces" => values).unwrap()
}

#[test]
fn test_prepare_write_and_load() {
    let adoption = BTreeMap::from([
        ("California".to_string(), parse_date("2020-03-04").unwrap()),
        ("Texas".to_string(), parse_date("2020-03-07").unwrap()),
    ]);
    let config = PrepareConfig::new("sub_region_1", "date", "workplaces").with_adoption_dates(adoption);

    let mut prepared = prepare_panel(&raw_mobility(), &config).unwrap();
    assert_eq!(prepared.height(), 27);

    let path = temp_path("prepared.csv");
    write_csv(&mut prepared, &path).unwrap();
    let panel = load_panel(&path, &ColumnBindings::default()).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(panel.n_units(), 3);
    assert_eq!(panel.periods().first(), Some(&0));
    assert_eq!(panel.periods().last(), Some(&8));
    assert_eq!(panel.cohort_sizes(), BTreeMap::from([(3, 1), (6, 1)]));
    assert_eq!(panel.never_treated_units().len(), 1);
    assert_eq!(panel.unit(1).id(), "South Dakota");
}

#[test]
fn test_load_rejects_missing_column() {
    let mut df = df!("unit" => ["a"], "time" => [1i64], "outcome" => [1.0]).unwrap();
    let path = temp_path("missing.csv");
    write_csv(&mut df, &path).unwrap();
    let err = load_panel(&path, &ColumnBindings::default()).unwrap_err();
    std::fs::remove_file(&path).ok();

    assert!(matches!(err, PanelError::Schema { .. }));
}

#[test]
fn test_load_missing_file_is_error() {
    let result = load_panel(temp_path("does-not-exist.csv"), &ColumnBindings::default());
    assert!(result.is_err());
}
