//! Integration tests on a panel whose trends depend on a covariate.

use approx::assert_abs_diff_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use staggered_estimate::{
    Aggregator, ControlGroup, EstimationMethod, EstimatorConfig, GroupTimeEngine,
};
use staggered_panel::{PanelRecord, PanelTable};

const EFFECT: f64 = 2.0;

/// Periods 1..=5, cohorts 3 and 4 plus never-treated units. Adoption is more
/// likely for units with high `x`, and those units also trend faster.
fn confounded_panel(n_units: usize, seed: u64) -> PanelTable {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 0.5).unwrap();
    let covariate = Normal::new(0.0, 1.0).unwrap();

    let mut records = Vec::new();
    for i in 0..n_units {
        let x: f64 = covariate.sample(&mut rng);
        let p_treat = 1.0 / (1.0 + (-x).exp());
        let first_treat = if rng.gen_range(0.0..1.0) < p_treat {
            if rng.gen_range(0.0..1.0) < 0.5 { 3 } else { 4 }
        } else {
            0
        };
        let level = noise.sample(&mut rng) * 4.0;
        for t in 1..=5i64 {
            let treated = first_treat > 0 && t >= first_treat;
            let outcome = level
                + t as f64 * (1.0 + x)
                + if treated { EFFECT } else { 0.0 }
                + noise.sample(&mut rng);
            records.push(PanelRecord {
                unit: format!("u{i:04}"),
                time: t,
                outcome,
                first_treat,
                cluster: None,
                covariates: vec![x],
            });
        }
    }
    PanelTable::from_records(records, vec!["x".to_string()], 0).unwrap()
}

fn estimate(panel: &PanelTable, config: &EstimatorConfig) -> f64 {
    let table = GroupTimeEngine::new(config).unwrap().estimate(panel).unwrap();
    Aggregator::overall(&table).unwrap().estimate()
}

#[test]
fn test_covariate_methods_recover_effect() {
    let panel = confounded_panel(4000, 7);

    for method in [
        EstimationMethod::DoublyRobust,
        EstimationMethod::InverseProbability,
        EstimationMethod::OutcomeRegression,
    ] {
        let config = EstimatorConfig {
            estimation_method: method,
            ..EstimatorConfig::default()
        };
        let overall = estimate(&panel, &config);
        assert!(
            (overall - EFFECT).abs() < 0.35,
            "{method}: overall {overall} too far from {EFFECT}"
        );
    }
}

#[test]
fn test_pre_trends_vanish_after_adjustment() {
    let panel = confounded_panel(2000, 19);
    let table = GroupTimeEngine::new(&EstimatorConfig::default())
        .unwrap()
        .estimate(&panel)
        .unwrap();

    let profile = Aggregator::event_study(&table);
    for (event_time, effect) in profile.range(..-1) {
        assert!(
            effect.estimate().abs() < 0.25,
            "pre-period {event_time}: {}",
            effect.estimate()
        );
    }
    for (event_time, effect) in profile.range(0..) {
        assert!(
            (effect.estimate() - EFFECT).abs() < 0.3,
            "event time {event_time}: {}",
            effect.estimate()
        );
    }
}

#[test]
fn test_control_groups_agree_without_violations() {
    let panel = confounded_panel(2000, 23);
    let never = estimate(&panel, &EstimatorConfig::default());
    let not_yet = estimate(
        &panel,
        &EstimatorConfig {
            control_group: ControlGroup::NotYetTreated,
            ..EstimatorConfig::default()
        },
    );
    assert!((never - not_yet).abs() < 0.3, "{never} vs {not_yet}");
}

#[test]
fn test_overall_influence_is_centred() {
    let panel = confounded_panel(800, 3);
    let table = GroupTimeEngine::new(&EstimatorConfig::default())
        .unwrap()
        .estimate(&panel)
        .unwrap();
    let overall = Aggregator::overall(&table).unwrap();

    assert_eq!(overall.influence().len(), panel.n_units());
    assert_abs_diff_eq!(overall.influence().mean().unwrap(), 0.0, epsilon = 1e-6);
}
