// FlagVet - Veto evaluation engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Integration tests for flag evaluation
//!
//! These tests drive the public API end to end: registry lookups and
//! expression factories, the partition cache, the standard metrics and
//! configuration files.

use approx::assert_relative_eq;
use flagvet::metric::standard::{deadtime, efficiency, loudest_event_by, safety, safety_significance};
use flagvet::*;
use flagvet_testdata::{generate_scenario, Preset};
use rand::prelude::*;
use rand::rngs::StdRng;
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::tempdir;

fn set(pairs: &[(f64, f64)]) -> IntervalSet {
    IntervalSet::from_pairs(pairs).unwrap()
}

fn snr_triggers(rows: &[(f64, f64)]) -> TriggerSet {
    TriggerSet::from_rows(
        "X1:GDS-CALIB_STRAIN",
        "omicron",
        rows.iter()
            .map(|&(t, snr)| Trigger::new().with("peak", t).with("snr", snr)),
    )
}

/// known [0, 100), active [40, 50)
fn glitch_flag() -> Flag {
    Flag::new("X1:DCH-GLITCH:1", set(&[(0.0, 100.0)]), set(&[(40.0, 50.0)])).unwrap()
}

// ============================================================================
// Section 1: End-to-end scenario
// ============================================================================

#[test]
fn test_end_to_end_scenario() {
    let evaluator = Evaluator::standard();
    let flag = glitch_flag();
    let triggers = snr_triggers(&[(5.0, 6.0), (45.0, 30.0), (70.0, 7.0), (95.0, 6.5)]);

    let requests: Vec<MetricRequest> = ["deadtime", "efficiency", "efficiency/deadtime"]
        .into_iter()
        .map(MetricRequest::from)
        .collect();
    let evaluation = evaluator
        .evaluate_flag(&flag, Some(&triggers), &requests, None, &EvaluationOptions::default())
        .unwrap();

    assert_relative_eq!(evaluation.results.get("deadtime").unwrap().as_f64().unwrap(), 10.0);
    assert_relative_eq!(evaluation.results.get("efficiency").unwrap().as_f64().unwrap(), 25.0);
    assert_relative_eq!(
        evaluation.results.get("efficiency/deadtime").unwrap().as_f64().unwrap(),
        2.5
    );

    let survivors = evaluation.survivors.unwrap();
    assert_eq!(survivors.times().unwrap(), vec![5.0, 70.0, 95.0]);

    let vetoed = evaluator
        .cache()
        .vetoed("X1:GDS-CALIB_STRAIN", flag.name(), "", "omicron")
        .unwrap();
    assert_eq!(vetoed.times().unwrap(), vec![45.0]);
}

#[test]
fn test_measurements_carry_units() {
    let evaluator = Evaluator::standard();
    let evaluation = evaluator
        .evaluate_flag(
            &glitch_flag(),
            None,
            &["Deadtime".into()],
            None,
            &EvaluationOptions::default(),
        )
        .unwrap();
    let deadtime = evaluation.results.get("Deadtime").unwrap();
    assert_eq!(deadtime.unit, Unit::Percent);
    assert_eq!(deadtime.to_string(), "10 %");
}

// ============================================================================
// Section 2: Partition cache
// ============================================================================

#[test]
fn test_partition_idempotence() {
    let cache = PartitionCache::new();
    let flag = glitch_flag();
    let triggers = snr_triggers(&[(5.0, 6.0), (45.0, 30.0), (70.0, 7.0)]);

    let first = cache.partition(&triggers, &flag, "Locked", None, None).unwrap();
    let second = cache.partition(&triggers, &flag, "Locked", None, None).unwrap();

    assert_eq!(*first, *second);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.scan_count(), 1);
}

#[test]
fn test_partition_identity_includes_channel_and_etg() {
    let cache = PartitionCache::new();
    let flag = glitch_flag();
    let triggers = snr_triggers(&[(45.0, 30.0)]);

    cache.partition(&triggers, &flag, "", None, None).unwrap();
    cache.partition(&triggers, &flag, "", Some("X1:OTHER"), None).unwrap();
    cache.partition(&triggers, &flag, "", None, Some("kleinewelle")).unwrap();
    // the generator tag is case-insensitive
    cache.partition(&triggers, &flag, "", None, Some("OMICRON")).unwrap();

    assert_eq!(cache.scan_count(), 3);
    assert!(cache
        .cached("X1:OTHER#X1-DCH-GLITCH-1,omicron")
        .is_some());
}

#[test]
fn test_partition_defaults_to_unknown_tags() {
    let cache = PartitionCache::new();
    let flag = glitch_flag();
    let triggers = TriggerSet::from_rows("", "", [Trigger::new().with("time", 45.0)])
        .with_time_column("time");

    cache.partition(&triggers, &flag, "", None, None).unwrap();
    assert!(cache
        .vetoed("unknown-channel", flag.name(), "", "unknown-etg")
        .is_some());
}

#[test]
fn test_partition_completeness_randomized() {
    let mut rng = StdRng::seed_from_u64(0xF1A6);

    for round in 0..50 {
        let mut active = Vec::new();
        let mut t = 0.0_f64;
        while t < 1000.0 {
            let start = t + rng.gen_range(0.0_f64..50.0);
            let end = (start + rng.gen_range(0.1_f64..20.0)).min(1000.0);
            if start < end {
                active.push((start, end));
            }
            t = end;
        }
        let flag = Flag::new(format!("F{round}"), set(&[(0.0, 1000.0)]), set(&active)).unwrap();

        let rows: Vec<(f64, f64)> = (0..200)
            .map(|_| (rng.gen_range(0.0..1000.0), rng.gen_range(1.0..50.0)))
            .collect();
        let triggers = snr_triggers(&rows);

        let cache = PartitionCache::new();
        let after = cache.partition(&triggers, &flag, "", None, None).unwrap();
        let vetoed = cache
            .vetoed(triggers.channel(), flag.name(), "", triggers.etg())
            .unwrap();

        assert_eq!(after.len() + vetoed.len(), triggers.len());
        for row in vetoed.iter() {
            assert!(flag.active().contains(row.get("peak").unwrap()));
        }
        for row in after.iter() {
            assert!(!flag.active().contains(row.get("peak").unwrap()));
        }

        let mut expected: Vec<f64> = triggers.times().unwrap();
        let mut combined: Vec<f64> = after.times().unwrap();
        combined.extend(vetoed.times().unwrap());
        expected.sort_by(f64::total_cmp);
        combined.sort_by(f64::total_cmp);
        assert_eq!(combined, expected);
    }
}

// ============================================================================
// Section 3: Registry and factories
// ============================================================================

#[test]
fn test_registry_roundtrip() {
    let registry = MetricRegistry::new();
    let metric = Metric::builder_from_arc(score_fn(|flag, _| Ok((flag.active().len() as f64).into())))
        .name("Active segments")
        .description("Number of active intervals")
        .build()
        .unwrap();
    registry.register(metric.clone(), None, false).unwrap();
    assert_eq!(registry.get(metric.name()).unwrap(), metric);
}

#[test]
fn test_threshold_factory_filters_before_and_after() {
    let registry = MetricRegistry::with_standard_metrics();
    let metric = registry.get("Efficiency | SNR >= 8").unwrap();

    let before = snr_triggers(&[(1.0, 5.0), (2.0, 9.0), (3.0, 12.0)]);
    let after = snr_triggers(&[(2.0, 9.0)]);
    let value = metric
        .call(&Flag::default(), &MetricArgs::triggers(&before, Some(&after)))
        .unwrap();
    assert_relative_eq!(value.as_f64().unwrap(), 50.0);
    assert_eq!(value.unit, Unit::Percent);
}

#[test]
fn test_threshold_factory_through_evaluator() {
    let evaluator = Evaluator::standard();
    let triggers = snr_triggers(&[(5.0, 4.0), (42.0, 12.0), (45.0, 9.0), (70.0, 10.0)]);
    let evaluation = evaluator
        .evaluate_flag(
            &glitch_flag(),
            Some(&triggers),
            &["Efficiency | snr > 8".into(), "efficiency".into()],
            None,
            &EvaluationOptions::default(),
        )
        .unwrap();
    let filtered = evaluation.results.get("Efficiency | snr > 8").unwrap();
    assert_relative_eq!(filtered.as_f64().unwrap(), 200.0 / 3.0, epsilon = 1e-9);
    assert_relative_eq!(
        evaluation.results.get("efficiency").unwrap().as_f64().unwrap(),
        50.0
    );
}

#[test]
fn test_loudest_event_factory() {
    let registry = MetricRegistry::with_standard_metrics();
    let metric = registry.get("Loudest event by SNR").unwrap();
    let flag = Flag::default();

    let before = snr_triggers(&[(1.0, 20.0), (2.0, 5.0)]);
    let after = snr_triggers(&[(2.0, 5.0)]);
    let value = metric.call(&flag, &MetricArgs::triggers(&before, Some(&after))).unwrap();
    assert_relative_eq!(value.as_f64().unwrap(), 75.0);

    let empty = snr_triggers(&[]);
    let value = metric.call(&flag, &MetricArgs::triggers(&empty, Some(&after))).unwrap();
    assert_eq!(value.as_f64(), Some(0.0));

    let value = metric.call(&flag, &MetricArgs::triggers(&before, Some(&empty))).unwrap();
    assert_eq!(value.as_f64(), Some(100.0));
}

#[test]
fn test_unknown_names_fail_loudly() {
    let registry = MetricRegistry::with_standard_metrics();
    for name in ["Efficency", "loudest events by snr", "Efficiency | snr >= eight"] {
        let err = registry.get(name).unwrap_err();
        assert!(err.to_string().contains(name.split('|').next().unwrap().trim()));
    }
}

#[test]
fn test_declared_metric_evaluation() {
    let registry = Arc::new(MetricRegistry::with_standard_metrics());
    let mut methods = MethodTable::new();
    methods.register("vt.vetoed_fraction", true, |_, args| {
        let before = args.require_before("Vetoed fraction")?;
        let after = args.after.map_or(before.len(), |a| a.len());
        Ok((before.len() - after) as f64 / before.len().max(1) as f64).map(MetricValue::from)
    });
    let declaration = MetricDeclaration::from_json(
        r#"{"name": "'Vetoed fraction'", "description": "Fraction of triggers removed", "method": "vt.vetoed_fraction"}"#,
    )
    .unwrap();
    registry
        .register_declarations(&[declaration], &methods, false)
        .unwrap();

    let evaluator = Evaluator::new(Arc::clone(&registry));
    let triggers = snr_triggers(&[(5.0, 1.0), (45.0, 1.0), (70.0, 1.0), (95.0, 1.0)]);
    let evaluation = evaluator
        .evaluate_flag(
            &glitch_flag(),
            Some(&triggers),
            &["vetoed fraction".into()],
            None,
            &EvaluationOptions::default(),
        )
        .unwrap();
    assert_relative_eq!(
        evaluation.results.get("vetoed fraction").unwrap().as_f64().unwrap(),
        0.25
    );
}

// ============================================================================
// Section 4: Standard metric properties
// ============================================================================

#[test]
fn test_deadtime_and_efficiency_bounds() {
    let mut rng = StdRng::seed_from_u64(17);
    for _ in 0..100 {
        let a = rng.gen_range(0.0..90.0);
        let b = a + rng.gen_range(0.1..10.0);
        let flag = Flag::new("F", set(&[(0.0, 100.0)]), set(&[(a, b)])).unwrap();
        let rows: Vec<(f64, f64)> = (0..rng.gen_range(0..30))
            .map(|_| (rng.gen_range(0.0..100.0), 1.0))
            .collect();
        let before = snr_triggers(&rows);

        let dt = deadtime(&flag);
        assert!((0.0..=100.0).contains(&dt));
        let eff = efficiency(&flag, &before, None).unwrap();
        assert!((0.0..=100.0).contains(&eff));
    }

    let degenerate = Flag::new("F", set(&[(5.0, 5.0)]), IntervalSet::new()).unwrap();
    assert_eq!(deadtime(&degenerate), 0.0);

    let empty = snr_triggers(&[]);
    let after = snr_triggers(&[(1.0, 1.0)]);
    assert_eq!(efficiency(&glitch_flag(), &empty, Some(&after)).unwrap(), 0.0);
}

#[test]
fn test_loudest_event_without_after() {
    let before = snr_triggers(&[(5.0, 8.0), (45.0, 40.0)]);
    let value = loudest_event_by(&glitch_flag(), "snr", &before, None).unwrap();
    assert_relative_eq!(value, 80.0);
}

#[test]
fn test_safety_flags_coincident_injections() {
    let flag = Flag::new("F", set(&[(0.0, 1000.0)]), set(&[(100.0, 110.0)])).unwrap();
    let injections = set(&[
        (101.0, 101.5),
        (104.0, 104.5),
        (108.0, 108.5),
        (500.0, 500.5),
        (900.0, 900.5),
    ]);

    let p = safety_significance(&flag, &injections);
    assert!(p < 1e-4, "p = {p}");
    assert!(safety(&flag, &injections, SAFETY_THRESHOLD));

    let evaluator = Evaluator::standard();
    let evaluation = evaluator
        .evaluate_flag(
            &flag,
            None,
            &["safety".into()],
            Some(&injections),
            &EvaluationOptions::default(),
        )
        .unwrap();
    assert_eq!(evaluation.results.get("safety").unwrap().as_bool(), Some(true));
}

#[test]
fn test_safety_with_no_coincidences() {
    let flag = glitch_flag();
    let injections = set(&[(10.0, 11.0), (80.0, 81.0)]);
    assert_eq!(safety_significance(&flag, &injections), 1.0);
    assert!(!safety(&flag, &injections, SAFETY_THRESHOLD));
}

// ============================================================================
// Section 5: Gap filling
// ============================================================================

#[test]
fn test_gap_filling_keeps_active_inside_known() {
    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..50 {
        let known_pairs = [(0.0_f64, 400.0_f64), (500.0, 1000.0)];
        let mut active = Vec::new();
        for &(s, e) in &known_pairs {
            let mut t = s;
            while t < e {
                let start = t + rng.gen_range(0.0_f64..10.0);
                let end = (start + rng.gen_range(0.1_f64..10.0)).min(e);
                if start < end {
                    active.push((start, end));
                }
                t = end + 0.01;
            }
        }
        let flag = Flag::new("F", set(&known_pairs), set(&active)).unwrap();
        let min_duration = rng.gen_range(0.0..8.0);
        let filled = flag.fill_short_gaps(min_duration);

        assert!(filled.active().is_subset_of(filled.known()));
        assert!(flag.active().is_subset_of(filled.active()));
        assert!(filled
            .gaps()
            .iter()
            .all(|gap| gap.duration() >= min_duration));
    }
}

// ============================================================================
// Section 6: Configuration
// ============================================================================

#[test]
fn test_config_file_drives_evaluation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("flagvet.json");
    let config = EvaluationConfig {
        metrics: vec![
            "deadtime".into(),
            "use percentage".into(),
            "loudest event by snr".into(),
        ],
        tag: "Locked".into(),
        ..Default::default()
    };
    std::fs::write(&path, config.to_json().unwrap()).unwrap();

    let loaded = EvaluationConfig::from_file(&path).unwrap();
    assert_eq!(loaded, config);

    let evaluator = Evaluator::new(Arc::new(loaded.build_registry(&MethodTable::new()).unwrap()));
    let triggers = snr_triggers(&[(5.0, 6.0), (45.0, 30.0), (70.0, 7.0)]);
    let evaluation = evaluator
        .evaluate_flag(&glitch_flag(), Some(&triggers), &loaded.requests(), None, &loaded.options())
        .unwrap();

    let values: BTreeMap<&str, f64> = evaluation
        .results
        .iter()
        .map(|(label, m)| (label, m.as_f64().unwrap()))
        .collect();
    assert_relative_eq!(values["deadtime"], 10.0);
    assert_relative_eq!(values["use percentage"], 100.0);
    assert_relative_eq!(values["loudest event by snr"], 100.0 * (30.0 - 7.0) / 30.0);
    assert!(evaluator
        .cache()
        .cached("X1:GDS-CALIB_STRAIN#X1-DCH-GLITCH-1,Locked,omicron")
        .is_some());
}

// ============================================================================
// Section 7: Generated scenarios
// ============================================================================

#[test]
fn test_generated_presets_evaluate() {
    let evaluator = Evaluator::standard();
    let requests: Vec<MetricRequest> = ["deadtime", "efficiency", "use percentage", "safety"]
        .into_iter()
        .map(MetricRequest::from)
        .collect();

    for preset in [Preset::Quiet, Preset::Glitchy, Preset::Unsafe] {
        let scenario = generate_scenario(&preset.config(2025)).unwrap();
        let evaluation = evaluator
            .evaluate_flag(
                &scenario.flag,
                Some(&scenario.triggers),
                &requests,
                Some(&scenario.injections),
                &EvaluationOptions::default(),
            )
            .unwrap();

        let eff = evaluation.results.get("efficiency").unwrap().as_f64().unwrap();
        assert!((0.0..=100.0).contains(&eff));
        let flagged = evaluation.results.get("safety").unwrap().as_bool().unwrap();
        if preset.expect_unsafe() {
            assert!(flagged, "preset {preset} should be flagged unsafe");
        }
    }
}
