// FlagVet - Veto evaluation engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Standard veto metrics.
//!
//! Each ratio metric defines a sentinel for an empty denominator instead of
//! failing, so a degenerate but legal flag (no active time, no triggers)
//! never aborts an evaluation.

use super::{score_fn, Metric};
use crate::error::Result;
use crate::flag::Flag;
use crate::segments::IntervalSet;
use crate::triggers::TriggerSet;
use crate::unit::Unit;
use statrs::distribution::{DiscreteCDF, Poisson};

/// Poisson significance below which a veto is declared unsafe.
pub const SAFETY_THRESHOLD: f64 = 5e-3;

/// Percentage of known time that is active; `0` when nothing is known.
pub fn deadtime(flag: &Flag) -> f64 {
    let livetime = flag.known().duration();
    if livetime == 0.0 {
        return 0.0;
    }
    flag.active().duration() / livetime * 100.0
}

/// Percentage of `before` triggers removed by the veto; `0` when `before` is
/// empty.
///
/// `after` is computed from `before` when not supplied.
pub fn efficiency(flag: &Flag, before: &TriggerSet, after: Option<&TriggerSet>) -> Result<f64> {
    if before.is_empty() {
        return Ok(0.0);
    }
    let after_count = match after {
        Some(after) => after.len(),
        None => before.veto(flag.active())?.len(),
    };
    let removed = before.len().saturating_sub(after_count);
    Ok(removed as f64 / before.len() as f64 * 100.0)
}

/// Ratio of efficiency to deadtime; `0` when the deadtime is zero.
pub fn efficiency_over_deadtime(
    flag: &Flag,
    before: &TriggerSet,
    after: Option<&TriggerSet>,
) -> Result<f64> {
    let dt = deadtime(flag);
    if dt == 0.0 {
        return Ok(0.0);
    }
    Ok(efficiency(flag, before, after)? / dt)
}

/// Percentage of active intervals containing at least one trigger; `0` when
/// there are no active intervals.
pub fn use_percentage(flag: &Flag, before: &TriggerSet) -> Result<f64> {
    let active = flag.active();
    if active.is_empty() {
        return Ok(0.0);
    }
    let mut times = before.times()?;
    times.sort_by(f64::total_cmp);

    let used = active
        .iter()
        .filter(|interval| {
            let idx = times.partition_point(|&t| t < interval.start);
            times.get(idx).is_some_and(|&t| t < interval.end)
        })
        .count();
    Ok(used as f64 / active.len() as f64 * 100.0)
}

/// Percentage drop in the loudest value of `column` caused by the veto.
///
/// `0` when `before` is empty, `100` when nothing survives.
pub fn loudest_event_by(
    flag: &Flag,
    column: &str,
    before: &TriggerSet,
    after: Option<&TriggerSet>,
) -> Result<f64> {
    let Some(loudest_before) = before.max(column)? else {
        return Ok(0.0);
    };
    let loudest_after = match after {
        Some(after) => after.max(column)?,
        None => before.veto(flag.active())?.max(column)?,
    };
    let Some(loudest_after) = loudest_after else {
        return Ok(100.0);
    };
    if loudest_before == 0.0 {
        return Ok(0.0);
    }
    Ok((loudest_before - loudest_after) / loudest_before * 100.0)
}

/// Probability of at least the observed number of injection coincidences
/// arising by chance.
///
/// The expected count assumes injections fall uniformly over the known time:
/// `n_expected = count(injections) * duration(active) / duration(known)`.
pub fn safety_significance(flag: &Flag, injections: &IntervalSet) -> f64 {
    let deadtime = flag.active().duration();
    let livetime = flag.known().duration();
    let n_veto = injections
        .iter()
        .filter(|injection| flag.active().intersects(injection))
        .count() as u64;
    let n_expected = if livetime > 0.0 {
        injections.len() as f64 * deadtime / livetime
    } else {
        0.0
    };

    if n_veto == 0 {
        return 1.0;
    }
    match Poisson::new(n_expected) {
        Ok(poisson) => 1.0 - poisson.cdf(n_veto - 1),
        // zero expectation: any coincidence is impossible by chance
        Err(_) => 0.0,
    }
}

/// Whether the veto's coincidences with injections are significant at
/// `threshold`. `true` marks the veto as unsafe for real signals.
pub fn safety(flag: &Flag, injections: &IntervalSet, threshold: f64) -> bool {
    safety_significance(flag, injections) < threshold
}

/// `Deadtime` metric.
pub fn deadtime_metric() -> Metric {
    Metric::from_parts(
        "Deadtime",
        "The active duration of a given set of segments, as a percentage of the known duration",
        Unit::Percent,
        false,
        score_fn(|flag, _| Ok(deadtime(flag).into())),
    )
}

/// `Efficiency` metric.
pub fn efficiency_metric() -> Metric {
    Metric::from_parts(
        "Efficiency",
        "The percentage of event triggers that overlap any of the veto segments",
        Unit::Percent,
        true,
        score_fn(|flag, args| {
            let before = args.require_before("Efficiency")?;
            Ok(efficiency(flag, before, args.after)?.into())
        }),
    )
}

/// `Efficiency/Deadtime` metric.
pub fn efficiency_over_deadtime_metric() -> Metric {
    Metric::from_parts(
        "Efficiency/Deadtime",
        "The ratio of efficiency (%) to deadtime (%)",
        Unit::Dimensionless,
        true,
        score_fn(|flag, args| {
            let before = args.require_before("Efficiency/Deadtime")?;
            Ok(efficiency_over_deadtime(flag, before, args.after)?.into())
        }),
    )
}

/// `Use percentage` metric.
pub fn use_percentage_metric() -> Metric {
    Metric::from_parts(
        "Use percentage",
        "The percentage of active segments that are used to veto triggers",
        Unit::Percent,
        true,
        score_fn(|flag, args| {
            let before = args.require_before("Use percentage")?;
            Ok(use_percentage(flag, before)?.into())
        }),
    )
}

/// `Safety` metric at the given significance threshold.
pub fn safety_metric(threshold: f64) -> Metric {
    Metric::from_parts(
        "Safety",
        "The safety of these segments with respect to vetoing GW signals\n\
         `true` when the coincidences with injections exceed chance at the \
         configured Poisson significance, i.e. the veto is unsafe.",
        Unit::Dimensionless,
        false,
        score_fn(move |flag, args| {
            let injections = args.require_injections("Safety")?;
            Ok(safety(flag, injections, threshold).into())
        }),
    )
}

/// `Loudest event by <column>` metric.
pub fn loudest_event_metric(column: &str) -> Metric {
    let column = column.trim().to_lowercase();
    let name = format!("Loudest event by {column}");
    let description =
        format!("Percentage reduction in the amplitude of the loudest event by {column}");
    let metric_name = name.clone();
    Metric::from_parts(
        name,
        &description,
        Unit::Percent,
        true,
        score_fn(move |flag, args| {
            let before = args.require_before(&metric_name)?;
            Ok(loudest_event_by(flag, &column, before, args.after)?.into())
        }),
    )
}

/// Every built-in metric, in registration order.
pub fn standard_metrics() -> Vec<Metric> {
    vec![
        deadtime_metric(),
        efficiency_metric(),
        efficiency_over_deadtime_metric(),
        use_percentage_metric(),
        safety_metric(SAFETY_THRESHOLD),
    ]
}

/// Built-in metric for a bare function name, as used by declarations.
pub fn builtin(name: &str) -> Option<Metric> {
    match name.trim().to_lowercase().as_str() {
        "deadtime" => Some(deadtime_metric()),
        "efficiency" => Some(efficiency_metric()),
        "efficiency_over_deadtime" => Some(efficiency_over_deadtime_metric()),
        "use_percentage" => Some(use_percentage_metric()),
        "safety" => Some(safety_metric(SAFETY_THRESHOLD)),
        _ => None,
    }
}
