// FlagVet - Veto evaluation engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Flag evaluation.
//!
//! [`Evaluator`] owns a metric registry and a partition cache. Evaluating a
//! flag optionally fills its short gaps, partitions the triggers once, and
//! applies every requested metric with the inputs it needs.
//!
//! # Example
//!
//! ```rust
//! use flagvet::{EvaluationOptions, Evaluator, Flag, IntervalSet, Trigger, TriggerSet};
//!
//! let flag = Flag::new(
//!     "X1:DCH-GLITCH:1",
//!     IntervalSet::from_pairs(&[(0.0, 100.0)]).unwrap(),
//!     IntervalSet::from_pairs(&[(40.0, 50.0)]).unwrap(),
//! )
//! .unwrap();
//! let triggers = TriggerSet::from_rows(
//!     "X1:GDS-CALIB_STRAIN",
//!     "omicron",
//!     [5.0, 45.0, 70.0, 95.0].map(|t| Trigger::new().with("peak", t)),
//! );
//!
//! let evaluator = Evaluator::standard();
//! let evaluation = evaluator
//!     .evaluate_flag(
//!         &flag,
//!         Some(&triggers),
//!         &["deadtime".into(), "efficiency".into()],
//!         None,
//!         &EvaluationOptions::default(),
//!     )
//!     .unwrap();
//!
//! assert_eq!(evaluation.results.get("deadtime").unwrap().as_f64(), Some(10.0));
//! assert_eq!(evaluation.results.get("efficiency").unwrap().as_f64(), Some(25.0));
//! ```

use crate::error::{MetricError, Result};
use crate::flag::Flag;
use crate::metric::{Measurement, Metric, MetricArgs, MetricRegistry};
use crate::segments::IntervalSet;
use crate::triggers::TriggerSet;
use crate::veto::PartitionCache;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A metric to evaluate, by name or as an object.
#[derive(Debug, Clone)]
pub enum MetricRequest {
    /// Resolved through the evaluator's registry
    Name(String),
    /// Used as given
    Metric(Metric),
}

impl MetricRequest {
    /// Key under which the result is reported.
    pub fn label(&self) -> &str {
        match self {
            MetricRequest::Name(name) => name,
            MetricRequest::Metric(metric) => metric.name(),
        }
    }
}

impl From<&str> for MetricRequest {
    fn from(name: &str) -> Self {
        MetricRequest::Name(name.to_string())
    }
}

impl From<String> for MetricRequest {
    fn from(name: String) -> Self {
        MetricRequest::Name(name)
    }
}

impl From<Metric> for MetricRequest {
    fn from(metric: Metric) -> Self {
        MetricRequest::Metric(metric)
    }
}

/// Per-call evaluation settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationOptions {
    /// Gaps shorter than this (seconds) are filled before evaluation; `0` disables
    pub min_duration: f64,
    /// Free-form label that becomes part of the partition identity
    pub tag: String,
    /// Channel override for the partition identity
    pub channel: Option<String>,
    /// Generator override for the partition identity
    pub etg: Option<String>,
}

/// Metric results in request order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationResults {
    entries: Vec<(String, Measurement)>,
}

impl EvaluationResults {
    /// Store `value` under `label`, overwriting an earlier entry in place.
    pub fn insert(&mut self, label: impl Into<String>, value: Measurement) {
        let label = label.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == label) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((label, value)),
        }
    }

    /// Result reported under `label`.
    pub fn get(&self, label: &str) -> Option<&Measurement> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == label)
            .map(|(_, value)| value)
    }

    /// Iterate `(label, measurement)` pairs in request order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Measurement)> {
        self.entries.iter().map(|(label, value)| (label.as_str(), value))
    }

    /// Labels in request order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(label, _)| label.as_str())
    }

    /// Number of results.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no results.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Output of [`Evaluator::evaluate_flag`].
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// One measurement per requested metric
    pub results: EvaluationResults,
    /// Triggers surviving the veto, when triggers were supplied
    pub survivors: Option<Arc<TriggerSet>>,
}

/// Evaluation engine.
#[derive(Debug)]
pub struct Evaluator {
    registry: Arc<MetricRegistry>,
    cache: PartitionCache,
}

impl Evaluator {
    /// Create an evaluator over `registry` with an empty cache.
    pub fn new(registry: Arc<MetricRegistry>) -> Self {
        Self {
            registry,
            cache: PartitionCache::new(),
        }
    }

    /// Evaluator over a fresh registry holding the standard metrics.
    pub fn standard() -> Self {
        Self::new(Arc::new(MetricRegistry::with_standard_metrics()))
    }

    /// The metric registry.
    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    /// The partition cache.
    pub fn cache(&self) -> &PartitionCache {
        &self.cache
    }

    /// Evaluate `flag` with each requested metric.
    ///
    /// The caller's flag is never modified. Metrics that need triggers
    /// receive the triggers and the cached survivors; `safety` receives the
    /// injections. Any unresolvable name or missing input aborts the whole
    /// evaluation.
    pub fn evaluate_flag(
        &self,
        flag: &Flag,
        triggers: Option<&TriggerSet>,
        metrics: &[MetricRequest],
        injections: Option<&IntervalSet>,
        options: &EvaluationOptions,
    ) -> Result<Evaluation> {
        let flag = if options.min_duration > 0.0 {
            flag.fill_short_gaps(options.min_duration)
        } else {
            flag.clone()
        };

        let survivors = match triggers {
            Some(triggers) => Some(self.cache.partition(
                triggers,
                &flag,
                &options.tag,
                options.channel.as_deref(),
                options.etg.as_deref(),
            )?),
            None => {
                if options.channel.is_some() || options.etg.is_some() {
                    warn!(
                        "channel/etg options ignored for {:?}: no triggers supplied",
                        flag.name()
                    );
                }
                None
            }
        };

        let mut results = EvaluationResults::default();
        for request in metrics {
            let metric = match request {
                MetricRequest::Name(name) => self.registry.get(name)?,
                MetricRequest::Metric(metric) => metric.clone(),
            };
            let args = dispatch_args(&metric, triggers, survivors.as_deref(), injections)?;
            results.insert(request.label(), metric.call(&flag, &args)?);
        }

        info!(
            "evaluated {} metric(s) for {:?} (livetime {}s, {} survivor(s))",
            results.len(),
            flag.name(),
            flag.livetime(),
            survivors.as_ref().map_or(0, |s| s.len())
        );

        Ok(Evaluation { results, survivors })
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::standard()
    }
}

fn dispatch_args<'a>(
    metric: &Metric,
    triggers: Option<&'a TriggerSet>,
    survivors: Option<&'a TriggerSet>,
    injections: Option<&'a IntervalSet>,
) -> Result<MetricArgs<'a>> {
    if metric.name().eq_ignore_ascii_case("safety") {
        let injections = injections.ok_or_else(|| missing(metric, "an injection interval set"))?;
        return Ok(MetricArgs::injections(injections));
    }
    if metric.needs_triggers() {
        let triggers = triggers.ok_or_else(|| missing(metric, "a trigger set"))?;
        return Ok(MetricArgs::triggers(triggers, survivors));
    }
    Ok(MetricArgs::none())
}

fn missing(metric: &Metric, input: &str) -> crate::error::VetError {
    MetricError::MissingInput {
        metric: metric.name().to_string(),
        input: input.to_string(),
    }
    .into()
}
