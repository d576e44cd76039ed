// FlagVet - Veto evaluation engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Figures of merit for veto performance.
//!
//! A [`Metric`] wraps a scoring function together with its name, a
//! human-readable description and the unit of its output, so that any figure
//! of merit can be applied uniformly to a flag and its trigger sets.
//!
//! - [`registry`]: name lookup, including metrics built on demand from
//!   expressions such as `"Efficiency | SNR >= 8"`
//! - [`factory`]: the expression grammar and derived-metric construction
//! - [`standard`]: deadtime, efficiency, use percentage, safety, ...
//! - [`declaration`]: metrics declared in configuration

pub mod declaration;
pub mod factory;
pub mod registry;
pub mod standard;

use crate::error::{MetricError, Result};
use crate::flag::Flag;
use crate::segments::IntervalSet;
use crate::triggers::TriggerSet;
use crate::unit::Unit;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub use declaration::{MetricDeclaration, MethodTable};
pub use registry::MetricRegistry;

/// Raw output of a scoring function.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    /// Numeric figure of merit
    Number(f64),
    /// Pass/fail outcome (safety)
    Bool(bool),
}

impl MetricValue {
    /// Numeric value, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(v) => Some(*v),
            MetricValue::Bool(_) => None,
        }
    }

    /// Boolean value, if this is a pass/fail outcome.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            MetricValue::Bool(b) => Some(*b),
            MetricValue::Number(_) => None,
        }
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Number(value)
    }
}

impl From<bool> for MetricValue {
    fn from(value: bool) -> Self {
        MetricValue::Bool(value)
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Number(v) => write!(f, "{v}"),
            MetricValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// A metric value tagged with its unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// The value
    pub value: MetricValue,
    /// The unit of the metric that produced it
    pub unit: Unit,
}

impl Measurement {
    /// Numeric value, if any.
    pub fn as_f64(&self) -> Option<f64> {
        self.value.as_f64()
    }

    /// Boolean value, if any.
    pub fn as_bool(&self) -> Option<bool> {
        self.value.as_bool()
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit {
            Unit::Dimensionless => write!(f, "{}", self.value),
            ref unit => write!(f, "{} {}", self.value, unit),
        }
    }
}

/// Inputs beyond the flag handed to a scoring function.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricArgs<'a> {
    /// Triggers before the veto is applied
    pub before: Option<&'a TriggerSet>,
    /// Triggers surviving the veto; computed by the metric when absent
    pub after: Option<&'a TriggerSet>,
    /// Injection intervals (safety)
    pub injections: Option<&'a IntervalSet>,
}

impl<'a> MetricArgs<'a> {
    /// No extra inputs.
    pub fn none() -> Self {
        Self::default()
    }

    /// Before and, optionally, after trigger sets.
    pub fn triggers(before: &'a TriggerSet, after: Option<&'a TriggerSet>) -> Self {
        Self {
            before: Some(before),
            after,
            injections: None,
        }
    }

    /// Injection intervals only.
    pub fn injections(injections: &'a IntervalSet) -> Self {
        Self {
            injections: Some(injections),
            ..Self::default()
        }
    }

    /// The before set, or a missing-input error naming `metric`.
    pub fn require_before(&self, metric: &str) -> Result<&'a TriggerSet> {
        self.before.ok_or_else(|| {
            MetricError::MissingInput {
                metric: metric.to_string(),
                input: "a trigger set".to_string(),
            }
            .into()
        })
    }

    /// The injections, or a missing-input error naming `metric`.
    pub fn require_injections(&self, metric: &str) -> Result<&'a IntervalSet> {
        self.injections.ok_or_else(|| {
            MetricError::MissingInput {
                metric: metric.to_string(),
                input: "an injection interval set".to_string(),
            }
            .into()
        })
    }
}

/// Scoring function signature shared by every metric.
pub type ScoreFn = Arc<dyn Fn(&Flag, &MetricArgs<'_>) -> Result<MetricValue> + Send + Sync>;

/// Share a scoring function.
pub fn score_fn<F>(method: F) -> ScoreFn
where
    F: Fn(&Flag, &MetricArgs<'_>) -> Result<MetricValue> + Send + Sync + 'static,
{
    Arc::new(method)
}

/// A named, unit-tagged figure of merit.
#[derive(Clone)]
pub struct Metric {
    name: String,
    description: String,
    unit: Unit,
    needs_triggers: bool,
    method: ScoreFn,
}

impl Metric {
    /// Start building a metric around `method`.
    pub fn builder<F>(method: F) -> MetricBuilder
    where
        F: Fn(&Flag, &MetricArgs<'_>) -> Result<MetricValue> + Send + Sync + 'static,
    {
        MetricBuilder {
            derived_name: item_name::<F>(),
            method: Arc::new(method),
            name: None,
            description: None,
            unit: Unit::Dimensionless,
            needs_triggers: false,
        }
    }

    /// Start building a metric around an already shared scoring function.
    pub fn builder_from_arc(method: ScoreFn) -> MetricBuilder {
        MetricBuilder {
            derived_name: None,
            method,
            name: None,
            description: None,
            unit: Unit::Dimensionless,
            needs_triggers: false,
        }
    }

    /// Assemble a metric whose metadata is already known to be valid.
    pub(crate) fn from_parts(
        name: impl Into<String>,
        description: &str,
        unit: Unit,
        needs_triggers: bool,
        method: ScoreFn,
    ) -> Metric {
        Metric {
            name: name.into(),
            description: description.trim_end().to_string(),
            unit,
            needs_triggers,
            method,
        }
    }

    /// Metric name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// First line of the description.
    pub fn summary(&self) -> &str {
        self.description.lines().next().unwrap_or("")
    }

    /// Output unit.
    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    /// Whether the metric needs a trigger set.
    pub fn needs_triggers(&self) -> bool {
        self.needs_triggers
    }

    /// The shared scoring function.
    pub fn method(&self) -> &ScoreFn {
        &self.method
    }

    /// Rename; empty names are rejected.
    pub fn set_name(&mut self, name: impl Into<String>) -> Result<()> {
        self.name = validate_name(name.into())?;
        Ok(())
    }

    /// Replace the description; trailing whitespace is dropped.
    pub fn set_description(&mut self, description: &str) {
        self.description = description.trim_end().to_string();
    }

    /// Replace the unit; `None` resets it to dimensionless.
    pub fn set_unit(&mut self, unit: Option<Unit>) {
        self.unit = unit.unwrap_or_default();
    }

    /// Declare whether the metric needs triggers.
    pub fn set_needs_triggers(&mut self, needs_triggers: bool) {
        self.needs_triggers = needs_triggers;
    }

    /// Replace the scoring function.
    pub fn set_method(&mut self, method: ScoreFn) {
        self.method = method;
    }

    /// Run the scoring function without attaching the unit.
    pub fn score(&self, flag: &Flag, args: &MetricArgs<'_>) -> Result<MetricValue> {
        (self.method)(flag, args)
    }

    /// Run the scoring function and tag the result with this metric's unit.
    pub fn call(&self, flag: &Flag, args: &MetricArgs<'_>) -> Result<Measurement> {
        Ok(Measurement {
            value: self.score(flag, args)?,
            unit: self.unit.clone(),
        })
    }
}

impl PartialEq for Metric {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.description == other.description
            && self.unit == other.unit
            && self.needs_triggers == other.needs_triggers
            && Arc::ptr_eq(&self.method, &other.method)
    }
}

impl fmt::Debug for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metric")
            .field("name", &self.name)
            .field("description", &self.summary())
            .field("unit", &self.unit)
            .field("needs_triggers", &self.needs_triggers)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Builder for [`Metric`].
pub struct MetricBuilder {
    method: ScoreFn,
    derived_name: Option<String>,
    name: Option<String>,
    description: Option<String>,
    unit: Unit,
    needs_triggers: bool,
}

impl MetricBuilder {
    /// Set the name. Without one, the scoring function's item name is used.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the output unit.
    pub fn unit(mut self, unit: impl Into<Unit>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Declare whether the metric consumes triggers.
    pub fn needs_triggers(mut self, needs_triggers: bool) -> Self {
        self.needs_triggers = needs_triggers;
        self
    }

    /// Finish the metric.
    pub fn build(self) -> Result<Metric> {
        let name = match self.name.or(self.derived_name) {
            Some(name) => validate_name(name)?,
            None => return Err(MetricError::AnonymousMethod.into()),
        };
        Ok(Metric {
            name,
            description: self
                .description
                .map(|d| d.trim_end().to_string())
                .unwrap_or_default(),
            unit: self.unit,
            needs_triggers: self.needs_triggers,
            method: self.method,
        })
    }
}

impl fmt::Debug for MetricBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricBuilder")
            .field("name", &self.name.as_ref().or(self.derived_name.as_ref()))
            .field("unit", &self.unit)
            .field("needs_triggers", &self.needs_triggers)
            .finish_non_exhaustive()
    }
}

fn validate_name(name: String) -> Result<String> {
    if name.trim().is_empty() {
        return Err(MetricError::InvalidName(name).into());
    }
    Ok(name)
}

/// Last path segment of a function item's type name; closures have none.
fn item_name<F>() -> Option<String> {
    let full = std::any::type_name::<F>();
    if full.contains("{{closure}}") {
        return None;
    }
    let path = full.split('<').next().unwrap_or(full);
    path.rsplit("::")
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

/// Apply each metric to the same flag and triggers, without caching.
pub fn evaluate_all(
    metrics: &[Metric],
    flag: &Flag,
    triggers: Option<&TriggerSet>,
) -> Result<Vec<Measurement>> {
    let args = MetricArgs {
        before: triggers,
        ..MetricArgs::default()
    };
    metrics.iter().map(|m| m.call(flag, &args)).collect()
}
