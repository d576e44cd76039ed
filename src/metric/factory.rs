// FlagVet - Veto evaluation engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Metric expressions.
//!
//! Configuration can name metrics that were never registered explicitly:
//!
//! - `"<metric> | <column> <op> <value>"` applies `<metric>` to the triggers
//!   whose `<column>` satisfies the comparison, e.g. `"Efficiency | SNR >= 8"`
//! - `"loudest event by <column>"` measures the drop of the loudest value of
//!   `<column>` caused by the veto
//!
//! Matchers are tried in that order.

use super::standard::loudest_event_metric;
use super::{score_fn, Metric, MetricArgs};
use crate::error::{MetricError, Result, VetError};
use crate::triggers::Comparison;
use regex::Regex;
use std::sync::LazyLock;

static THRESHOLD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<metric>.*)\|\s*(?P<column>[\w\s]+?)\s*(?P<operator>[<>=!]+)\s*(?P<value>.*)$")
        .unwrap()
});

static LOUDEST_EVENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^loudest event by (?P<column>[\w\s]+)$").unwrap());

/// A parsed metric expression.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricExpression {
    /// Base metric applied to column-filtered triggers
    Threshold {
        /// Name of the metric to delegate to
        base: String,
        /// Column to filter on
        column: String,
        /// Operator token as written
        operator: String,
        /// Parsed operator
        op: Comparison,
        /// Threshold value
        value: f64,
    },
    /// Loudest-event reduction for a column
    LoudestEvent {
        /// Column to rank by
        column: String,
    },
}

impl MetricExpression {
    /// Parse `expression`.
    ///
    /// Returns `Ok(None)` when no pattern matches, and an error when a
    /// pattern matches but its operator or value is invalid.
    pub fn parse(expression: &str) -> Result<Option<Self>> {
        let expression = expression.trim();

        if let Some(caps) = THRESHOLD_RE.captures(expression) {
            let operator = caps["operator"].to_string();
            let op = operator
                .parse::<Comparison>()
                .map_err(|_| MetricError::InvalidExpression {
                    expression: expression.to_string(),
                    reason: format!("unknown operator {operator:?}"),
                })?;
            let raw_value = caps["value"].trim();
            let value = raw_value
                .parse::<f64>()
                .map_err(|_| MetricError::InvalidExpression {
                    expression: expression.to_string(),
                    reason: format!("threshold {raw_value:?} is not a number"),
                })?;
            return Ok(Some(MetricExpression::Threshold {
                base: caps["metric"].trim().to_string(),
                column: caps["column"].trim().to_string(),
                operator,
                op,
                value,
            }));
        }

        if let Some(caps) = LOUDEST_EVENT_RE.captures(expression) {
            return Ok(Some(MetricExpression::LoudestEvent {
                column: caps["column"].trim().to_lowercase(),
            }));
        }

        Ok(None)
    }
}

/// Derive a metric that applies `base` to triggers where
/// `row[column] <operator> threshold` holds.
///
/// Both the before and, if given, the after set are filtered. Without
/// `name` the metric is called `"<base> (<column> <operator> <threshold>)"`.
pub fn threshold_metric(
    base: &Metric,
    column: &str,
    operator: &str,
    threshold: f64,
    name: Option<&str>,
) -> Result<Metric> {
    let op = operator.parse::<Comparison>()?;
    let tag = format!(" ({column} {operator} {threshold:?})");
    let name = name
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}{}", base.name(), tag));
    let description = format!("{}{}", base.summary(), tag);

    let delegate = base.clone();
    let column = column.to_lowercase();
    let metric_name = name.clone();
    let method = score_fn(move |flag, args| {
        let before = args.require_before(&metric_name)?.filter(&column, op, threshold)?;
        let after = args
            .after
            .map(|after| after.filter(&column, op, threshold))
            .transpose()?;
        delegate.score(
            flag,
            &MetricArgs {
                before: Some(&before),
                after: after.as_ref(),
                injections: args.injections,
            },
        )
    });

    Ok(Metric::from_parts(
        name,
        &description,
        base.unit().clone(),
        true,
        method,
    ))
}

/// Build the metric an expression describes; `resolve` looks up the base of
/// a threshold expression.
///
/// An unknown base is reported against the whole expression `name`.
pub fn build(
    expression: &MetricExpression,
    name: &str,
    resolve: impl FnOnce(&str) -> Result<Metric>,
) -> Result<Metric> {
    match expression {
        MetricExpression::Threshold {
            base,
            column,
            operator,
            value,
            ..
        } => {
            let base = resolve(base).map_err(|err| match err {
                VetError::Metric(MetricError::NotFound { name: missing }) => {
                    VetError::from(MetricError::InvalidExpression {
                        expression: name.to_string(),
                        reason: format!("unknown base metric {missing:?}"),
                    })
                }
                other => other,
            })?;
            threshold_metric(&base, column, operator, *value, Some(name))
        }
        MetricExpression::LoudestEvent { column } => Ok(loudest_event_metric(column)),
    }
}
