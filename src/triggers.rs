// FlagVet - Veto evaluation engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Event trigger tables.
//!
//! A [`TriggerSet`] is an ordered table of rows with named numeric columns,
//! tagged with the channel and trigger generator that produced it. Column
//! names are case-insensitive.

use crate::error::{MetricError, TriggerError};
use crate::etg::etg_parameters;
use crate::segments::IntervalSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One event record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trigger {
    fields: BTreeMap<String, f64>,
}

impl Trigger {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter.
    pub fn with(mut self, column: &str, value: f64) -> Self {
        self.set(column, value);
        self
    }

    /// Set a field.
    pub fn set(&mut self, column: &str, value: f64) {
        self.fields.insert(column.to_lowercase(), value);
    }

    /// Read a field.
    pub fn get(&self, column: &str) -> Option<f64> {
        self.fields.get(&column.to_lowercase()).copied()
    }

    /// Column names present on this row.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }
}

/// Column comparison used by threshold filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `=` or `==`
    Eq,
    /// `>=`
    Ge,
    /// `>`
    Gt,
    /// `!=`
    Ne,
}

impl Comparison {
    /// Apply `value <op> threshold`.
    pub fn apply(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::Lt => value < threshold,
            Comparison::Le => value <= threshold,
            Comparison::Eq => value == threshold,
            Comparison::Ge => value >= threshold,
            Comparison::Gt => value > threshold,
            Comparison::Ne => value != threshold,
        }
    }
}

impl FromStr for Comparison {
    type Err = MetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "<" => Ok(Comparison::Lt),
            "<=" => Ok(Comparison::Le),
            "=" | "==" => Ok(Comparison::Eq),
            ">=" => Ok(Comparison::Ge),
            ">" => Ok(Comparison::Gt),
            "!=" => Ok(Comparison::Ne),
            other => Err(MetricError::UnknownOperator {
                operator: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Eq => "==",
            Comparison::Ge => ">=",
            Comparison::Gt => ">",
            Comparison::Ne => "!=",
        };
        f.write_str(symbol)
    }
}

/// Ordered collection of triggers from one channel and generator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerSet {
    channel: String,
    etg: String,
    time_column: String,
    rows: Vec<Trigger>,
    /// Interval set these rows were selected over, set on veto partitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    segments: Option<IntervalSet>,
}

impl TriggerSet {
    /// Create an empty table; the time column follows the generator's
    /// parameters.
    pub fn new(channel: impl Into<String>, etg: impl Into<String>) -> Self {
        let etg = etg.into();
        Self {
            channel: channel.into(),
            time_column: etg_parameters(&etg, None).time,
            etg,
            rows: Vec::new(),
            segments: None,
        }
    }

    /// Create a table holding `rows`.
    pub fn from_rows(
        channel: impl Into<String>,
        etg: impl Into<String>,
        rows: impl IntoIterator<Item = Trigger>,
    ) -> Self {
        let mut set = Self::new(channel, etg);
        set.rows.extend(rows);
        set
    }

    /// Override the time column.
    pub fn with_time_column(mut self, column: impl Into<String>) -> Self {
        self.time_column = column.into();
        self
    }

    /// Attach the defining interval set.
    pub fn with_segments(mut self, segments: IntervalSet) -> Self {
        self.segments = Some(segments);
        self
    }

    /// Append a row.
    pub fn push(&mut self, trigger: Trigger) {
        self.rows.push(trigger);
    }

    /// Channel tag.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Generator tag.
    pub fn etg(&self) -> &str {
        &self.etg
    }

    /// Name of the event time column.
    pub fn time_column(&self) -> &str {
        &self.time_column
    }

    /// Defining interval set, if this table is a veto partition.
    pub fn segments(&self) -> Option<&IntervalSet> {
        self.segments.as_ref()
    }

    /// Rows in order.
    pub fn rows(&self) -> &[Trigger] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate over rows.
    pub fn iter(&self) -> std::slice::Iter<'_, Trigger> {
        self.rows.iter()
    }

    /// Values of `column` for every row; a row without it is an error.
    pub fn column(&self, column: &str) -> Result<Vec<f64>, TriggerError> {
        self.rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                row.get(column).ok_or_else(|| TriggerError::MissingColumn {
                    column: column.to_string(),
                    index,
                })
            })
            .collect()
    }

    /// Event times, read from the time column.
    pub fn times(&self) -> Result<Vec<f64>, TriggerError> {
        self.column(&self.time_column)
    }

    /// Largest value of `column`, `None` for an empty table.
    pub fn max(&self, column: &str) -> Result<Option<f64>, TriggerError> {
        Ok(self.column(column)?.into_iter().reduce(f64::max))
    }

    /// Rows where `row[column] <op> threshold` holds.
    pub fn filter(
        &self,
        column: &str,
        op: Comparison,
        threshold: f64,
    ) -> Result<TriggerSet, TriggerError> {
        let values = self.column(column)?;
        let rows = self
            .rows
            .iter()
            .zip(values)
            .filter(|(_, value)| op.apply(*value, threshold))
            .map(|(row, _)| row.clone());
        Ok(self.derive(rows, self.segments.clone()))
    }

    /// Split rows by whether their time falls inside `segments`.
    ///
    /// Returns `(inside, outside)`; both keep the input order and carry no
    /// defining segments.
    pub fn split(&self, segments: &IntervalSet) -> Result<(TriggerSet, TriggerSet), TriggerError> {
        let times = self.times()?;
        let mut inside = Vec::new();
        let mut outside = Vec::new();
        for (row, t) in self.rows.iter().zip(times) {
            if segments.contains(t) {
                inside.push(row.clone());
            } else {
                outside.push(row.clone());
            }
        }
        Ok((self.derive(inside, None), self.derive(outside, None)))
    }

    /// Rows surviving a veto over `active`.
    pub fn veto(&self, active: &IntervalSet) -> Result<TriggerSet, TriggerError> {
        Ok(self.split(active)?.1)
    }

    /// Rows removed by a veto over `active`.
    pub fn vetoed(&self, active: &IntervalSet) -> Result<TriggerSet, TriggerError> {
        Ok(self.split(active)?.0)
    }

    fn derive(
        &self,
        rows: impl IntoIterator<Item = Trigger>,
        segments: Option<IntervalSet>,
    ) -> TriggerSet {
        TriggerSet {
            channel: self.channel.clone(),
            etg: self.etg.clone(),
            time_column: self.time_column.clone(),
            rows: rows.into_iter().collect(),
            segments,
        }
    }
}

impl<'a> IntoIterator for &'a TriggerSet {
    type Item = &'a Trigger;
    type IntoIter = std::slice::Iter<'a, Trigger>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
