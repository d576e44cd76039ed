// FlagVet - Veto evaluation engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Metrics declared in configuration.
//!
//! A declaration names its scoring function by a dotted path such as
//! `"vt.volume_time"`, or by a bare built-in name such as `"efficiency"`.
//! Dotted paths are looked up in a [`MethodTable`] that trusted start-up code
//! fills with [`MethodTable::register`]; configuration can never reach a
//! function that was not registered there.

use super::registry::strip_quotes;
use super::standard::builtin;
use super::{score_fn, Metric, MetricArgs, MetricValue, ScoreFn};
use crate::error::{MetricError, Result, VetError};
use crate::flag::Flag;
use crate::unit::Unit;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One metric declaration section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricDeclaration {
    /// Metric name
    pub name: String,
    /// Human description
    #[serde(default)]
    pub description: String,
    /// Output unit, e.g. `"%"`
    #[serde(default)]
    pub unit: String,
    /// Dotted method path or bare built-in name
    pub method: String,
}

impl MetricDeclaration {
    /// Parse a declaration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| VetError::Config(e.to_string()))
    }
}

#[derive(Clone)]
struct PluginMethod {
    method: ScoreFn,
    needs_triggers: bool,
}

/// Scoring functions that declarations may reference by dotted path.
#[derive(Clone, Default)]
pub struct MethodTable {
    methods: HashMap<String, PluginMethod>,
}

impl MethodTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `method` under `path`, replacing any earlier entry.
    pub fn register<F>(&mut self, path: &str, needs_triggers: bool, method: F) -> &mut Self
    where
        F: Fn(&Flag, &MetricArgs<'_>) -> Result<MetricValue> + Send + Sync + 'static,
    {
        self.methods.insert(
            path.trim().to_string(),
            PluginMethod {
                method: score_fn(method),
                needs_triggers,
            },
        );
        self
    }

    /// Whether `path` is registered.
    pub fn contains(&self, path: &str) -> bool {
        self.methods.contains_key(path.trim())
    }

    /// Resolve a method path: dotted paths through the table, bare names
    /// through the built-in metrics.
    fn resolve(&self, path: &str) -> Result<PluginMethod> {
        let resolved = if path.contains('.') {
            self.methods.get(path).cloned()
        } else {
            builtin(path).map(|metric| PluginMethod {
                method: metric.method().clone(),
                needs_triggers: metric.needs_triggers(),
            })
        };
        resolved.ok_or_else(|| {
            MetricError::UnresolvedMethod {
                path: path.to_string(),
            }
            .into()
        })
    }
}

impl fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut paths: Vec<_> = self.methods.keys().collect();
        paths.sort();
        f.debug_struct("MethodTable").field("paths", &paths).finish()
    }
}

impl Metric {
    /// Build a metric from a declaration, resolving its method immediately.
    pub fn from_declaration(declaration: &MetricDeclaration, methods: &MethodTable) -> Result<Metric> {
        let plugin = methods.resolve(strip_quotes(&declaration.method))?;
        Metric::builder_from_arc(plugin.method)
            .name(strip_quotes(&declaration.name))
            .description(strip_quotes(&declaration.description))
            .unit(Unit::from(strip_quotes(&declaration.unit)))
            .needs_triggers(plugin.needs_triggers)
            .build()
    }
}
