// FlagVet - Veto evaluation engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Registry of metrics by case-insensitive name.
//!
//! Lookups that miss fall through to the expression factories, and every
//! metric a factory builds is memoized into the registry.

use super::declaration::{MetricDeclaration, MethodTable};
use super::factory::{self, MetricExpression};
use super::standard::standard_metrics;
use super::Metric;
use crate::error::{MetricError, Result};
use log::debug;
use std::collections::HashMap;
use std::sync::{LazyLock, PoisonError, RwLock};

static GLOBAL: LazyLock<MetricRegistry> = LazyLock::new(MetricRegistry::with_standard_metrics);

/// Map from lowercased name to [`Metric`].
#[derive(Debug, Default)]
pub struct MetricRegistry {
    metrics: RwLock<HashMap<String, Metric>>,
}

impl MetricRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the standard metrics.
    pub fn with_standard_metrics() -> Self {
        let registry = Self::new();
        {
            let mut metrics = registry.write();
            for metric in standard_metrics() {
                metrics.insert(metric.name().to_lowercase(), metric);
            }
        }
        registry
    }

    /// Process-wide registry preloaded with the standard metrics.
    pub fn global() -> &'static MetricRegistry {
        &GLOBAL
    }

    /// Register `metric` under `name` (or its own name).
    ///
    /// Fails if the name is taken, unless `force` is set. Returns the metric
    /// so registration can be chained.
    pub fn register(&self, metric: Metric, name: Option<&str>, force: bool) -> Result<Metric> {
        let name = name.unwrap_or(metric.name()).to_string();
        let key = name.to_lowercase();
        let mut metrics = self.write();
        if !force && metrics.contains_key(&key) {
            return Err(MetricError::DuplicateRegistration { name }.into());
        }
        metrics.insert(key, metric.clone());
        Ok(metric)
    }

    /// Look up a metric by name, building it from an expression if needed.
    ///
    /// Surrounding quotes and whitespace are ignored and matching is
    /// case-insensitive.
    pub fn get(&self, name: &str) -> Result<Metric> {
        let name = strip_quotes(name);
        let key = name.to_lowercase();
        if let Some(metric) = self.read().get(&key) {
            return Ok(metric.clone());
        }

        let Some(expression) = MetricExpression::parse(name)? else {
            return Err(MetricError::NotFound {
                name: name.to_string(),
            }
            .into());
        };

        let metric = factory::build(&expression, name, |base| self.get(base))?;
        debug!("built metric {:?} from expression {:?}", metric.name(), name);
        Ok(self.memoize(metric.name().to_lowercase(), metric))
    }

    /// Whether `name` is registered verbatim (factories are not consulted).
    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(&strip_quotes(name).to_lowercase())
    }

    /// All registered metrics, ordered by key.
    pub fn list_all(&self) -> Vec<Metric> {
        let metrics = self.read();
        let mut entries: Vec<_> = metrics.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter().map(|(_, m)| m.clone()).collect()
    }

    /// Number of registered metrics.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Build and register every declared metric.
    pub fn register_declarations(
        &self,
        declarations: &[MetricDeclaration],
        methods: &MethodTable,
        force: bool,
    ) -> Result<Vec<Metric>> {
        declarations
            .iter()
            .map(|declaration| {
                let metric = Metric::from_declaration(declaration, methods)?;
                self.register(metric, None, force)
            })
            .collect()
    }

    /// Insert unless already present; the stored metric wins.
    fn memoize(&self, key: String, metric: Metric) -> Metric {
        self.write().entry(key).or_insert(metric).clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Metric>> {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Metric>> {
        self.metrics.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Strip surrounding quote characters and whitespace.
pub(crate) fn strip_quotes(value: &str) -> &str {
    value.trim_matches(|c: char| c == '"' || c == '\'' || c.is_whitespace())
}
