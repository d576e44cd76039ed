// FlagVet - Veto evaluation engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Evaluation configuration.
//!
//! # Example
//!
//! ```json
//! {
//!   "metrics": ["deadtime", "efficiency", "Efficiency | SNR >= 8"],
//!   "declarations": [
//!     {"name": "Volume x time", "unit": "%", "method": "vt.volume_time"}
//!   ],
//!   "min_duration": 2.0,
//!   "tag": "Locked",
//!   "safety_threshold": 0.005
//! }
//! ```

use crate::error::{Result, VetError};
use crate::evaluate::{EvaluationOptions, MetricRequest};
use crate::metric::standard::{safety_metric, SAFETY_THRESHOLD};
use crate::metric::{MethodTable, MetricDeclaration, MetricRegistry};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings for a batch of flag evaluations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Metric names or expressions, in reporting order
    pub metrics: Vec<String>,
    /// Extra metrics to register before evaluation
    pub declarations: Vec<MetricDeclaration>,
    /// Minimum gap duration kept when filling gaps (seconds)
    pub min_duration: f64,
    /// Partition tag
    pub tag: String,
    /// Channel override
    pub channel: Option<String>,
    /// Generator override
    pub etg: Option<String>,
    /// Poisson significance below which a veto is unsafe
    pub safety_threshold: f64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            metrics: vec!["deadtime".to_string()],
            declarations: Vec::new(),
            min_duration: 0.0,
            tag: String::new(),
            channel: None,
            etg: None,
            safety_threshold: SAFETY_THRESHOLD,
        }
    }
}

impl EvaluationConfig {
    /// Load configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| VetError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Export configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| VetError::Config(e.to_string()))
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| VetError::Config(format!("{}: {}", path.display(), e)))?;
        debug!("loaded evaluation config from {}", path.display());
        Self::from_json(&json)
    }

    /// Reject values no evaluation could use.
    pub fn validate(&self) -> Result<()> {
        if !self.min_duration.is_finite() || self.min_duration < 0.0 {
            return Err(VetError::Config(format!(
                "min_duration must be a non-negative number, got {}",
                self.min_duration
            )));
        }
        if !(0.0..=1.0).contains(&self.safety_threshold) {
            return Err(VetError::Config(format!(
                "safety_threshold must lie in [0, 1], got {}",
                self.safety_threshold
            )));
        }
        Ok(())
    }

    /// Per-call options for [`crate::Evaluator::evaluate_flag`].
    pub fn options(&self) -> EvaluationOptions {
        EvaluationOptions {
            min_duration: self.min_duration,
            tag: self.tag.clone(),
            channel: self.channel.clone(),
            etg: self.etg.clone(),
        }
    }

    /// Metric requests in configured order.
    pub fn requests(&self) -> Vec<MetricRequest> {
        self.metrics.iter().map(|name| MetricRequest::from(name.as_str())).collect()
    }

    /// Registry holding the standard metrics, the configured safety
    /// threshold and every declared metric.
    pub fn build_registry(&self, methods: &MethodTable) -> Result<MetricRegistry> {
        let registry = MetricRegistry::with_standard_metrics();
        if self.safety_threshold != SAFETY_THRESHOLD {
            registry.register(safety_metric(self.safety_threshold), None, true)?;
        }
        registry.register_declarations(&self.declarations, methods, false)?;
        Ok(registry)
    }
}
