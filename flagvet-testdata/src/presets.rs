// FlagVet Testdata - Scenario presets
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Named scenario presets with the outcome each one is built to produce.

use crate::generator::ScenarioConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scenario preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    /// Few short glitches; low deadtime, safe
    Quiet,
    /// Frequent glitches with loud triggers; high efficiency, safe
    Glitchy,
    /// Injections placed inside the glitches; unsafe
    Unsafe,
    /// Hour-long stretch at a high trigger rate, for stress tests
    Busy,
}

impl Preset {
    /// All presets.
    pub fn all() -> &'static [Preset] {
        &[Preset::Quiet, Preset::Glitchy, Preset::Unsafe, Preset::Busy]
    }

    /// Generator configuration for this preset.
    pub fn config(self, seed: u64) -> ScenarioConfig {
        let base = ScenarioConfig::new().with_seed(seed);
        match self {
            Preset::Quiet => base.with_glitches(0.001, 1.0).with_background_rate(0.2),
            Preset::Glitchy => base.with_glitches(0.02, 2.0).with_background_rate(0.5),
            Preset::Unsafe => base
                .with_glitches(0.01, 3.0)
                .with_injections(30)
                .with_coupled_injections(true),
            Preset::Busy => base
                .with_glitches(0.05, 1.0)
                .with_background_rate(50.0)
                .with_injections(200),
        }
    }

    /// Whether the safety metric should flag this preset as unsafe.
    pub fn expect_unsafe(self) -> bool {
        matches!(self, Preset::Unsafe)
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Preset::Quiet => "quiet",
            Preset::Glitchy => "glitchy",
            Preset::Unsafe => "unsafe",
            Preset::Busy => "busy",
        };
        f.write_str(name)
    }
}

/// Error for unknown preset names.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Unknown preset: {0}")]
pub struct UnknownPreset(pub String);

impl FromStr for Preset {
    type Err = UnknownPreset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::all()
            .iter()
            .copied()
            .find(|p| p.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownPreset(s.to_string()))
    }
}
