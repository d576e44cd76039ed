// FlagVet Testdata - Scenario generator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # FlagVet Testdata
//!
//! Seeded scenario generator for FlagVet tests and benchmarks.
//!
//! A [`Scenario`] bundles a glitch flag, a trigger table over its known
//! segment and a set of injection intervals.
//!
//! ## Quick Start
//!
//! ```rust
//! use flagvet_testdata::{generate_scenario, Preset};
//!
//! let scenario = generate_scenario(&Preset::Glitchy.config(42)).unwrap();
//! assert!(scenario.flag.active().is_subset_of(scenario.flag.known()));
//! ```

pub mod generator;
pub mod presets;

// Re-exports for convenience
pub use generator::{generate_scenario, Scenario, ScenarioConfig};
pub use presets::{Preset, UnknownPreset};
