// FlagVet - Veto evaluation engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # FlagVet - Veto evaluation engine
//!
//! Measures how well a data-quality flag removes noise transients from a
//! detector's event triggers, and how safe it is for real signals.
//!
//! ## Key Features
//!
//! - **Pluggable metrics**: any figure of merit wrapped with name, description and unit
//! - **Expression factories**: `"Efficiency | SNR >= 8"`, `"loudest event by snr"`
//! - **Partition cache**: each (channel, flag, tag, generator) split is computed once
//! - **Poisson safety**: coincidence significance against hardware injections
//!
//! ## Quick Start
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
//!
//! let mut triggers = TriggerSet::new("X1:GDS-CALIB_STRAIN", "omicron");
//! for t in [5.0, 45.0, 70.0, 95.0] {
//!     triggers.push(Trigger::new().with("peak", t).with("snr", 8.0));
//! }
//!
//! let evaluator = Evaluator::standard();
//! let evaluation = evaluator
//!     .evaluate_flag(
//!         &flag,
//!         Some(&triggers),
//!         &["Efficiency/Deadtime".into()],
//!         None,
//!         &EvaluationOptions::default(),
//!     )
//!     .unwrap();
//!
//! let ratio = evaluation.results.get("Efficiency/Deadtime").unwrap();
//! assert_eq!(ratio.as_f64(), Some(2.5));
//! ```
//!
//! ## Modules
//!
//! - [`segments`]: Half-open intervals and coalesced interval sets
//! - [`flag`]: Known/active segment pairs
//! - [`triggers`]: Trigger tables and column filters
//! - [`etg`]: Column conventions of event trigger generators
//! - [`metric`]: Metric abstraction, registry, factories and standard metrics
//! - [`veto`]: Cached veto partitioning
//! - [`evaluate`]: The evaluation engine
//! - [`config`]: Serializable evaluation settings

// Modules
pub mod config;
pub mod error;
pub mod etg;
pub mod evaluate;
pub mod flag;
pub mod metric;
pub mod segments;
pub mod triggers;
pub mod unit;
pub mod veto;

// Re-exports for convenient access
pub use config::EvaluationConfig;
pub use error::{MetricError, Result, SegmentError, TriggerError, VetError};
pub use etg::{canonical_etg_name, etg_parameters, EtgParameters};
pub use evaluate::{Evaluation, EvaluationOptions, EvaluationResults, Evaluator, MetricRequest};
pub use flag::Flag;
pub use metric::factory::{threshold_metric, MetricExpression};
pub use metric::standard::SAFETY_THRESHOLD;
pub use metric::{
    evaluate_all, score_fn, Measurement, MethodTable, Metric, MetricArgs, MetricBuilder,
    MetricDeclaration, MetricRegistry, MetricValue, ScoreFn,
};
pub use segments::{Interval, IntervalSet};
pub use triggers::{Comparison, Trigger, TriggerSet};
pub use unit::Unit;
pub use veto::{veto_tag, PartitionCache, VetoMode};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
