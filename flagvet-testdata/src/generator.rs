// FlagVet Testdata - Core generator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Core scenario generation logic.
//!
//! A scenario is one analysis stretch: a glitch flag whose active segments
//! follow a Poisson process, a trigger table mixing Gaussian-noise
//! background with loud glitch triggers, and a set of injection intervals.

use flagvet::{etg_parameters, Flag, Interval, IntervalSet, SegmentError, Trigger, TriggerSet};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::{Exp, Pareto, Uniform};
use serde::{Deserialize, Serialize};

/// Generator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Start of the known segment (GPS seconds).
    pub start: f64,
    /// Length of the known segment in seconds.
    pub duration: f64,
    /// Mean number of glitches per second.
    pub glitch_rate: f64,
    /// Mean glitch length in seconds.
    pub glitch_duration: f64,
    /// Mean number of background triggers per second.
    pub background_rate: f64,
    /// Triggers emitted inside each glitch.
    pub triggers_per_glitch: usize,
    /// Number of injection intervals.
    pub injection_count: usize,
    /// Length of each injection interval in seconds.
    pub injection_duration: f64,
    /// Place every injection inside the flag's active time.
    pub coupled_injections: bool,
    /// Flag name.
    pub flag_name: String,
    /// Trigger channel.
    pub channel: String,
    /// Trigger generator.
    pub etg: String,
    /// Random seed for reproducibility.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            start: 1_000_000_000.0,
            duration: 3600.0,
            glitch_rate: 0.005,
            glitch_duration: 2.0,
            background_rate: 0.5,
            triggers_per_glitch: 5,
            injection_count: 20,
            injection_duration: 1.0,
            coupled_injections: false,
            flag_name: "X1:DCH-GLITCH:1".to_string(),
            channel: "X1:GDS-CALIB_STRAIN".to_string(),
            etg: "omicron".to_string(),
            seed: None,
        }
    }
}

impl ScenarioConfig {
    /// Create a new scenario config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the known segment.
    pub fn with_span(mut self, start: f64, duration: f64) -> Self {
        self.start = start;
        self.duration = duration;
        self
    }

    /// Set glitch rate (per second) and mean length (seconds).
    pub fn with_glitches(mut self, rate: f64, mean_duration: f64) -> Self {
        self.glitch_rate = rate;
        self.glitch_duration = mean_duration;
        self
    }

    /// Set background trigger rate (per second).
    pub fn with_background_rate(mut self, rate: f64) -> Self {
        self.background_rate = rate;
        self
    }

    /// Set the number of injections.
    pub fn with_injections(mut self, count: usize) -> Self {
        self.injection_count = count;
        self
    }

    /// Place injections inside glitches, making the flag unsafe.
    pub fn with_coupled_injections(mut self, coupled: bool) -> Self {
        self.coupled_injections = coupled;
        self
    }

    /// Set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// End of the known segment.
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Generated inputs for one flag evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// The glitch flag.
    pub flag: Flag,
    /// Triggers over the known segment.
    pub triggers: TriggerSet,
    /// Injection intervals.
    pub injections: IntervalSet,
}

impl Scenario {
    /// Serialize to JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Parse from JSON.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Generate a scenario from configuration.
pub fn generate_scenario(config: &ScenarioConfig) -> Result<Scenario, SegmentError> {
    let mut rng = match config.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };

    let known = IntervalSet::from(vec![Interval::new(config.start, config.end())?]);
    let glitches = glitch_intervals(config, &mut rng)?;
    let active = glitches.intersection(&known);
    let flag = Flag::new(config.flag_name.clone(), known, active)?;

    let triggers = generate_triggers(config, &flag, &mut rng);
    let injections = generate_injections(config, &flag, &mut rng)?;

    Ok(Scenario {
        flag,
        triggers,
        injections,
    })
}

fn glitch_intervals(config: &ScenarioConfig, rng: &mut StdRng) -> Result<IntervalSet, SegmentError> {
    let mut intervals = Vec::new();
    let (Ok(spacing), Ok(length)) = (Exp::new(config.glitch_rate), Exp::new(1.0 / config.glitch_duration))
    else {
        return Ok(IntervalSet::new());
    };

    let mut t = config.start + spacing.sample(rng);
    while t < config.end() {
        let len: f64 = length.sample(rng);
        intervals.push(Interval::new(t, t + len.max(1e-3))?);
        t += spacing.sample(rng);
    }
    Ok(IntervalSet::from_intervals(intervals))
}

fn generate_triggers(config: &ScenarioConfig, flag: &Flag, rng: &mut StdRng) -> TriggerSet {
    let params = etg_parameters(&config.etg, None);
    let mut triggers = TriggerSet::new(config.channel.clone(), config.etg.clone());

    let background_snr = Pareto::new(5.5, 3.0).ok();
    let frequency = Uniform::new(10.0, 2048.0);
    let count = if config.duration > 0.0 {
        (config.background_rate * config.duration).round() as usize
    } else {
        0
    };

    let span = Interval {
        start: config.start,
        end: config.end(),
    };
    let mut rows: Vec<Trigger> = Vec::with_capacity(count);
    for _ in 0..count {
        let snr = background_snr.as_ref().map_or(5.5, |d| d.sample(rng));
        let time = offset_in(&span, rng.gen_range(0.0..config.duration));
        rows.push(
            Trigger::new()
                .with(&params.time, time)
                .with(&params.frequency, frequency.sample(rng))
                .with(&params.snr, snr),
        );
    }

    let loud_snr = Pareto::new(20.0, 1.5).ok();
    for glitch in flag.active().iter().filter(|g| g.duration() > 0.0) {
        let length = glitch.duration();
        for _ in 0..config.triggers_per_glitch {
            let snr = loud_snr.as_ref().map_or(20.0, |d| d.sample(rng));
            let time = offset_in(glitch, rng.gen_range(0.0..length));
            rows.push(
                Trigger::new()
                    .with(&params.time, time)
                    .with(&params.frequency, frequency.sample(rng))
                    .with(&params.snr, snr),
            );
        }
    }

    rows.sort_by(|a, b| {
        let ta = a.get(&params.time).unwrap_or(f64::NAN);
        let tb = b.get(&params.time).unwrap_or(f64::NAN);
        ta.total_cmp(&tb)
    });
    for row in rows {
        triggers.push(row);
    }
    triggers
}

/// Time `offset` seconds into `interval`.
///
/// Times are drawn as offsets because a uniform range between two large GPS
/// bounds a few ULPs apart degenerates. A sum that rounds up to `end` falls
/// back to `start` so the result stays half-open.
fn offset_in(interval: &Interval, offset: f64) -> f64 {
    let t = interval.start + offset;
    if t < interval.end {
        t
    } else {
        interval.start
    }
}

fn generate_injections(
    config: &ScenarioConfig,
    flag: &Flag,
    rng: &mut StdRng,
) -> Result<IntervalSet, SegmentError> {
    let mut intervals = Vec::with_capacity(config.injection_count);
    let targets: Vec<Interval> = if config.coupled_injections && !flag.active().is_empty() {
        flag.active().iter().copied().collect()
    } else {
        flag.known().iter().copied().collect()
    };
    if targets.is_empty() {
        return Ok(IntervalSet::new());
    }

    for _ in 0..config.injection_count {
        let Some(target) = targets.choose(rng) else {
            break;
        };
        let start = if target.duration() > 0.0 {
            offset_in(target, rng.gen_range(0.0..target.duration()))
        } else {
            target.start
        };
        intervals.push(Interval::new(start, start + config.injection_duration)?);
    }
    Ok(IntervalSet::from_intervals(intervals))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let config = ScenarioConfig::new().with_seed(42);
        let a = generate_scenario(&config).unwrap();
        let b = generate_scenario(&config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_active_inside_known() {
        let config = ScenarioConfig::new().with_glitches(0.05, 5.0).with_seed(7);
        let scenario = generate_scenario(&config).unwrap();
        assert!(scenario.flag.active().is_subset_of(scenario.flag.known()));
        assert!(!scenario.flag.active().is_empty());
    }

    #[test]
    fn test_triggers_sorted_and_in_span() {
        let config = ScenarioConfig::new().with_seed(3);
        let scenario = generate_scenario(&config).unwrap();
        let times = scenario.triggers.times().unwrap();
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
        assert!(times.iter().all(|&t| t >= config.start && t < config.end()));
    }

    #[test]
    fn test_coupled_injections_overlap_active() {
        let config = ScenarioConfig::new()
            .with_glitches(0.02, 4.0)
            .with_coupled_injections(true)
            .with_seed(11);
        let scenario = generate_scenario(&config).unwrap();
        assert!(scenario
            .injections
            .iter()
            .all(|inj| scenario.flag.active().intersects(inj)));
    }

    #[test]
    fn test_short_glitches_at_large_gps_times() {
        let config = ScenarioConfig::new()
            .with_span(1_000_000_000.0, 600.0)
            .with_glitches(0.5, 0.01)
            .with_background_rate(0.0)
            .with_coupled_injections(true)
            .with_seed(13);
        let scenario = generate_scenario(&config).unwrap();
        let active = scenario.flag.active();
        assert!(active.len() > 100);

        let times = scenario.triggers.times().unwrap();
        assert_eq!(times.len(), active.len() * config.triggers_per_glitch);
        assert!(times.iter().all(|&t| active.contains(t)));
        assert!(scenario.injections.iter().all(|inj| active.intersects(inj)));
    }

    #[test]
    fn test_offset_in_stays_half_open() {
        let interval = Interval::new(1_000_000_000.0, 1_000_000_000.001).unwrap();
        assert_eq!(offset_in(&interval, 0.0), interval.start);
        assert_eq!(offset_in(&interval, interval.duration()), interval.start);
        assert!(interval.contains(offset_in(&interval, 0.0005)));
    }

    #[test]
    fn test_zero_glitch_rate() {
        let config = ScenarioConfig::new().with_glitches(0.0, 1.0).with_seed(1);
        let scenario = generate_scenario(&config).unwrap();
        assert!(scenario.flag.active().is_empty());
    }

    #[test]
    fn test_scenario_json_file_roundtrip() {
        let scenario = generate_scenario(&ScenarioConfig::new().with_span(0.0, 60.0).with_seed(5)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenario.json");
        std::fs::write(&path, scenario.to_json().unwrap()).unwrap();

        let loaded = Scenario::from_json(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.flag.name(), scenario.flag.name());
        assert_eq!(loaded.flag.active().len(), scenario.flag.active().len());
        assert_eq!(loaded.triggers.len(), scenario.triggers.len());
        assert_eq!(loaded.injections.len(), scenario.injections.len());
    }
}
