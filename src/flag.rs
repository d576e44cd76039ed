// FlagVet - Veto evaluation engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Data-quality flags: a named pair of `known` and `active` interval sets.

use crate::error::SegmentError;
use crate::segments::IntervalSet;
use serde::{Deserialize, Serialize};

/// A candidate veto.
///
/// `known` is the time during which the condition was monitored, `active`
/// the time during which it held. `active` is always contained in `known`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFlag")]
pub struct Flag {
    name: String,
    known: IntervalSet,
    active: IntervalSet,
}

/// Unchecked wire form of [`Flag`].
#[derive(Deserialize)]
struct RawFlag {
    name: String,
    known: IntervalSet,
    active: IntervalSet,
}

impl TryFrom<RawFlag> for Flag {
    type Error = SegmentError;

    fn try_from(raw: RawFlag) -> Result<Self, Self::Error> {
        Flag::new(raw.name, raw.known, raw.active)
    }
}

impl Flag {
    /// Create a flag, checking that `active` lies inside `known`.
    pub fn new(
        name: impl Into<String>,
        known: IntervalSet,
        active: IntervalSet,
    ) -> Result<Self, SegmentError> {
        let name = name.into();
        if !active.is_subset_of(&known) {
            return Err(SegmentError::ActiveOutsideKnown { name });
        }
        Ok(Self {
            name,
            known,
            active,
        })
    }

    /// Wrap a bare interval set; the flag is known exactly where it is active.
    pub fn from_active(name: impl Into<String>, active: IntervalSet) -> Self {
        Self {
            name: name.into(),
            known: active.clone(),
            active,
        }
    }

    /// Flag name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Monitored time.
    pub fn known(&self) -> &IntervalSet {
        &self.known
    }

    /// Vetoed time.
    pub fn active(&self) -> &IntervalSet {
        &self.active
    }

    /// Rename the flag.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Time that was analysed but not vetoed (`known - active`).
    pub fn gaps(&self) -> IntervalSet {
        self.known.difference(&self.active)
    }

    /// Total monitored duration.
    pub fn livetime(&self) -> f64 {
        self.known.duration()
    }

    /// Keep the veto active across short gaps.
    ///
    /// Gaps in `active` shorter than `min_duration` are absorbed, so `active`
    /// becomes `known` minus the gaps that are at least `min_duration` long.
    /// A non-positive `min_duration` returns the flag unchanged.
    pub fn fill_short_gaps(&self, min_duration: f64) -> Flag {
        if min_duration <= 0.0 {
            return self.clone();
        }
        let long_gaps = self.gaps().retain_min_duration(min_duration);
        Flag {
            name: self.name.clone(),
            active: self.known.difference(&long_gaps),
            known: self.known.clone(),
        }
    }

    /// Combine two flags: known and active are both unioned.
    pub fn union(&self, other: &Flag) -> Flag {
        Flag {
            name: format!("{} | {}", self.name, other.name),
            known: self.known.union(&other.known),
            active: self.active.union(&other.active),
        }
    }

    /// Restrict two flags to their common state: known and active are both
    /// intersected.
    pub fn intersection(&self, other: &Flag) -> Flag {
        Flag {
            name: format!("{} & {}", self.name, other.name),
            known: self.known.intersection(&other.known),
            active: self.active.intersection(&other.active),
        }
    }

    /// Union of many flags under a new name, as used when several veto
    /// definitions are evaluated together.
    pub fn union_all<'a>(name: impl Into<String>, flags: impl IntoIterator<Item = &'a Flag>) -> Flag {
        let mut combined = Flag::default();
        for flag in flags {
            combined.known = combined.known.union(&flag.known);
            combined.active = combined.active.union(&flag.active);
        }
        combined.name = name.into();
        combined
    }
}

impl From<IntervalSet> for Flag {
    fn from(active: IntervalSet) -> Self {
        Flag::from_active("", active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(pairs: &[(f64, f64)]) -> IntervalSet {
        IntervalSet::from_pairs(pairs).unwrap()
    }

    #[test]
    fn test_active_must_be_known() {
        let err = Flag::new("X1:BAD:1", set(&[(0.0, 10.0)]), set(&[(5.0, 15.0)])).unwrap_err();
        assert!(matches!(err, SegmentError::ActiveOutsideKnown { .. }));
    }

    #[test]
    fn test_deserialize_checks_active_inside_known() {
        let json = r#"{"name": "F", "known": [{"start": 0, "end": 10}], "active": [{"start": 0, "end": 50}]}"#;
        let err = serde_json::from_str::<Flag>(json).unwrap_err();
        assert!(err.to_string().contains("outside its known segments"), "{err}");

        let json = r#"{"name": "F", "known": [{"start": 0, "end": 10}], "active": [{"start": 2, "end": 5}]}"#;
        let flag: Flag = serde_json::from_str(json).unwrap();
        assert_eq!(flag.active(), &set(&[(2.0, 5.0)]));
    }

    #[test]
    fn test_from_active_is_fully_known() {
        let flag = Flag::from(set(&[(0.0, 5.0)]));
        assert_eq!(flag.known(), flag.active());
        assert!(flag.gaps().is_empty());
    }

    #[test]
    fn test_fill_short_gaps() {
        let flag = Flag::new(
            "X1:GLITCH:1",
            set(&[(0.0, 100.0)]),
            set(&[(10.0, 20.0), (21.0, 30.0), (60.0, 70.0)]),
        )
        .unwrap();

        let trimmed = flag.fill_short_gaps(5.0);
        // the one-second gap at 20 is absorbed; the gaps at 0, 30 and 70 survive
        assert_eq!(trimmed.active(), &set(&[(10.0, 30.0), (60.0, 70.0)]));
        assert!(trimmed.active().is_subset_of(trimmed.known()));
        assert_eq!(flag.active().len(), 3);
    }

    #[test]
    fn test_fill_short_gaps_swallows_short_edges() {
        let flag = Flag::new("X1:EDGE:1", set(&[(0.0, 100.0)]), set(&[(2.0, 99.0)])).unwrap();
        let trimmed = flag.fill_short_gaps(5.0);
        assert_eq!(trimmed.active(), &set(&[(0.0, 100.0)]));
    }

    #[test]
    fn test_union_all() {
        let a = Flag::new("A", set(&[(0.0, 50.0)]), set(&[(10.0, 20.0)])).unwrap();
        let b = Flag::new("B", set(&[(40.0, 100.0)]), set(&[(60.0, 70.0)])).unwrap();
        let combined = Flag::union_all("A+B", [&a, &b]);
        assert_eq!(combined.name(), "A+B");
        assert_eq!(combined.known(), &set(&[(0.0, 100.0)]));
        assert_eq!(combined.active(), &set(&[(10.0, 20.0), (60.0, 70.0)]));
        assert_eq!(a.union(&b).active(), combined.active());
    }
}
