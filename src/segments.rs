// FlagVet - Veto evaluation engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Half-open time intervals and coalesced interval sets.
//!
//! Every [`IntervalSet`] is kept sorted, non-overlapping and coalesced, so the
//! set operations can walk both operands in a single pass.

use crate::error::SegmentError;
use serde::{Deserialize, Serialize};
use std::ops::{BitAnd, BitOr, Sub};

/// A half-open `[start, end)` interval of GPS-like timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawInterval")]
pub struct Interval {
    /// Inclusive start
    pub start: f64,
    /// Exclusive end
    pub end: f64,
}

/// Unchecked wire form of [`Interval`].
#[derive(Deserialize)]
struct RawInterval {
    start: f64,
    end: f64,
}

impl TryFrom<RawInterval> for Interval {
    type Error = SegmentError;

    fn try_from(raw: RawInterval) -> Result<Self, Self::Error> {
        Interval::new(raw.start, raw.end)
    }
}

impl Interval {
    /// Create a new interval, rejecting reversed or non-finite bounds.
    pub fn new(start: f64, end: f64) -> Result<Self, SegmentError> {
        if !start.is_finite() || !end.is_finite() || end < start {
            return Err(SegmentError::InvalidInterval { start, end });
        }
        Ok(Self { start, end })
    }

    /// Length of the interval in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// Whether `t` lies in `[start, end)`.
    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }

    /// Whether the two intervals share time.
    ///
    /// A zero-length interval intersects another only when it lies strictly
    /// inside it.
    pub fn intersects(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Sorted, non-overlapping, coalesced list of intervals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Interval>", into = "Vec<Interval>")]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl IntervalSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from arbitrary intervals, coalescing overlaps.
    pub fn from_intervals(intervals: impl IntoIterator<Item = Interval>) -> Self {
        let mut intervals: Vec<Interval> = intervals.into_iter().collect();
        intervals.sort_by(|a, b| a.start.total_cmp(&b.start).then(a.end.total_cmp(&b.end)));

        let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
        for interval in intervals {
            match merged.last_mut() {
                Some(last) if interval.start <= last.end => {
                    last.end = last.end.max(interval.end);
                }
                _ => merged.push(interval),
            }
        }
        Self { intervals: merged }
    }

    /// Build a set from `(start, end)` pairs.
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Result<Self, SegmentError> {
        let intervals = pairs
            .iter()
            .map(|&(start, end)| Interval::new(start, end))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_intervals(intervals))
    }

    /// Number of intervals after coalescing.
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// Whether the set holds no intervals.
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Iterate over the intervals in time order.
    pub fn iter(&self) -> std::slice::Iter<'_, Interval> {
        self.intervals.iter()
    }

    /// The intervals as a slice.
    pub fn as_slice(&self) -> &[Interval] {
        &self.intervals
    }

    /// Total covered duration (the `abs` of the set).
    pub fn duration(&self) -> f64 {
        self.intervals.iter().map(Interval::duration).sum()
    }

    /// Smallest interval covering the whole set.
    pub fn extent(&self) -> Option<Interval> {
        let first = self.intervals.first()?;
        let last = self.intervals.last()?;
        Some(Interval {
            start: first.start,
            end: last.end,
        })
    }

    /// Whether `t` falls inside any interval.
    pub fn contains(&self, t: f64) -> bool {
        let idx = self.intervals.partition_point(|iv| iv.end <= t);
        self.intervals
            .get(idx)
            .is_some_and(|interval| interval.contains(t))
    }

    /// Whether any interval of the set shares time with `interval`.
    pub fn intersects(&self, interval: &Interval) -> bool {
        let idx = self.intervals.partition_point(|iv| iv.end <= interval.start);
        self.intervals[idx..]
            .iter()
            .take_while(|iv| iv.start < interval.end)
            .any(|iv| iv.intersects(interval))
    }

    /// Union of the two sets.
    pub fn union(&self, other: &IntervalSet) -> IntervalSet {
        Self::from_intervals(self.intervals.iter().chain(other.intervals.iter()).copied())
    }

    /// Time covered by both sets.
    pub fn intersection(&self, other: &IntervalSet) -> IntervalSet {
        let (a, b) = (&self.intervals, &other.intervals);
        let (mut i, mut j) = (0, 0);
        let mut out = Vec::new();

        while i < a.len() && j < b.len() {
            let start = a[i].start.max(b[j].start);
            let end = a[i].end.min(b[j].end);
            if start < end {
                out.push(Interval { start, end });
            }
            if a[i].end < b[j].end {
                i += 1;
            } else {
                j += 1;
            }
        }
        Self::from_intervals(out)
    }

    /// Time covered by `self` but not by `other`.
    pub fn difference(&self, other: &IntervalSet) -> IntervalSet {
        let others = &other.intervals;
        let mut out = Vec::new();
        let mut j = 0;

        for interval in &self.intervals {
            let mut cursor = interval.start;
            while j < others.len() && others[j].end <= cursor {
                j += 1;
            }
            let mut k = j;
            while k < others.len() && others[k].start < interval.end {
                if others[k].start > cursor {
                    out.push(Interval {
                        start: cursor,
                        end: others[k].start,
                    });
                }
                cursor = cursor.max(others[k].end);
                k += 1;
            }
            if cursor < interval.end {
                out.push(Interval {
                    start: cursor,
                    end: interval.end,
                });
            }
        }
        Self::from_intervals(out)
    }

    /// Whether every instant of `self` is covered by `other`.
    pub fn is_subset_of(&self, other: &IntervalSet) -> bool {
        self.difference(other).is_empty()
    }

    /// Keep only intervals at least `min_duration` long.
    pub fn retain_min_duration(&self, min_duration: f64) -> IntervalSet {
        Self {
            intervals: self
                .intervals
                .iter()
                .filter(|iv| iv.duration() >= min_duration)
                .copied()
                .collect(),
        }
    }
}

impl From<Vec<Interval>> for IntervalSet {
    fn from(intervals: Vec<Interval>) -> Self {
        Self::from_intervals(intervals)
    }
}

impl From<IntervalSet> for Vec<Interval> {
    fn from(set: IntervalSet) -> Self {
        set.intervals
    }
}

impl FromIterator<Interval> for IntervalSet {
    fn from_iter<I: IntoIterator<Item = Interval>>(iter: I) -> Self {
        Self::from_intervals(iter)
    }
}

impl<'a> IntoIterator for &'a IntervalSet {
    type Item = &'a Interval;
    type IntoIter = std::slice::Iter<'a, Interval>;

    fn into_iter(self) -> Self::IntoIter {
        self.intervals.iter()
    }
}

impl BitOr for &IntervalSet {
    type Output = IntervalSet;

    fn bitor(self, rhs: Self) -> IntervalSet {
        self.union(rhs)
    }
}

impl BitAnd for &IntervalSet {
    type Output = IntervalSet;

    fn bitand(self, rhs: Self) -> IntervalSet {
        self.intersection(rhs)
    }
}

impl Sub for &IntervalSet {
    type Output = IntervalSet;

    fn sub(self, rhs: Self) -> IntervalSet {
        self.difference(rhs)
    }
}
