// FlagVet - Veto evaluation engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Veto partitioning with a result cache.
//!
//! Applying a flag to a trigger set splits it into the triggers the veto
//! removes and the ones that survive. The split is cached under the identity
//! `(channel, flag, tag, etg)`: each identity is scanned at most once for the
//! life of the cache, even when several threads ask for it at the same time.

use crate::error::Result;
use crate::flag::Flag;
use crate::triggers::TriggerSet;
use log::debug;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// Channel tag used when neither the caller nor the trigger set names one.
pub const UNKNOWN_CHANNEL: &str = "unknown-channel";

/// Generator tag used when neither the caller nor the trigger set names one.
pub const UNKNOWN_ETG: &str = "unknown-etg";

/// Which side of a veto a trigger set holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VetoMode {
    /// Triggers outside the active segments
    After,
    /// Triggers inside the active segments
    Vetoed,
}

impl VetoMode {
    /// Separator between channel and flag name in a veto tag.
    pub fn operator(self) -> char {
        match self {
            VetoMode::After => '#',
            VetoMode::Vetoed => '@',
        }
    }
}

/// Display tag for a vetoed channel: `<channel><op><flag>[,<tag>]`.
///
/// `|`, `:` and `&` in the flag name become `-`; an empty `tag` is omitted.
pub fn veto_tag(channel: &str, flag_name: &str, tag: &str, mode: VetoMode) -> String {
    let flag_name: String = flag_name
        .chars()
        .map(|c| if matches!(c, '|' | ':' | '&') { '-' } else { c })
        .collect();
    if tag.is_empty() {
        format!("{channel}{}{flag_name}", mode.operator())
    } else {
        format!("{channel}{}{flag_name},{tag}", mode.operator())
    }
}

/// Cache key for one side of a partition.
pub fn partition_key(channel: &str, flag_name: &str, tag: &str, etg: &str, mode: VetoMode) -> String {
    format!(
        "{},{}",
        veto_tag(channel, flag_name, tag, mode),
        etg.to_lowercase()
    )
}

/// Cache of veto partitions, keyed by [`partition_key`].
#[derive(Default)]
pub struct PartitionCache {
    entries: RwLock<HashMap<String, Arc<TriggerSet>>>,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    scans: AtomicU64,
}

impl PartitionCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Triggers surviving `flag`, computed at most once per identity.
    ///
    /// `channel` and `etg` default to the trigger set's own tags. On a miss
    /// the triggers are split by the flag's active segments; the vetoed
    /// rows are stored with `active` as their defining segments and the
    /// survivors with `known - active`.
    pub fn partition(
        &self,
        triggers: &TriggerSet,
        flag: &Flag,
        tag: &str,
        channel: Option<&str>,
        etg: Option<&str>,
    ) -> Result<Arc<TriggerSet>> {
        let channel = resolve_tag(channel, triggers.channel(), UNKNOWN_CHANNEL);
        let etg = resolve_tag(etg, triggers.etg(), UNKNOWN_ETG);
        let after_key = partition_key(channel, flag.name(), tag, etg, VetoMode::After);

        if let Some(hit) = self.cached(&after_key) {
            debug!("partition cache hit for {after_key:?}");
            return Ok(hit);
        }

        let guard = self.guard_for(&after_key);
        let _held = guard.lock().unwrap_or_else(PoisonError::into_inner);
        let outcome = self.split_and_store(triggers, flag, tag, channel, etg, &after_key);
        // released on every path, failed scans included
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&after_key);
        outcome
    }

    fn split_and_store(
        &self,
        triggers: &TriggerSet,
        flag: &Flag,
        tag: &str,
        channel: &str,
        etg: &str,
        after_key: &str,
    ) -> Result<Arc<TriggerSet>> {
        // another caller may have finished while we waited
        if let Some(hit) = self.cached(after_key) {
            debug!("partition cache hit for {after_key:?} after wait");
            return Ok(hit);
        }

        let (vetoed, after) = triggers.split(flag.active())?;
        self.scans.fetch_add(1, Ordering::Relaxed);

        let vetoed = Arc::new(vetoed.with_segments(flag.active().clone()));
        let after = Arc::new(after.with_segments(flag.gaps()));
        let vetoed_key = partition_key(channel, flag.name(), tag, etg, VetoMode::Vetoed);
        debug!(
            "partitioned {} triggers for {after_key:?}: {} vetoed, {} survive",
            triggers.len(),
            vetoed.len(),
            after.len()
        );

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(after_key.to_string(), Arc::clone(&after));
        entries.insert(vetoed_key, vetoed);
        Ok(after)
    }

    /// Vetoed triggers of a partition computed earlier, if any.
    pub fn vetoed(
        &self,
        channel: &str,
        flag_name: &str,
        tag: &str,
        etg: &str,
    ) -> Option<Arc<TriggerSet>> {
        self.cached(&partition_key(channel, flag_name, tag, etg, VetoMode::Vetoed))
    }

    /// Look up any cached partition by key.
    pub fn cached(&self, key: &str) -> Option<Arc<TriggerSet>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Number of cached partitions (two per identity).
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of trigger scans performed so far.
    pub fn scan_count(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    /// Number of partitions currently being computed.
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Drop every cached partition.
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn guard_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(in_flight.entry(key.to_string()).or_default())
    }
}

impl fmt::Debug for PartitionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionCache")
            .field("entries", &self.len())
            .field("scans", &self.scan_count())
            .finish()
    }
}

fn resolve_tag<'a>(explicit: Option<&'a str>, own: &'a str, fallback: &'a str) -> &'a str {
    match explicit {
        Some(tag) if !tag.is_empty() => tag,
        _ if !own.is_empty() => own,
        _ => fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::IntervalSet;
    use crate::triggers::Trigger;
    use std::thread;

    fn set(pairs: &[(f64, f64)]) -> IntervalSet {
        IntervalSet::from_pairs(pairs).unwrap()
    }

    fn scenario() -> (Flag, TriggerSet) {
        let flag = Flag::new("X1:DCH-GLITCH:1", set(&[(0.0, 100.0)]), set(&[(40.0, 50.0)])).unwrap();
        let triggers = TriggerSet::from_rows(
            "X1:GDS-CALIB_STRAIN",
            "Omicron",
            [5.0, 45.0, 70.0, 95.0]
                .iter()
                .map(|&t| Trigger::new().with("peak", t).with("snr", t / 5.0)),
        );
        (flag, triggers)
    }

    #[test]
    fn test_veto_tag_format() {
        assert_eq!(
            veto_tag("X1:CHAN", "X1:FLAG|B&C", "", VetoMode::After),
            "X1:CHAN#X1-FLAG-B-C"
        );
        assert_eq!(
            veto_tag("X1:CHAN", "FLAG", "Locked", VetoMode::Vetoed),
            "X1:CHAN@FLAG,Locked"
        );
        assert_eq!(
            partition_key("X1:CHAN", "FLAG", "", "Omicron", VetoMode::After),
            "X1:CHAN#FLAG,omicron"
        );
    }

    #[test]
    fn test_partition_splits_and_annotates() {
        let (flag, triggers) = scenario();
        let cache = PartitionCache::new();
        let after = cache.partition(&triggers, &flag, "", None, None).unwrap();

        assert_eq!(after.times().unwrap(), vec![5.0, 70.0, 95.0]);
        assert_eq!(after.segments(), Some(&set(&[(0.0, 40.0), (50.0, 100.0)])));

        let vetoed = cache
            .vetoed("X1:GDS-CALIB_STRAIN", flag.name(), "", "omicron")
            .unwrap();
        assert_eq!(vetoed.times().unwrap(), vec![45.0]);
        assert_eq!(vetoed.segments(), Some(flag.active()));
        assert_eq!(cache.len(), 2);
        assert_eq!(triggers.len(), 4);
    }

    #[test]
    fn test_second_partition_is_served_from_cache() {
        let (flag, triggers) = scenario();
        let cache = PartitionCache::new();
        let first = cache.partition(&triggers, &flag, "", None, None).unwrap();
        let second = cache.partition(&triggers, &flag, "", None, None).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.scan_count(), 1);

        // a different tag is a different identity
        cache.partition(&triggers, &flag, "Locked", None, None).unwrap();
        assert_eq!(cache.scan_count(), 2);
    }

    #[test]
    fn test_empty_inputs() {
        let (flag, triggers) = scenario();
        let cache = PartitionCache::new();

        let empty_flag = Flag::new("EMPTY", set(&[(0.0, 100.0)]), IntervalSet::new()).unwrap();
        let after = cache.partition(&triggers, &empty_flag, "", None, None).unwrap();
        assert_eq!(after.len(), 4);

        let no_triggers = TriggerSet::new("X1:OTHER", "omicron");
        let after = cache.partition(&no_triggers, &flag, "", None, None).unwrap();
        assert!(after.is_empty());
        assert!(cache.vetoed("X1:OTHER", flag.name(), "", "omicron").unwrap().is_empty());
    }

    #[test]
    fn test_missing_time_column_propagates() {
        let (flag, _) = scenario();
        let triggers = TriggerSet::from_rows("X1:CHAN", "omicron", [Trigger::new().with("snr", 3.0)]);
        let cache = PartitionCache::new();
        assert!(cache.partition(&triggers, &flag, "", None, None).is_err());
        assert!(cache.is_empty());
        assert_eq!(cache.in_flight_len(), 0);

        // a failed scan does not block a later one for the same identity
        assert!(cache.partition(&triggers, &flag, "", None, None).is_err());
        assert_eq!(cache.in_flight_len(), 0);
        assert_eq!(cache.scan_count(), 0);
    }

    #[test]
    fn test_concurrent_partition_scans_once() {
        let (flag, triggers) = scenario();
        let cache = PartitionCache::new();
        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| cache.partition(&triggers, &flag, "", None, None).unwrap());
            }
        });
        assert_eq!(cache.scan_count(), 1);
        assert_eq!(cache.in_flight_len(), 0);
    }
}
