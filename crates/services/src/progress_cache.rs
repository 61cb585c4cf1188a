use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::NaiveDate;

use nisen_core::model::ModuleId;
use nisen_core::stats::{Accuracy, ModuleProgress, ProgressSnapshot};

use crate::event_store::EventLog;

/// Identifies one memoized statistic.
///
/// Date-dependent statistics carry the day they were computed for, so a
/// midnight rollover misses the cache even without a new event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StatKey {
    TotalLearned,
    Accuracy,
    ModuleAccuracy(ModuleId),
    Streak(NaiveDate),
    ModuleProgress(ModuleId),
    Snapshot(NaiveDate),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatValue {
    Count(usize),
    Accuracy(Accuracy),
    Streak(u32),
    Progress(ModuleProgress),
    Snapshot(ProgressSnapshot),
}

/// A statistic type that can live in the cache.
pub trait CachedStat: Clone {
    fn into_value(self) -> StatValue;
    fn from_value(value: StatValue) -> Option<Self>;
}

impl CachedStat for usize {
    fn into_value(self) -> StatValue {
        StatValue::Count(self)
    }

    fn from_value(value: StatValue) -> Option<Self> {
        match value {
            StatValue::Count(n) => Some(n),
            _ => None,
        }
    }
}

impl CachedStat for u32 {
    fn into_value(self) -> StatValue {
        StatValue::Streak(self)
    }

    fn from_value(value: StatValue) -> Option<Self> {
        match value {
            StatValue::Streak(n) => Some(n),
            _ => None,
        }
    }
}

impl CachedStat for Accuracy {
    fn into_value(self) -> StatValue {
        StatValue::Accuracy(self)
    }

    fn from_value(value: StatValue) -> Option<Self> {
        match value {
            StatValue::Accuracy(acc) => Some(acc),
            _ => None,
        }
    }
}

impl CachedStat for ModuleProgress {
    fn into_value(self) -> StatValue {
        StatValue::Progress(self)
    }

    fn from_value(value: StatValue) -> Option<Self> {
        match value {
            StatValue::Progress(progress) => Some(progress),
            _ => None,
        }
    }
}

impl CachedStat for ProgressSnapshot {
    fn into_value(self) -> StatValue {
        StatValue::Snapshot(self)
    }

    fn from_value(value: StatValue) -> Option<Self> {
        match value {
            StatValue::Snapshot(snapshot) => Some(snapshot),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct CacheState {
    generation: u64,
    entries: HashMap<StatKey, StatValue>,
}

/// Memoized statistics for the newest committed [`EventLog`].
///
/// Entries are tagged with the log generation they were computed from. A
/// value computed from an older log is returned to its caller but never
/// stored, so a read can't repopulate the cache with data a concurrent write
/// has already superseded. There is no time-based expiry.
#[derive(Debug, Default)]
pub struct ProgressCache {
    state: Mutex<CacheState>,
}

impl ProgressCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the memoized value for `key`, or compute it from `log`.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `compute`; errors are not cached.
    pub fn get_or_compute<T, E, F>(&self, key: StatKey, log: &EventLog, compute: F) -> Result<T, E>
    where
        T: CachedStat,
        F: FnOnce(&EventLog) -> Result<T, E>,
    {
        if let Some(hit) = self.lookup(&key, log.generation()).and_then(T::from_value) {
            return Ok(hit);
        }

        tracing::trace!(?key, generation = log.generation(), "progress cache miss");
        let value = compute(log)?;
        self.store(key, log.generation(), value.clone().into_value());
        Ok(value)
    }

    /// Drop every entry; only values computed from `generation` or later may
    /// be stored afterwards.
    pub fn invalidate(&self, generation: u64) {
        let mut state = self.lock();
        if generation >= state.generation {
            state.generation = generation;
            state.entries.clear();
        }
    }

    /// Drop every entry without advancing the generation.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, key: &StatKey, generation: u64) -> Option<StatValue> {
        let state = self.lock();
        if state.generation != generation {
            return None;
        }
        state.entries.get(key).cloned()
    }

    fn store(&self, key: StatKey, generation: u64, value: StatValue) {
        let mut state = self.lock();
        if generation > state.generation {
            state.generation = generation;
            state.entries.clear();
        }
        if generation == state.generation {
            state.entries.insert(key, value);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::convert::Infallible;

    fn count(cache: &ProgressCache, log: &EventLog, calls: &Cell<u32>) -> usize {
        cache
            .get_or_compute(StatKey::TotalLearned, log, |log| {
                calls.set(calls.get() + 1);
                Ok::<_, Infallible>(log.attempts().len())
            })
            .unwrap()
    }

    #[test]
    fn memoizes_until_invalidated() {
        let cache = ProgressCache::new();
        let log = EventLog::default();
        let calls = Cell::new(0);

        assert_eq!(count(&cache, &log, &calls), 0);
        assert_eq!(count(&cache, &log, &calls), 0);
        assert_eq!(calls.get(), 1);
        assert_eq!(cache.len(), 1);

        cache.invalidate(0);
        assert!(cache.is_empty());
        count(&cache, &log, &calls);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn stale_generation_is_not_stored() {
        let cache = ProgressCache::new();
        cache.invalidate(3);
        let calls = Cell::new(0);

        // A log from before the invalidation computes but does not populate.
        let stale = EventLog::default();
        count(&cache, &stale, &calls);
        count(&cache, &stale, &calls);
        assert_eq!(calls.get(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn older_invalidation_does_not_roll_back() {
        let cache = ProgressCache::new();
        cache.invalidate(5);
        cache.invalidate(2);
        let calls = Cell::new(0);
        count(&cache, &EventLog::default(), &calls);
        assert!(cache.is_empty());
    }

    #[test]
    fn errors_are_not_cached() {
        let cache = ProgressCache::new();
        let log = EventLog::default();
        let key = StatKey::ModuleProgress(ModuleId::new("nope"));
        let result: Result<ModuleProgress, &str> =
            cache.get_or_compute(key.clone(), &log, |_| Err("unknown"));
        assert_eq!(result, Err("unknown"));
        assert!(cache.is_empty());
    }

    #[test]
    fn keys_do_not_collide_across_types() {
        let cache = ProgressCache::new();
        let log = EventLog::default();
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

        let streak: u32 = cache
            .get_or_compute(StatKey::Streak(day), &log, |_| Ok::<_, Infallible>(4))
            .unwrap();
        let total: usize = cache
            .get_or_compute(StatKey::TotalLearned, &log, |_| Ok::<_, Infallible>(9))
            .unwrap();
        assert_eq!((streak, total), (4, 9));
        assert_eq!(cache.len(), 2);
    }
}
