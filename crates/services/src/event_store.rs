use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use nisen_core::model::{CharacterId, ModuleId, QuizAttempt, StudySession};
use nisen_core::time::Clock;
use storage::payload;
use storage::repository::{KeyValueStore, StorageError, keys};

use crate::progress_cache::ProgressCache;

//
// ─── EVENT LOG ─────────────────────────────────────────────────────────────────
//

/// Immutable view of every committed event.
///
/// Each commit publishes a new log with a higher `generation`, so a value
/// derived from one log can be matched to the exact event set it saw.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventLog {
    generation: u64,
    attempts: Vec<QuizAttempt>,
    study_days: BTreeSet<NaiveDate>,
}

impl EventLog {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Attempts in insertion order.
    #[must_use]
    pub fn attempts(&self) -> &[QuizAttempt] {
        &self.attempts
    }

    #[must_use]
    pub fn study_days(&self) -> &BTreeSet<NaiveDate> {
        &self.study_days
    }

    fn next(&self, attempts: Vec<QuizAttempt>, study_days: BTreeSet<NaiveDate>) -> Self {
        Self {
            generation: self.generation + 1,
            attempts,
            study_days,
        }
    }
}

//
// ─── EVENT STORE ───────────────────────────────────────────────────────────────
//

/// Append-only record of quiz attempts and study days, persisted through a
/// [`KeyValueStore`].
///
/// Writers are serialized by `write_lock`, which stays held across the
/// storage call. The in-memory log only advances after storage accepted the
/// new collection, so a failed write leaves no trace.
pub struct EventStore {
    clock: Clock,
    kv: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
    committed: RwLock<Arc<EventLog>>,
    cache: Option<Arc<ProgressCache>>,
}

impl EventStore {
    /// Load persisted events, starting empty for anything unreadable.
    ///
    /// Read failures and malformed payloads are logged and treated as "no
    /// data" so the tracker stays usable.
    pub async fn load(kv: Arc<dyn KeyValueStore>, clock: Clock) -> Self {
        let mut attempts: Vec<QuizAttempt> =
            load_collection(kv.as_ref(), keys::ATTEMPTS).await;
        if !attempts.is_sorted_by_key(|a| a.timestamp) {
            tracing::warn!("persisted attempts were out of order; re-sorting by timestamp");
            attempts.sort_by_key(|a| a.timestamp);
        }

        let sessions: Vec<StudySession> = load_collection(kv.as_ref(), keys::STUDY_DAYS).await;
        let study_days = sessions.into_iter().map(|s| s.date).collect();

        tracing::debug!(attempts = attempts.len(), "event store loaded");

        Self {
            clock,
            kv,
            write_lock: Mutex::new(()),
            committed: RwLock::new(Arc::new(EventLog {
                generation: 0,
                attempts,
                study_days,
            })),
            cache: None,
        }
    }

    /// Invalidate `cache` whenever this store commits a change.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<ProgressCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// The latest committed log. Never waits on storage I/O.
    #[must_use]
    pub fn snapshot(&self) -> Arc<EventLog> {
        let guard = self.committed.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Append a quiz result stamped with the current time.
    ///
    /// The timestamp never precedes the previous attempt's, even if the clock
    /// moved backwards.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the attempt log cannot be persisted; the
    /// attempt is then not recorded.
    pub async fn record_attempt(
        &self,
        module_id: ModuleId,
        character_id: CharacterId,
        correct: bool,
    ) -> Result<QuizAttempt, StorageError> {
        let _guard = self.write_lock.lock().await;
        let current = self.snapshot();

        let now = self.clock.now();
        let timestamp = current
            .attempts
            .last()
            .map_or(now, |last| now.max(last.timestamp));
        let attempt = QuizAttempt::new(module_id, character_id, correct, timestamp);

        let mut attempts = current.attempts.clone();
        attempts.push(attempt.clone());
        self.kv
            .set(keys::ATTEMPTS, &payload::encode(&attempts)?)
            .await?;

        self.publish(current.next(attempts, current.study_days.clone()));
        Ok(attempt)
    }

    /// Mark today as a study day.
    ///
    /// Returns `false` without writing anything if today is already marked.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the study days cannot be persisted.
    pub async fn record_study_activity(&self) -> Result<bool, StorageError> {
        let _guard = self.write_lock.lock().await;
        let current = self.snapshot();

        let today = self.clock.today();
        if current.study_days.contains(&today) {
            return Ok(false);
        }

        let mut study_days = current.study_days.clone();
        study_days.insert(today);
        let sessions: Vec<StudySession> = study_days.iter().copied().map(StudySession::on).collect();
        self.kv
            .set(keys::STUDY_DAYS, &payload::encode(&sessions)?)
            .await?;

        self.publish(current.next(current.attempts.clone(), study_days));
        Ok(true)
    }

    /// Attempts in insertion order, optionally restricted to one module.
    #[must_use]
    pub fn attempts(&self, module: Option<&ModuleId>) -> Vec<QuizAttempt> {
        let log = self.snapshot();
        match module {
            Some(module) => log
                .attempts
                .iter()
                .filter(|a| a.is_for_module(module))
                .cloned()
                .collect(),
            None => log.attempts.clone(),
        }
    }

    #[must_use]
    pub fn study_days(&self) -> BTreeSet<NaiveDate> {
        self.snapshot().study_days.clone()
    }

    /// Erase every recorded event, in memory and in storage.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if a key cannot be removed. Collections already
    /// removed from storage stay cleared in memory as well.
    pub async fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;

        self.kv.remove(keys::ATTEMPTS).await?;
        let current = self.snapshot();
        self.publish(current.next(Vec::new(), current.study_days.clone()));

        self.kv.remove(keys::STUDY_DAYS).await?;
        let current = self.snapshot();
        self.publish(current.next(Vec::new(), BTreeSet::new()));

        tracing::info!("event store cleared");
        Ok(())
    }

    fn publish(&self, log: EventLog) {
        let generation = log.generation;
        {
            let mut guard = self.committed.write().unwrap_or_else(PoisonError::into_inner);
            *guard = Arc::new(log);
        }
        if let Some(cache) = &self.cache {
            cache.invalidate(generation);
        }
    }
}

async fn load_collection<T>(kv: &dyn KeyValueStore, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    match kv.get(key).await {
        Ok(None) => T::default(),
        Ok(Some(bytes)) => payload::decode(&bytes).unwrap_or_else(|err| {
            tracing::warn!(key, error = %err, "discarding unreadable payload");
            T::default()
        }),
        Err(err) => {
            tracing::warn!(key, error = %err, "failed to read events; starting empty");
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use nisen_core::time::fixed_now;
    use storage::repository::InMemoryStore;

    fn hira() -> ModuleId {
        ModuleId::new("hiragana")
    }

    #[tokio::test]
    async fn attempt_timestamps_never_go_backwards() {
        let kv = Arc::new(InMemoryStore::new());
        let later = EventStore::load(kv.clone(), Clock::fixed(fixed_now())).await;
        later
            .record_attempt(hira(), CharacterId::new("あ"), true)
            .await
            .unwrap();

        // Reopen with a clock an hour behind the last attempt.
        let skewed = EventStore::load(kv, Clock::fixed(fixed_now() - Duration::hours(1))).await;
        let attempt = skewed
            .record_attempt(hira(), CharacterId::new("い"), false)
            .await
            .unwrap();
        assert_eq!(attempt.timestamp, fixed_now());
        assert!(
            skewed
                .attempts(None)
                .windows(2)
                .all(|w| w[0].timestamp <= w[1].timestamp)
        );
    }

    #[tokio::test]
    async fn generation_advances_only_on_commit() {
        let store = EventStore::load(Arc::new(InMemoryStore::new()), Clock::fixed(fixed_now())).await;
        assert_eq!(store.snapshot().generation(), 0);

        store.record_study_activity().await.unwrap();
        store.record_study_activity().await.unwrap();
        assert_eq!(store.snapshot().generation(), 1);

        store.clear().await.unwrap();
        assert!(store.snapshot().generation() > 1);
        assert!(store.study_days().is_empty());
    }

    #[tokio::test]
    async fn attempts_filter_by_module() {
        let store = EventStore::load(Arc::new(InMemoryStore::new()), Clock::fixed(fixed_now())).await;
        store
            .record_attempt(hira(), CharacterId::new("あ"), true)
            .await
            .unwrap();
        store
            .record_attempt(ModuleId::new("katakana"), CharacterId::new("ア"), true)
            .await
            .unwrap();
        store
            .record_attempt(hira(), CharacterId::new("い"), false)
            .await
            .unwrap();

        let only_hira = store.attempts(Some(&hira()));
        let chars: Vec<&str> = only_hira.iter().map(|a| a.character_id.as_str()).collect();
        assert_eq!(chars, ["あ", "い"]);
        assert_eq!(store.attempts(None).len(), 3);
    }

    #[tokio::test]
    async fn out_of_order_history_is_resorted_on_load() {
        let kv = Arc::new(InMemoryStore::new());
        let attempts = vec![
            QuizAttempt::new(hira(), CharacterId::new("い"), true, fixed_now()),
            QuizAttempt::new(
                hira(),
                CharacterId::new("あ"),
                true,
                fixed_now() - Duration::minutes(5),
            ),
        ];
        kv.set(keys::ATTEMPTS, &payload::encode(&attempts).unwrap())
            .await
            .unwrap();

        let store = EventStore::load(kv, Clock::fixed(fixed_now())).await;
        let loaded = store.attempts(None);
        assert_eq!(loaded[0].character_id, CharacterId::new("あ"));
    }
}
