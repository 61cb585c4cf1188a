use std::collections::BTreeSet;
use std::convert::Infallible;
use std::sync::Arc;

use chrono::NaiveDate;

use nisen_core::mastery::MasteryRule;
use nisen_core::model::{CharacterId, ModuleCatalog, ModuleId, QuizAttempt};
use nisen_core::stats::{self, Accuracy, ModuleProgress, ProgressSnapshot};
use nisen_core::time::Clock;
use storage::repository::KeyValueStore;

use crate::error::EngineError;
use crate::event_store::{EventLog, EventStore};
use crate::progress_cache::{CachedStat, ProgressCache, StatKey};

/// Entry point the presentation layer talks to.
///
/// Mutations await the storage adapter; reads work on the latest committed
/// events and are served from the progress cache when nothing changed.
pub struct ProgressEngine {
    events: EventStore,
    cache: Arc<ProgressCache>,
    catalog: ModuleCatalog,
    rule: MasteryRule,
}

impl ProgressEngine {
    /// Load persisted progress from `kv`, starting empty if it is unreadable.
    pub async fn load(kv: Arc<dyn KeyValueStore>, catalog: ModuleCatalog, clock: Clock) -> Self {
        let cache = Arc::new(ProgressCache::new());
        let events = EventStore::load(kv, clock)
            .await
            .with_cache(Arc::clone(&cache));
        Self {
            events,
            cache,
            catalog,
            rule: MasteryRule::default(),
        }
    }

    /// Replace the learned-character rule.
    #[must_use]
    pub fn with_mastery_rule(mut self, rule: MasteryRule) -> Self {
        self.rule = rule;
        self.cache.clear();
        self
    }

    #[must_use]
    pub fn catalog(&self) -> &ModuleCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn mastery_rule(&self) -> MasteryRule {
        self.rule
    }

    //
    // ─── MUTATIONS ─────────────────────────────────────────────────────────────
    //

    /// Record one quiz answer.
    ///
    /// The character is not checked against the catalog; characters outside
    /// it are kept in the history but never count toward module progress.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Storage` if the attempt could not be persisted.
    pub async fn record_attempt(
        &self,
        module_id: ModuleId,
        character_id: CharacterId,
        correct: bool,
    ) -> Result<QuizAttempt, EngineError> {
        let attempt = self
            .events
            .record_attempt(module_id, character_id, correct)
            .await?;
        tracing::debug!(
            module = %attempt.module_id,
            character = %attempt.character_id,
            correct,
            "recorded quiz attempt"
        );
        Ok(attempt)
    }

    /// Mark today as a study day; returns `false` if it already was.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Storage` if the study day could not be persisted.
    pub async fn record_study_activity(&self) -> Result<bool, EngineError> {
        let added = self.events.record_study_activity().await?;
        if added {
            tracing::debug!(day = %self.events.clock().today(), "recorded study day");
        }
        Ok(added)
    }

    /// Wipe all recorded progress.
    ///
    /// Attempts are removed before study days, and each removal is published
    /// as soon as storage confirms it. If the second removal fails, attempts
    /// stay cleared while study days (and so the streak) remain, matching
    /// what storage still holds.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Storage` if persisted data could not be removed.
    pub async fn clear(&self) -> Result<(), EngineError> {
        self.events.clear().await?;
        Ok(())
    }

    //
    // ─── READS ─────────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn attempts(&self, module: Option<&ModuleId>) -> Vec<QuizAttempt> {
        self.events.attempts(module)
    }

    #[must_use]
    pub fn study_days(&self) -> BTreeSet<NaiveDate> {
        self.events.study_days()
    }

    #[must_use]
    pub fn total_characters_learned(&self) -> usize {
        let rule = self.rule;
        self.infallible(StatKey::TotalLearned, |log| {
            stats::total_characters_learned(log.attempts(), rule)
        })
    }

    /// Accuracy over all attempts, with the attempt count that tells "no
    /// data yet" apart from a real 0%.
    #[must_use]
    pub fn quiz_accuracy(&self) -> Accuracy {
        self.infallible(StatKey::Accuracy, |log| stats::quiz_accuracy(log.attempts()))
    }

    /// Accuracy over one module's attempts.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::UnknownModule` if `module` is not in the catalog.
    pub fn module_accuracy(&self, module: &ModuleId) -> Result<Accuracy, EngineError> {
        self.ensure_known(module)?;
        Ok(self.infallible(StatKey::ModuleAccuracy(module.clone()), |log| {
            stats::module_accuracy(log.attempts(), module)
        }))
    }

    #[must_use]
    pub fn study_streak(&self) -> u32 {
        let today = self.events.clock().today();
        self.infallible(StatKey::Streak(today), |log| {
            stats::study_streak(log.study_days(), today)
        })
    }

    /// Learned share of `module`'s characters.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::UnknownModule` if `module` is not in the catalog.
    pub fn module_progress(&self, module: &ModuleId) -> Result<ModuleProgress, EngineError> {
        let log = self.events.snapshot();
        self.cache
            .get_or_compute(StatKey::ModuleProgress(module.clone()), &log, |log| {
                stats::module_progress(log.attempts(), &self.catalog, module, self.rule)
                    .map_err(EngineError::from)
            })
    }

    /// Every dashboard statistic, computed from one consistent event set.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        let today = self.events.clock().today();
        self.infallible(StatKey::Snapshot(today), |log| {
            stats::snapshot(
                log.attempts(),
                log.study_days(),
                today,
                &self.catalog,
                self.rule,
            )
        })
    }

    fn infallible<T, F>(&self, key: StatKey, compute: F) -> T
    where
        T: CachedStat,
        F: FnOnce(&EventLog) -> T,
    {
        let log = self.events.snapshot();
        let result: Result<T, Infallible> =
            self.cache.get_or_compute(key, &log, |log| Ok(compute(log)));
        match result {
            Ok(value) => value,
            Err(never) => match never {},
        }
    }

    fn ensure_known(&self, module: &ModuleId) -> Result<(), EngineError> {
        if self.catalog.get(module).is_some() {
            Ok(())
        } else {
            Err(EngineError::UnknownModule(module.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nisen_core::time::fixed_clock;
    use storage::repository::Storage;

    async fn engine() -> ProgressEngine {
        ProgressEngine::load(Storage::in_memory().kv, ModuleCatalog::japanese(), fixed_clock()).await
    }

    fn hira() -> ModuleId {
        ModuleId::new("hiragana")
    }

    #[tokio::test]
    async fn reads_are_served_from_cache_until_a_write() {
        let engine = engine().await;
        engine
            .record_attempt(hira(), CharacterId::new("あ"), true)
            .await
            .unwrap();

        let first = engine.module_progress(&hira()).unwrap();
        let second = engine.module_progress(&hira()).unwrap();
        assert_eq!(first, second);
        assert_eq!(engine.cache.len(), 1);

        engine
            .record_attempt(hira(), CharacterId::new("い"), true)
            .await
            .unwrap();
        assert!(engine.cache.is_empty());
        assert_eq!(engine.module_progress(&hira()).unwrap().learned, 2);
    }

    #[tokio::test]
    async fn repeated_study_day_does_not_invalidate() {
        let engine = engine().await;
        assert!(engine.record_study_activity().await.unwrap());
        assert_eq!(engine.study_streak(), 1);
        assert!(!engine.record_study_activity().await.unwrap());
        assert_eq!(engine.cache.len(), 1);
    }

    #[tokio::test]
    async fn mastery_rule_applies_to_every_count() {
        let engine = engine().await.with_mastery_rule(MasteryRule::from_threshold(2));
        assert_eq!(engine.mastery_rule().required_correct(), 2);
        let a = CharacterId::new("あ");
        engine.record_attempt(hira(), a.clone(), true).await.unwrap();
        assert_eq!(engine.total_characters_learned(), 0);
        assert_eq!(engine.module_progress(&hira()).unwrap().learned, 0);

        engine.record_attempt(hira(), a, true).await.unwrap();
        assert_eq!(engine.total_characters_learned(), 1);
        assert_eq!(engine.snapshot().modules[0].learned, 1);
    }

    #[tokio::test]
    async fn module_accuracy_rejects_unknown_module() {
        let engine = engine().await;
        let err = engine
            .module_accuracy(&ModuleId::new("cyrillic"))
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownModule(_)));
    }
}
