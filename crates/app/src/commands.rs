//! Subcommand implementations for `nisen`.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use nisen_core::model::{CharacterId, ModuleCatalog, ModuleId, QuizAttempt};
use nisen_core::stats::{Accuracy, ProgressSnapshot};
use services::{EngineError, ProgressEngine};

/// Record one quiz answer. Answering counts as studying today.
pub async fn record(
    engine: &ProgressEngine,
    module: ModuleId,
    character: CharacterId,
    correct: bool,
) -> Result<()> {
    if !engine.catalog().contains(&module, &character) {
        tracing::warn!(%module, %character, "character is not part of the module catalog");
    }
    engine
        .record_attempt(module.clone(), character.clone(), correct)
        .await
        .map_err(not_saved)?;
    engine
        .record_study_activity()
        .await
        .context("answer saved, but today was not marked as a study day")?;

    let verdict = if correct { "correct" } else { "incorrect" };
    println!("Recorded {verdict} answer for {character} ({module}).");
    Ok(())
}

pub async fn study(engine: &ProgressEngine) -> Result<()> {
    let added = engine.record_study_activity().await.map_err(not_saved)?;
    if added {
        println!("Marked today as a study day.");
    } else {
        println!("Today is already marked as a study day.");
    }
    println!("Current streak: {}", engine.study_streak());
    Ok(())
}

pub fn stats(engine: &ProgressEngine, module: Option<ModuleId>) -> Result<()> {
    match module {
        Some(module) => {
            let progress = engine.module_progress(&module)?;
            let accuracy = engine.module_accuracy(&module)?;
            let name = engine
                .catalog()
                .get(&module)
                .map_or_else(|| module.to_string(), |m| m.name().to_string());
            println!(
                "{name}: {}/{} learned ({}%), accuracy {}",
                progress.learned,
                progress.total,
                progress.percent(),
                format_accuracy(accuracy)
            );
        }
        None => print!("{}", render_snapshot(&engine.snapshot(), engine.catalog())),
    }
    Ok(())
}

pub fn history(engine: &ProgressEngine, module: Option<ModuleId>, limit: usize) -> Result<()> {
    if let Some(module) = &module {
        if engine.catalog().get(module).is_none() {
            return Err(EngineError::UnknownModule(module.clone()).into());
        }
    }
    let attempts = engine.attempts(module.as_ref());
    if attempts.is_empty() {
        println!("No quiz attempts recorded yet.");
        return Ok(());
    }
    let skip = attempts.len().saturating_sub(limit);
    for attempt in &attempts[skip..] {
        println!("{}", render_attempt(attempt));
    }
    Ok(())
}

pub async fn reset(engine: &ProgressEngine, confirmed: bool) -> Result<()> {
    if !confirmed {
        println!("This erases all recorded progress. Re-run with --yes to confirm.");
        return Ok(());
    }
    engine
        .clear()
        .await
        .context("progress could not be fully erased")?;
    println!("All progress erased.");
    Ok(())
}

fn not_saved(err: EngineError) -> anyhow::Error {
    anyhow::Error::new(err).context("progress not saved this time")
}

/// Accuracy as shown to the user; no answers yet renders as `--`.
pub fn format_accuracy(accuracy: Accuracy) -> String {
    if accuracy.has_data() {
        format!("{}%", accuracy.percent)
    } else {
        "--".to_string()
    }
}

pub fn render_snapshot(snapshot: &ProgressSnapshot, catalog: &ModuleCatalog) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Characters learned: {}", snapshot.total_learned);
    let _ = writeln!(
        out,
        "Quiz accuracy:      {}",
        format_accuracy(snapshot.accuracy)
    );
    let _ = writeln!(out, "Study streak:       {}", snapshot.streak);
    let _ = writeln!(out);
    let _ = writeln!(out, "Module progress");
    for progress in &snapshot.modules {
        let name = catalog
            .get(&progress.module_id)
            .map_or(progress.module_id.as_str(), |m| m.name());
        let _ = writeln!(
            out,
            "  {name:<10} {:>3}/{:<3} {}",
            progress.learned,
            progress.total,
            bar(progress.fraction())
        );
    }
    out
}

fn bar(fraction: f64) -> String {
    const WIDTH: usize = 20;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let filled = ((fraction.clamp(0.0, 1.0) * WIDTH as f64).round() as usize).min(WIDTH);
    format!("[{}{}]", "#".repeat(filled), ".".repeat(WIDTH - filled))
}

fn render_attempt(attempt: &QuizAttempt) -> String {
    let mark = if attempt.correct { "ok  " } else { "miss" };
    format!(
        "{} {mark} {} {}",
        attempt.timestamp.format("%Y-%m-%d %H:%M:%S"),
        attempt.module_id,
        attempt.character_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use nisen_core::stats::ModuleProgress;
    use nisen_core::time::fixed_clock;
    use storage::repository::{InMemoryStore, KeyValueStore, StorageError, keys};

    /// Accepts attempts but refuses to store study days.
    #[derive(Default)]
    struct NoStudyDays {
        inner: InMemoryStore,
    }

    #[async_trait]
    impl KeyValueStore for NoStudyDays {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
            if key == keys::STUDY_DAYS {
                return Err(StorageError::Unavailable("disk full".into()));
            }
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove(key).await
        }
    }

    #[tokio::test]
    async fn record_reports_saved_answer_when_study_day_fails() {
        let engine = ProgressEngine::load(
            Arc::new(NoStudyDays::default()),
            ModuleCatalog::japanese(),
            fixed_clock(),
        )
        .await;

        let err = record(
            &engine,
            ModuleId::new("hiragana"),
            CharacterId::new("あ"),
            true,
        )
        .await
        .unwrap_err();

        let message = format!("{err:#}");
        assert!(message.contains("answer saved"));
        assert!(!message.contains("progress not saved"));
        assert_eq!(engine.attempts(None).len(), 1);
        assert!(engine.study_days().is_empty());
    }

    #[test]
    fn accuracy_without_answers_renders_placeholder() {
        assert_eq!(format_accuracy(Accuracy::default()), "--");
        assert_eq!(format_accuracy(Accuracy::from_counts(0, 3)), "0%");
        assert_eq!(format_accuracy(Accuracy::from_counts(3, 4)), "75%");
    }

    #[test]
    fn bar_is_clamped() {
        assert_eq!(bar(0.0), format!("[{}]", ".".repeat(20)));
        assert_eq!(bar(1.0), format!("[{}]", "#".repeat(20)));
        assert_eq!(bar(0.5).matches('#').count(), 10);
    }

    #[test]
    fn snapshot_lists_modules_by_name() {
        let catalog = ModuleCatalog::japanese();
        let snapshot = ProgressSnapshot {
            total_learned: 2,
            accuracy: Accuracy::from_counts(2, 2),
            streak: 4,
            modules: vec![ModuleProgress {
                module_id: ModuleId::new("hiragana"),
                learned: 2,
                total: 46,
            }],
        };
        let text = render_snapshot(&snapshot, &catalog);
        assert!(text.contains("Characters learned: 2"));
        assert!(text.contains("100%"));
        assert!(text.contains("Study streak:       4"));
        assert!(text.contains("Hiragana"));
        assert!(text.contains("2/46"));
    }
}
