//! Pure derivation of progress statistics from recorded events.
//!
//! Nothing here mutates or stores state: every function takes the current
//! event collections and returns a fresh value, so the same inputs always
//! produce the same output.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;
use thiserror::Error;

use crate::mastery::MasteryRule;
use crate::model::{CharacterId, ModuleCatalog, ModuleId, QuizAttempt};

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StatsError {
    #[error("unknown module: {0}")]
    UnknownModule(ModuleId),
}

//
// ─── OUTPUT TYPES ─────────────────────────────────────────────────────────────
//

/// Rounded quiz accuracy plus the counts it was computed from.
///
/// `percent` is `0` when nothing has been answered yet; callers that need to
/// tell "no data" apart from a real 0% check [`Accuracy::has_data`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Accuracy {
    pub percent: u8,
    pub correct: usize,
    pub attempts: usize,
}

impl Accuracy {
    #[must_use]
    pub fn from_counts(correct: usize, attempts: usize) -> Self {
        if attempts == 0 {
            return Self::default();
        }
        // round(100 * correct / attempts), halves rounded up, in integers.
        let scaled = (200 * correct + attempts) / (2 * attempts);
        Self {
            percent: u8::try_from(scaled.min(100)).unwrap_or(100),
            correct,
            attempts,
        }
    }

    #[must_use]
    pub fn has_data(&self) -> bool {
        self.attempts > 0
    }
}

/// Learned share of one module's character set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleProgress {
    pub module_id: ModuleId,
    pub learned: usize,
    pub total: usize,
}

impl ModuleProgress {
    /// `learned / total`, always within `[0, 1]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.learned.min(self.total) as f64) / (self.total as f64)
    }

    /// Whole-number percentage of [`ModuleProgress::fraction`], rounded down.
    #[must_use]
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 0;
        }
        u8::try_from(self.learned.min(self.total) * 100 / self.total).unwrap_or(100)
    }
}

/// Everything a dashboard shows, computed from one consistent event set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total_learned: usize,
    pub accuracy: Accuracy,
    pub streak: u32,
    pub modules: Vec<ModuleProgress>,
}

//
// ─── AGGREGATES ───────────────────────────────────────────────────────────────
//

fn correct_counts<'a, I>(attempts: I) -> HashMap<(&'a ModuleId, &'a CharacterId), u32>
where
    I: IntoIterator<Item = &'a QuizAttempt>,
{
    let mut counts: HashMap<(&ModuleId, &CharacterId), u32> = HashMap::new();
    for attempt in attempts.into_iter().filter(|a| a.correct) {
        let entry = counts
            .entry((&attempt.module_id, &attempt.character_id))
            .or_default();
        *entry = entry.saturating_add(1);
    }
    counts
}

/// Number of distinct `(module, character)` pairs that satisfy `rule`.
#[must_use]
pub fn total_characters_learned(attempts: &[QuizAttempt], rule: MasteryRule) -> usize {
    correct_counts(attempts)
        .into_values()
        .filter(|count| rule.is_learned(*count))
        .count()
}

/// Accuracy over every recorded attempt.
#[must_use]
pub fn quiz_accuracy(attempts: &[QuizAttempt]) -> Accuracy {
    let correct = attempts.iter().filter(|a| a.correct).count();
    Accuracy::from_counts(correct, attempts.len())
}

/// Accuracy over the attempts of a single module.
#[must_use]
pub fn module_accuracy(attempts: &[QuizAttempt], module: &ModuleId) -> Accuracy {
    let (correct, total) = attempts
        .iter()
        .filter(|a| a.is_for_module(module))
        .fold((0, 0), |(c, t), a| (c + usize::from(a.correct), t + 1));
    Accuracy::from_counts(correct, total)
}

/// Consecutive study days ending today, or ending yesterday when today has
/// no activity yet.
#[must_use]
pub fn study_streak(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> u32 {
    let start = if days.contains(&today) {
        today
    } else {
        match today.pred_opt() {
            Some(yesterday) if days.contains(&yesterday) => yesterday,
            _ => return 0,
        }
    };

    let mut streak = 0_u32;
    let mut cursor = Some(start);
    while let Some(day) = cursor.filter(|d| days.contains(d)) {
        streak = streak.saturating_add(1);
        cursor = day.pred_opt();
    }
    streak
}

/// Learned share of `module`'s character set.
///
/// Only characters listed in the catalog count, so `learned <= total`.
///
/// # Errors
///
/// Returns `StatsError::UnknownModule` if `module` is not in `catalog`.
pub fn module_progress(
    attempts: &[QuizAttempt],
    catalog: &ModuleCatalog,
    module: &ModuleId,
    rule: MasteryRule,
) -> Result<ModuleProgress, StatsError> {
    let def = catalog
        .get(module)
        .ok_or_else(|| StatsError::UnknownModule(module.clone()))?;

    let learned = correct_counts(attempts.iter().filter(|a| a.is_for_module(module)))
        .into_iter()
        .filter(|((_, character), count)| def.contains(character) && rule.is_learned(*count))
        .count();

    Ok(ModuleProgress {
        module_id: module.clone(),
        learned,
        total: def.total_characters(),
    })
}

/// Compute every dashboard statistic in one pass over the same inputs.
#[must_use]
pub fn snapshot(
    attempts: &[QuizAttempt],
    days: &BTreeSet<NaiveDate>,
    today: NaiveDate,
    catalog: &ModuleCatalog,
    rule: MasteryRule,
) -> ProgressSnapshot {
    let modules = catalog
        .module_ids()
        .filter_map(|id| module_progress(attempts, catalog, id, rule).ok())
        .collect();

    ProgressSnapshot {
        total_learned: total_characters_learned(attempts, rule),
        accuracy: quiz_accuracy(attempts),
        streak: study_streak(days, today),
        modules,
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn attempt(module: &str, character: &str, correct: bool) -> QuizAttempt {
        QuizAttempt::new(
            ModuleId::new(module),
            CharacterId::new(character),
            correct,
            fixed_now(),
        )
    }

    fn day(offset: i64) -> NaiveDate {
        fixed_now().date_naive() - chrono::Duration::days(offset)
    }

    #[test]
    fn accuracy_three_of_four_is_75() {
        let attempts = vec![
            attempt("hiragana", "あ", true),
            attempt("hiragana", "い", true),
            attempt("hiragana", "う", true),
            attempt("hiragana", "え", false),
        ];
        let acc = quiz_accuracy(&attempts);
        assert_eq!(acc.percent, 75);
        assert_eq!(acc.attempts, 4);
        assert!(acc.has_data());
    }

    #[test]
    fn accuracy_without_attempts_is_sentinel_zero() {
        let acc = quiz_accuracy(&[]);
        assert_eq!(acc.percent, 0);
        assert!(!acc.has_data());
    }

    #[test]
    fn accuracy_rounds_half_up() {
        assert_eq!(Accuracy::from_counts(1, 8).percent, 13);
        assert_eq!(Accuracy::from_counts(2, 3).percent, 67);
        assert_eq!(Accuracy::from_counts(1, 3).percent, 33);
        assert_eq!(Accuracy::from_counts(5, 5).percent, 100);
    }

    #[test]
    fn module_accuracy_filters_by_module() {
        let attempts = vec![
            attempt("hiragana", "あ", true),
            attempt("katakana", "ア", false),
            attempt("katakana", "イ", false),
        ];
        assert_eq!(
            module_accuracy(&attempts, &ModuleId::new("hiragana")).percent,
            100
        );
        let kata = module_accuracy(&attempts, &ModuleId::new("katakana"));
        assert_eq!((kata.percent, kata.attempts), (0, 2));
    }

    #[test]
    fn learned_counts_distinct_pairs() {
        let attempts = vec![
            attempt("hiragana", "あ", true),
            attempt("hiragana", "あ", true),
            attempt("hiragana", "い", false),
            attempt("katakana", "あ", true),
        ];
        assert_eq!(total_characters_learned(&attempts, MasteryRule::default()), 2);
    }

    #[test]
    fn learned_respects_threshold_rule() {
        let attempts = vec![
            attempt("hiragana", "あ", true),
            attempt("hiragana", "あ", true),
            attempt("hiragana", "い", true),
        ];
        let rule = MasteryRule::from_threshold(2);
        assert_eq!(total_characters_learned(&attempts, rule), 1);
    }

    #[test]
    fn learned_is_monotonic() {
        let sequence = [
            ("あ", false),
            ("あ", true),
            ("あ", false),
            ("い", true),
            ("あ", true),
        ];
        let mut attempts = Vec::new();
        let mut previous = 0;
        for (i, (character, correct)) in sequence.into_iter().enumerate() {
            attempts.push(attempt("hiragana", character, correct));
            let now = total_characters_learned(&attempts, MasteryRule::default());
            assert!(now >= previous);
            let first_correct = correct && i != 4;
            assert_eq!(now > previous, first_correct, "step {i}");
            previous = now;
        }
    }

    #[test]
    fn streak_counts_back_from_today() {
        let days: BTreeSet<_> = [day(0), day(1), day(2), day(4)].into_iter().collect();
        assert_eq!(study_streak(&days, day(0)), 3);
    }

    #[test]
    fn streak_survives_until_end_of_today() {
        let days: BTreeSet<_> = [day(1), day(2), day(4)].into_iter().collect();
        assert_eq!(study_streak(&days, day(0)), 2);
    }

    #[test]
    fn streak_resets_after_missed_day() {
        let days: BTreeSet<_> = [day(2), day(3)].into_iter().collect();
        assert_eq!(study_streak(&days, day(0)), 0);
        assert_eq!(study_streak(&BTreeSet::new(), day(0)), 0);
    }

    #[test]
    fn streak_ignores_future_days() {
        let days: BTreeSet<_> = [day(-1), day(0)].into_iter().collect();
        assert_eq!(study_streak(&days, day(0)), 1);
    }

    #[test]
    fn module_progress_counts_catalog_characters_only() {
        let catalog = ModuleCatalog::japanese();
        let attempts = vec![
            attempt("hiragana", "あ", true),
            attempt("hiragana", "い", true),
            attempt("hiragana", "い", true),
            attempt("hiragana", "ア", true),
            attempt("hiragana", "う", false),
        ];
        let progress = module_progress(
            &attempts,
            &catalog,
            &ModuleId::new("hiragana"),
            MasteryRule::default(),
        )
        .unwrap();
        assert_eq!(progress.learned, 2);
        assert_eq!(progress.total, 46);
        assert!((progress.fraction() - 2.0 / 46.0).abs() < f64::EPSILON);
        assert_eq!(progress.percent(), 4);
    }

    #[test]
    fn module_progress_unknown_module_errors() {
        let err = module_progress(
            &[],
            &ModuleCatalog::japanese(),
            &ModuleId::new("not-a-real-module"),
            MasteryRule::default(),
        )
        .unwrap_err();
        assert_eq!(err, StatsError::UnknownModule(ModuleId::new("not-a-real-module")));
    }

    #[test]
    fn snapshot_covers_every_module() {
        let catalog = ModuleCatalog::japanese();
        let attempts = vec![attempt("kanji", "日", true)];
        let days: BTreeSet<_> = [day(0)].into_iter().collect();
        let snap = snapshot(&attempts, &days, day(0), &catalog, MasteryRule::default());
        assert_eq!(snap.total_learned, 1);
        assert_eq!(snap.streak, 1);
        assert_eq!(snap.modules.len(), 3);
        assert_eq!(snap.modules[2].module_id, ModuleId::new("kanji"));
        assert_eq!(snap.modules[2].learned, 1);
        assert_eq!(snap.modules[0].learned, 0);
    }
}
