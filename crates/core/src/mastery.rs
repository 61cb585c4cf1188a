use std::num::NonZeroU32;

/// Decides when a character counts as learned.
///
/// Every learned-character count in [`crate::stats`] goes through
/// [`MasteryRule::is_learned`], so switching to a stricter threshold does not
/// touch the aggregation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MasteryRule {
    /// Learned after the first correct answer.
    #[default]
    FirstCorrect,
    /// Learned after at least this many correct answers.
    CorrectAtLeast(NonZeroU32),
}

impl MasteryRule {
    /// Build a rule from a required number of correct answers.
    ///
    /// `0` and `1` both mean "first correct answer".
    #[must_use]
    pub fn from_threshold(required: u32) -> Self {
        match NonZeroU32::new(required) {
            Some(n) if n.get() > 1 => Self::CorrectAtLeast(n),
            _ => Self::FirstCorrect,
        }
    }

    #[must_use]
    pub fn required_correct(self) -> u32 {
        match self {
            MasteryRule::FirstCorrect => 1,
            MasteryRule::CorrectAtLeast(n) => n.get(),
        }
    }

    /// Returns true if a character with `correct_count` correct attempts is learned.
    #[must_use]
    pub fn is_learned(self, correct_count: u32) -> bool {
        correct_count >= self.required_correct()
    }
}
