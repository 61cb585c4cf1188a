use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{CharacterId, ModuleId};

/// One scored answer to a single character during a quiz.
///
/// Attempts are append-only: once recorded they are never edited, only wiped
/// together with the rest of the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub module_id: ModuleId,
    pub character_id: CharacterId,
    pub correct: bool,
    pub timestamp: DateTime<Utc>,
}

impl QuizAttempt {
    #[must_use]
    pub fn new(
        module_id: ModuleId,
        character_id: CharacterId,
        correct: bool,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            module_id,
            character_id,
            correct,
            timestamp,
        }
    }

    /// Returns true if this attempt belongs to `module`.
    #[must_use]
    pub fn is_for_module(&self, module: &ModuleId) -> bool {
        &self.module_id == module
    }
}
