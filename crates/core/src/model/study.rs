use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A calendar day (in the user's local zone) with recorded study activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudySession {
    pub date: NaiveDate,
}

impl StudySession {
    #[must_use]
    pub fn on(date: NaiveDate) -> Self {
        Self { date }
    }
}

impl From<NaiveDate> for StudySession {
    fn from(date: NaiveDate) -> Self {
        Self::on(date)
    }
}
