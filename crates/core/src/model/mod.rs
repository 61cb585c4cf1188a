mod attempt;
mod catalog;
mod ids;
mod study;

pub use attempt::QuizAttempt;
pub use catalog::{CatalogError, ModuleCatalog, ModuleDef};
pub use ids::{CharacterId, ModuleId, ParseIdError};
pub use study::StudySession;
