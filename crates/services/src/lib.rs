#![forbid(unsafe_code)]

pub mod engine;
pub mod error;
pub mod event_store;
pub mod progress_cache;

pub use nisen_core::Clock;

pub use engine::ProgressEngine;
pub use error::EngineError;
pub use event_store::{EventLog, EventStore};
pub use progress_cache::{CachedStat, ProgressCache, StatKey, StatValue};
