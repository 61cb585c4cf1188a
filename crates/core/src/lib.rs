#![forbid(unsafe_code)]

pub mod mastery;
pub mod model;
pub mod stats;
pub mod time;

pub use mastery::MasteryRule;
pub use time::Clock;
