pub mod common;
pub mod completions;
pub mod config;
pub mod conflicts;
pub mod entity;
pub mod log;
pub mod queue;
pub mod sync;
