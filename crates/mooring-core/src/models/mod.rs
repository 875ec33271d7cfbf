//! Data models for Mooring

mod change_log;
mod entity;
mod queue;
mod sync_state;

pub use change_log::ChangeLogEntry;
pub use entity::{Entity, EntityKind};
pub use queue::{ActionType, Operation, QueueCounts, QueueItem, QueueStatus};
pub use sync_state::{SyncScope, SyncStateRecord};
