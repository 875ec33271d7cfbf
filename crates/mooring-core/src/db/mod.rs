//! Local store: libSQL tables for entities, the sync queue, the change log
//! and sync state

mod change_log;
mod connection;
mod migrations;
mod queue_repository;
mod repository;
mod sync_state_repository;

pub use change_log::LibSqlChangeLog;
pub use connection::Database;
pub(crate) use connection::{begin_write, finish_write};
pub use queue_repository::{LibSqlQueueRepository, QueueRepository};
pub use repository::{EntityRepository, LibSqlEntityRepository, WriteOutcome};
pub use sync_state_repository::LibSqlSyncStateRepository;
