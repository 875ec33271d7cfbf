//! mooring-core - Offline-first sync core
//!
//! Local writes land in a libSQL store together with a queued mutation and a
//! change-log entry, then drain to a remote authority when connectivity
//! allows. Server state comes back through bootstrap and delta pulls.

pub mod apply;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use apply::{ChangeNotice, ChangeOrigin};
pub use config::RemoteConfig;
pub use error::{Error, Result};
pub use models::{Entity, EntityKind, Operation, QueueItem, QueueStatus};
pub use services::{EntityHandle, SyncCore};
pub use state::SyncState;
pub use sync::{HttpRemote, RemoteAuthority};
