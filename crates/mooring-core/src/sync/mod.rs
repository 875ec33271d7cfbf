//! Synchronization with the remote authority.
//!
//! Local writes land in the store and the queue first; this module moves
//! them outward (`push_actions`) and brings server state inward
//! (`bootstrap`, `pull`), plus the operator tools for settling conflicts.

mod conflict;
#[cfg(test)]
pub(crate) mod fake;
mod http;
mod remote;
mod service;

pub use conflict::{ConflictResolver, Resolution};
pub use http::HttpRemote;
pub use remote::{PushRequest, PushResponse, PushResult, RemoteAuthority, Snapshot};
pub use service::{
    BootstrapReport, PullReport, PushReport, SkippedEntity, SyncReport, SyncService,
};
