//! Sync-state model

use serde::{Deserialize, Serialize};
use std::fmt;

use super::entity::EntityKind;

/// Key of a sync-state row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SyncScope {
    /// Watermark shared by every collection
    #[default]
    Global,
    /// Watermark for one collection
    Entity(EntityKind),
}

impl SyncScope {
    pub const fn key(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Entity(kind) => kind.collection(),
        }
    }
}

impl fmt::Display for SyncScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Last successful sync for one scope.
///
/// `last_sync` is the server-issued timestamp, stored verbatim so it can be
/// handed back as the next `since` watermark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStateRecord {
    pub scope: String,
    pub last_sync: String,
}
