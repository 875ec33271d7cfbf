//! Connectivity state reported to shells.

use serde::{Deserialize, Serialize};

/// What the sync core currently believes about the remote.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// No connectivity; mutations only queue
    #[default]
    Offline,
    /// A drain is in flight
    Syncing,
    /// Online and the last drain succeeded
    Synced,
    /// Online but the last drain failed
    Error,
}

impl SyncState {
    pub const fn is_online(self) -> bool {
        !matches!(self, Self::Offline)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
