//! Long-lived services shells hold on to.

mod sync_core;

pub use sync_core::{EntityHandle, SyncCore};
