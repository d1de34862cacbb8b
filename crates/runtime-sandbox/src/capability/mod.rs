//! Capability facades (spec §4.1): the only way sandboxed code reaches
//! the host. Each facade is constructed per-plugin and bound into the
//! sandbox only if the corresponding permission was granted.

pub mod crypto;
pub mod dispatch;
pub mod events;
pub mod filesystem;
pub mod network;
pub mod storage;
pub mod time;

use std::sync::Arc;

use runtime_core::types::Permission;
use runtime_core::PluginError;

pub use crypto::CryptoCapability;
pub use dispatch::HostDispatch;
pub use events::{EventBus, EventsCapability};
pub use filesystem::FilesystemCapability;
pub use network::NetworkCapability;
pub use storage::StorageCapability;
pub use time::TimeCapability;

/// The bindings table installed into one Sandbox: `Some` iff the
/// corresponding permission was granted at load time. Crypto and Time
/// are ungated per spec §4.1 and are always present.
pub struct CapabilityBindings {
    pub plugin_id: String,
    pub fs: Option<FilesystemCapability>,
    pub network: Option<NetworkCapability>,
    pub storage: Option<StorageCapability>,
    pub events: Option<EventsCapability>,
    pub crypto: CryptoCapability,
    pub time: TimeCapability,
}

impl CapabilityBindings {
    pub fn has(&self, permission: Permission) -> bool {
        match permission {
            Permission::Fs => self.fs.is_some(),
            Permission::Network => self.network.is_some(),
            Permission::Storage => self.storage.is_some(),
            Permission::Events => self.events.is_some(),
        }
    }

    fn denied(&self, permission: Permission) -> PluginError {
        PluginError::PermissionDenied {
            plugin_id: self.plugin_id.clone(),
            permission: permission.as_str().to_string(),
        }
    }

    /// Resolve a gated facade or raise `permission_denied` -- the
    /// check the host-call dispatch path runs on every gated op, so a
    /// plugin that never requested a permission cannot reach its
    /// facade no matter what it calls.
    pub(crate) fn require_fs(&self) -> Result<&FilesystemCapability, PluginError> {
        self.fs.as_ref().ok_or_else(|| self.denied(Permission::Fs))
    }

    pub(crate) fn require_network(&self) -> Result<&NetworkCapability, PluginError> {
        self.network.as_ref().ok_or_else(|| self.denied(Permission::Network))
    }

    pub(crate) fn require_storage(&self) -> Result<&StorageCapability, PluginError> {
        self.storage.as_ref().ok_or_else(|| self.denied(Permission::Storage))
    }

    pub(crate) fn require_events(&self) -> Result<&EventsCapability, PluginError> {
        self.events.as_ref().ok_or_else(|| self.denied(Permission::Events))
    }
}

pub type SharedEventBus = Arc<events::EventBus>;
