//! Lifecycle and security events broadcast by the Manager (spec §5, §7).
//!
//! Consumers (the CLI's `--follow` mode, future host integrations)
//! subscribe via `tokio::sync::broadcast`; a lagging subscriber simply
//! misses older events rather than blocking the Manager.

use serde::{Deserialize, Serialize};

use crate::types::PluginId;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ManagerEvent {
    PluginLoaded {
        plugin_id: PluginId,
    },
    PluginActivated {
        plugin_id: PluginId,
    },
    PluginDisabled {
        plugin_id: PluginId,
        reason: String,
    },
    PluginUnloaded {
        plugin_id: PluginId,
    },
    PluginError {
        plugin_id: PluginId,
        kind_tag: String,
        message: String,
    },
    PluginExecuted {
        plugin_id: PluginId,
        operation: String,
        duration_ms: u64,
        success: bool,
    },
    PluginLog {
        plugin_id: PluginId,
        level: String,
        message: String,
    },
    SecurityScanFailed {
        plugin_id: PluginId,
        finding: String,
    },
    SecuritySignatureFailed {
        plugin_id: PluginId,
    },
    SecurityIntrusionDetected {
        plugin_id: PluginId,
        event_count: u32,
        window_ms: u64,
    },
}

impl ManagerEvent {
    pub fn plugin_id(&self) -> &str {
        match self {
            ManagerEvent::PluginLoaded { plugin_id }
            | ManagerEvent::PluginActivated { plugin_id }
            | ManagerEvent::PluginDisabled { plugin_id, .. }
            | ManagerEvent::PluginUnloaded { plugin_id }
            | ManagerEvent::PluginError { plugin_id, .. }
            | ManagerEvent::PluginExecuted { plugin_id, .. }
            | ManagerEvent::PluginLog { plugin_id, .. }
            | ManagerEvent::SecurityScanFailed { plugin_id, .. }
            | ManagerEvent::SecuritySignatureFailed { plugin_id }
            | ManagerEvent::SecurityIntrusionDetected { plugin_id, .. } => plugin_id,
        }
    }
}
