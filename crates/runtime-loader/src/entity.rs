//! Plugin Entity (spec §3, §4.4): manifest + lifecycle state +
//! accumulated statistics. Directly modeled on the teacher's
//! `secure_plugin_system.rs::PluginStats`, extended with the
//! `resource_usage` fields spec §3 requires.

use std::sync::Arc;

use runtime_core::types::{Manifest, PluginId};
use runtime_sandbox::Sandbox;
use serde::{Deserialize, Serialize};

/// Lifecycle states (spec §4.5). Only the transitions enumerated in
/// `Status::can_transition_to` are legal; the Loader is the sole
/// writer of `PluginRecord::status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Unloaded,
    Loading,
    Loaded,
    Active,
    Disabled,
    Error,
}

impl Status {
    pub fn can_transition_to(self, next: Status) -> bool {
        matches!(
            (self, next),
            (Status::Unloaded, Status::Loading)
                | (Status::Loading, Status::Loaded)
                | (Status::Loading, Status::Error)
                | (Status::Loaded, Status::Active)
                | (Status::Active, Status::Disabled)
                | (Status::Disabled, Status::Active)
                | (Status::Error, Status::Unloaded)
                | (_, Status::Unloaded)
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginStats {
    pub executions: u64,
    pub failures: u64,
    pub total_execution_ms: u64,
    pub last_error: Option<String>,
}

impl PluginStats {
    pub fn average_execution_ms(&self) -> f64 {
        if self.executions == 0 {
            0.0
        } else {
            self.total_execution_ms as f64 / self.executions as f64
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub peak_memory_bytes: u64,
    pub cumulative_cpu_ms: u64,
}

/// Mutable, Manager-owned record for one plugin (spec §3). Destroyed
/// on unload; `sandbox` is only `Some` while the plugin is loaded.
#[derive(Debug)]
pub struct PluginRecord {
    pub manifest: Manifest,
    pub status: Status,
    pub source_hash: String,
    pub signature: Option<String>,
    pub stats: PluginStats,
    pub resource_usage: ResourceUsage,
    pub error_reason: Option<String>,
    pub sandbox: Option<Arc<Sandbox>>,
}

impl PluginRecord {
    pub fn new(manifest: Manifest) -> Self {
        PluginRecord {
            manifest,
            status: Status::Unloaded,
            source_hash: String::new(),
            signature: None,
            stats: PluginStats::default(),
            resource_usage: ResourceUsage::default(),
            error_reason: None,
            sandbox: None,
        }
    }

    pub fn id(&self) -> &PluginId {
        &self.manifest.id
    }

    /// Applies a status transition if legal; returns whether it took
    /// effect. The Loader/Manager must check the return value rather
    /// than assume success, so an illegal transition never silently
    /// corrupts the state machine.
    pub fn transition(&mut self, next: Status) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }

    pub fn mark_error(&mut self, reason: impl Into<String>) {
        self.error_reason = Some(reason.into());
        self.transition(Status::Error);
    }

    pub fn record_execution(&mut self, duration_ms: u64, succeeded: bool) {
        self.stats.executions += 1;
        self.stats.total_execution_ms += duration_ms;
        if !succeeded {
            self.stats.failures += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime_core::types::ResourceLimits;

    fn manifest() -> Manifest {
        Manifest {
            id: "demo".into(),
            name: "Demo".into(),
            version: "0.1.0".into(),
            description: "".into(),
            author: "".into(),
            main: "main.so".into(),
            permissions: vec![],
            dependencies: vec![],
            resource_limits: ResourceLimits {
                memory_bytes: 1024,
                wall_timeout_ms: 100,
                cpu_time_ms: 100,
            },
        }
    }

    #[test]
    fn legal_lifecycle_path_succeeds() {
        let mut record = PluginRecord::new(manifest());
        assert!(record.transition(Status::Loading));
        assert!(record.transition(Status::Loaded));
        assert!(record.transition(Status::Active));
        assert!(record.transition(Status::Disabled));
        assert!(record.transition(Status::Active));
        assert!(record.transition(Status::Unloaded));
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let mut record = PluginRecord::new(manifest());
        assert!(!record.transition(Status::Active));
        assert_eq!(record.status, Status::Unloaded);
    }

    #[test]
    fn stats_track_executions_and_failures() {
        let mut record = PluginRecord::new(manifest());
        record.record_execution(10, true);
        record.record_execution(20, false);
        assert_eq!(record.stats.executions, 2);
        assert_eq!(record.stats.failures, 1);
        assert_eq!(record.stats.average_execution_ms(), 15.0);
    }
}
