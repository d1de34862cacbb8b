//! Read-only projections returned by `list`/`get_info`/`security_report`/`stats`
//! (spec §4.6). None of these borrow from the Manager's internal table;
//! they are owned snapshots safe to hand to a CLI or a remote caller.

use runtime_core::types::PluginId;
use runtime_loader::{PluginStats, ResourceUsage, Status};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    pub id: PluginId,
    pub name: String,
    pub version: String,
    pub status: Status,
    pub permissions: Vec<String>,
    pub dependencies: Vec<PluginId>,
    pub stats: PluginStats,
    pub resource_usage: ResourceUsage,
    pub error_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityReport {
    pub id: PluginId,
    pub signed: bool,
    pub source_hash: String,
    pub permissions: Vec<String>,
    pub quarantined: bool,
    pub quarantine_reason: Option<String>,
    pub audit_chain_valid: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ManagerStats {
    pub total_plugins: usize,
    pub active_plugins: usize,
    pub disabled_plugins: usize,
    pub error_plugins: usize,
    pub total_executions: u64,
    pub total_failures: u64,
}
