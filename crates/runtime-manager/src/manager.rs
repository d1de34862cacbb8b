//! The Manager struct (spec §4.6). Lock acquire order follows spec §5:
//! Manager's plugin table lock, then per-plugin Loader/Security work,
//! then the per-Sandbox call lock — never the reverse.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use runtime_core::config::Configuration;
use runtime_core::events::ManagerEvent;
use runtime_core::types::PluginId;
use runtime_core::PluginError;
use runtime_loader::entity::Status;
use runtime_loader::loader::{Loader, LoaderConfig};
use runtime_loader::PluginRecord;
use runtime_security::audit::AuditLog;
use runtime_security::intrusion::IntrusionTracker;
use runtime_security::signature::SignatureVerifier;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex, RwLock, Semaphore};

use crate::report::{ManagerStats, PluginInfo, SecurityReport};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

pub struct Manager {
    config: Configuration,
    plugins: RwLock<HashMap<PluginId, PluginRecord>>,
    loader: Loader,
    audit: AuditLog,
    intrusion: Mutex<IntrusionTracker>,
    events_tx: broadcast::Sender<ManagerEvent>,
    worker_pool: Semaphore,
}

impl Manager {
    pub async fn new(config: Configuration) -> anyhow::Result<Self> {
        let signature_verifier = if config.require_signature {
            match &config.public_key_path {
                Some(path) => {
                    let pem = tokio::fs::read_to_string(path).await?;
                    Some(Arc::new(SignatureVerifier::from_public_key_pem(&pem)?))
                }
                None => None,
            }
        } else {
            None
        };

        let loader_config = LoaderConfig {
            plugins_dir: config.plugins_dir.clone(),
            data_dir: config.data_dir.clone(),
            scan_plugins: config.scan_plugins,
            require_signature: config.require_signature,
            allowed_domains: config.allowed_domains.clone(),
            blocked_domains: config.blocked_domains.clone(),
            max_request_bytes: config.max_request_bytes,
            request_timeout_ms: config.request_timeout_ms,
            default_resource_limits: config.default_resource_limits,
        };

        let audit_path = config.data_dir.join("audit").join("audit.log");
        let worker_pool_size = num_cpus::get();
        let (events_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Ok(Manager {
            intrusion: Mutex::new(IntrusionTracker::new(config.intrusion_window_ms, config.intrusion_max_events)),
            loader: Loader::new(loader_config, signature_verifier),
            audit: AuditLog::new(audit_path),
            plugins: RwLock::new(HashMap::new()),
            events_tx,
            worker_pool: Semaphore::new(worker_pool_size),
            config,
        })
    }

    /// Prepare data dir, keys, and resume the audit log chain. Must be
    /// called once before any load/execute call.
    pub async fn initialize(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.config.data_dir).await?;
        tokio::fs::create_dir_all(&self.config.data_dir.join("audit")).await?;
        self.audit.reload_chain().await?;
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.events_tx.subscribe()
    }

    fn emit(&self, event: ManagerEvent) {
        let _ = self.events_tx.send(event);
    }

    async fn audit_append(&self, actor: &str, kind: &str, details: &str, critical: bool) {
        if let Err(e) = self.audit.append(actor, kind, details, critical).await {
            log::error!("audit log write failed: {e}");
        }
    }

    pub async fn load(&self, id: &str) -> Result<(), PluginError> {
        let dir = self.config.plugins_dir.join(id);
        let manifest_path = dir.join("plugin.json");
        let raw = tokio::fs::read_to_string(&manifest_path)
            .await
            .map_err(|e| PluginError::PluginIo {
                plugin_id: id.to_string(),
                reason: e.to_string(),
            })?;
        let manifest = serde_json::from_str(&raw).map_err(|e| PluginError::MalformedManifest {
            plugin_id: id.to_string(),
            reason: e.to_string(),
        })?;

        {
            let plugins = self.plugins.read().await;
            if plugins.contains_key(id) {
                return Err(PluginError::AlreadyExists { plugin_id: id.to_string() });
            }
        }

        match self.loader.load_one(&manifest, &dir).await {
            Ok(mut record) => {
                if self.config.auto_activate {
                    record.transition(Status::Active);
                }
                let status = record.status;
                self.plugins.write().await.insert(id.to_string(), record);
                self.audit_append(id, "load", "", false).await;
                self.emit(ManagerEvent::PluginLoaded { plugin_id: id.to_string() });
                if status == Status::Active {
                    self.emit(ManagerEvent::PluginActivated { plugin_id: id.to_string() });
                }
                Ok(())
            }
            Err(e) => {
                self.audit_append(id, "load", &e.to_string(), false).await;
                self.emit(ManagerEvent::PluginError {
                    plugin_id: id.to_string(),
                    kind_tag: e.kind_tag().to_string(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    pub async fn load_all(&self) -> anyhow::Result<Vec<(PluginId, Result<(), PluginError>)>> {
        let results = self.loader.load_all().await?;
        let mut summary = Vec::with_capacity(results.len());

        for (id, outcome) in results {
            match outcome {
                Ok(mut record) => {
                    if self.config.auto_activate {
                        record.transition(Status::Active);
                    }
                    let status = record.status;
                    self.plugins.write().await.insert(id.clone(), record);
                    self.audit_append(&id, "load", "", false).await;
                    self.emit(ManagerEvent::PluginLoaded { plugin_id: id.clone() });
                    if status == Status::Active {
                        self.emit(ManagerEvent::PluginActivated { plugin_id: id.clone() });
                    }
                    summary.push((id, Ok(())));
                }
                Err(e) => {
                    self.audit_append(&id, "load", &e.to_string(), false).await;
                    self.emit(ManagerEvent::PluginError {
                        plugin_id: id.clone(),
                        kind_tag: e.kind_tag().to_string(),
                        message: e.to_string(),
                    });
                    summary.push((id, Err(e)));
                }
            }
        }

        Ok(summary)
    }

    pub async fn activate(&self, id: &str) -> Result<(), PluginError> {
        let mut plugins = self.plugins.write().await;
        let record = plugins.get_mut(id).ok_or_else(|| not_found(id))?;
        if !record.transition(Status::Active) {
            return Err(PluginError::NotReady {
                plugin_id: id.to_string(),
                reason: format!("cannot activate from status {:?}", record.status),
            });
        }
        drop(plugins);
        self.audit_append(id, "activate", "", false).await;
        self.emit(ManagerEvent::PluginActivated { plugin_id: id.to_string() });
        Ok(())
    }

    pub async fn disable(&self, id: &str, reason: &str) -> Result<(), PluginError> {
        let mut plugins = self.plugins.write().await;
        let record = plugins.get_mut(id).ok_or_else(|| not_found(id))?;
        if !record.transition(Status::Disabled) {
            return Err(PluginError::NotReady {
                plugin_id: id.to_string(),
                reason: format!("cannot disable from status {:?}", record.status),
            });
        }
        drop(plugins);
        self.audit_append(id, "disable", reason, false).await;
        self.emit(ManagerEvent::PluginDisabled {
            plugin_id: id.to_string(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Unload, transitively disabling dependents first (spec §4.5).
    pub async fn unload(&self, id: &str) -> Result<(), PluginError> {
        let dependents = self.direct_dependents(id).await;
        for dependent in dependents {
            let _ = self.disable(&dependent, "dependency unloaded").await;
        }

        let mut plugins = self.plugins.write().await;
        let record = plugins.get_mut(id).ok_or_else(|| not_found(id))?;
        if !record.transition(Status::Unloaded) {
            return Err(PluginError::NotReady {
                plugin_id: id.to_string(),
                reason: "already unloaded".into(),
            });
        }
        let sandbox = record.sandbox.take();
        drop(plugins);

        if let Some(sandbox) = sandbox {
            sandbox.teardown().await;
        }
        self.plugins.write().await.remove(id);

        self.audit_append(id, "unload", "", false).await;
        self.emit(ManagerEvent::PluginUnloaded { plugin_id: id.to_string() });
        Ok(())
    }

    /// Reload: unload then load. Dependents are disabled before the
    /// swap and re-activated after, matching spec §4.5's reload note.
    pub async fn reload(&self, id: &str) -> Result<(), PluginError> {
        let dependents = self.direct_dependents(id).await;
        for dependent in &dependents {
            let _ = self.disable(dependent, "dependency reloading").await;
        }

        self.unload(id).await?;
        let result = self.load(id).await;

        if result.is_ok() {
            for dependent in &dependents {
                let _ = self.activate(dependent).await;
            }
        }
        result
    }

    async fn direct_dependents(&self, id: &str) -> Vec<PluginId> {
        let plugins = self.plugins.read().await;
        plugins
            .values()
            .filter(|record| record.manifest.dependencies.iter().any(|d| d == id))
            .map(|record| record.id().clone())
            .collect()
    }

    pub async fn execute(&self, id: &str, args: Value) -> Result<Value, PluginError> {
        let _permit = self.worker_pool.acquire().await.map_err(|_| PluginError::NotReady {
            plugin_id: id.to_string(),
            reason: "worker pool is shut down".into(),
        })?;

        let sandbox = {
            let plugins = self.plugins.read().await;
            let record = plugins.get(id).ok_or_else(|| not_found(id))?;
            if record.status != Status::Active {
                return Err(PluginError::NotReady {
                    plugin_id: id.to_string(),
                    reason: format!("plugin status is {:?}, not active", record.status),
                });
            }
            record.sandbox.clone().ok_or_else(|| PluginError::NotReady {
                plugin_id: id.to_string(),
                reason: "no sandbox bound".into(),
            })?
        };

        let start = Instant::now();
        let result = sandbox.execute(args).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        self.record_outcome(id, duration_ms, &result).await;
        result
    }

    async fn record_outcome(&self, id: &str, duration_ms: u64, result: &Result<Value, PluginError>) {
        {
            let mut plugins = self.plugins.write().await;
            if let Some(record) = plugins.get_mut(id) {
                record.record_execution(duration_ms, result.is_ok());
                if let Err(e) = result {
                    record.error_reason = Some(e.to_string());
                }
            }
        }

        match result {
            Ok(_) => {
                self.audit_append(id, "execute", "", false).await;
                self.emit(ManagerEvent::PluginExecuted {
                    plugin_id: id.to_string(),
                    operation: "execute".into(),
                    duration_ms,
                    success: true,
                });
            }
            Err(e) => {
                self.audit_append(id, "execute_fail", &e.to_string(), false).await;
                self.emit(ManagerEvent::PluginExecuted {
                    plugin_id: id.to_string(),
                    operation: "execute".into(),
                    duration_ms,
                    success: false,
                });
                self.handle_security_relevant_failure(id, e).await;
            }
        }
    }

    async fn handle_security_relevant_failure(&self, id: &str, error: &PluginError) {
        let relevant = matches!(
            error,
            PluginError::PermissionDenied { .. }
                | PluginError::CapabilityViolation { .. }
                | PluginError::PluginError { .. }
        );
        if !relevant {
            return;
        }

        if let PluginError::PermissionDenied { permission, .. } = error {
            self.audit_append(id, "permission_denied", permission, false).await;
        }

        let quarantined = {
            let mut tracker = self.intrusion.lock().await;
            tracker.record(id, Instant::now(), &error.to_string())
        };

        if let Some(count) = quarantined {
            let mut plugins = self.plugins.write().await;
            if let Some(record) = plugins.get_mut(id) {
                if let Some(sandbox) = &record.sandbox {
                    sandbox.set_quarantined(true);
                }
                record.transition(Status::Disabled);
            }
            drop(plugins);
            self.audit_append(id, "intrusion", &format!("{count} events"), true).await;
            self.emit(ManagerEvent::SecurityIntrusionDetected {
                plugin_id: id.to_string(),
                event_count: count,
                window_ms: self.config.intrusion_window_ms,
            });
        }
    }

    pub async fn configure(&self, id: &str, cfg: Value) -> Result<(), PluginError> {
        let sandbox = {
            let plugins = self.plugins.read().await;
            let record = plugins.get(id).ok_or_else(|| not_found(id))?;
            record.sandbox.clone().ok_or_else(|| PluginError::NotReady {
                plugin_id: id.to_string(),
                reason: "no sandbox bound".into(),
            })?
        };
        sandbox.configure(cfg).await
    }

    pub async fn list(&self) -> Vec<PluginInfo> {
        self.plugins.read().await.values().map(plugin_info).collect()
    }

    pub async fn get_info(&self, id: &str) -> Result<PluginInfo, PluginError> {
        let plugins = self.plugins.read().await;
        let record = plugins.get(id).ok_or_else(|| not_found(id))?;
        Ok(plugin_info(record))
    }

    pub async fn security_report(&self, id: &str) -> Result<SecurityReport, PluginError> {
        let plugins = self.plugins.read().await;
        let record = plugins.get(id).ok_or_else(|| not_found(id))?;
        let intrusion = self.intrusion.lock().await;
        let audit_path = self.config.data_dir.join("audit").join("audit.log");
        let audit_chain_valid = AuditLog::verify_chain(&audit_path).await.unwrap_or(None).is_none();

        Ok(SecurityReport {
            id: id.to_string(),
            signed: record.signature.is_some(),
            source_hash: record.source_hash.clone(),
            permissions: record.manifest.permissions.clone(),
            quarantined: intrusion.is_quarantined(id),
            quarantine_reason: intrusion.quarantine_reason(id).map(|s| s.to_string()),
            audit_chain_valid,
        })
    }

    pub async fn stats(&self) -> ManagerStats {
        let plugins = self.plugins.read().await;
        let mut stats = ManagerStats::default();
        stats.total_plugins = plugins.len();
        for record in plugins.values() {
            match record.status {
                Status::Active => stats.active_plugins += 1,
                Status::Disabled => stats.disabled_plugins += 1,
                Status::Error => stats.error_plugins += 1,
                _ => {}
            }
            stats.total_executions += record.stats.executions;
            stats.total_failures += record.stats.failures;
        }
        stats
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.config.data_dir
    }
}

fn not_found(id: &str) -> PluginError {
    PluginError::NotFound { plugin_id: id.to_string() }
}

fn plugin_info(record: &PluginRecord) -> PluginInfo {
    PluginInfo {
        id: record.id().clone(),
        name: record.manifest.name.clone(),
        version: record.manifest.version.clone(),
        status: record.status,
        permissions: record.manifest.permissions.clone(),
        dependencies: record.manifest.dependencies.clone(),
        stats: record.stats.clone(),
        resource_usage: record.resource_usage.clone(),
        error_reason: record.error_reason.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime_core::types::ResourceLimits;
    use tempfile::tempdir;

    fn base_config(plugins_dir: PathBuf, data_dir: PathBuf) -> Configuration {
        Configuration {
            plugins_dir,
            data_dir,
            auto_activate: true,
            scan_plugins: true,
            require_signature: false,
            public_key_path: None,
            private_key_path: None,
            allowed_domains: vec![],
            blocked_domains: vec![],
            max_request_bytes: 1_048_576,
            request_timeout_ms: 5_000,
            default_resource_limits: ResourceLimits {
                memory_bytes: 64 * 1024 * 1024,
                wall_timeout_ms: 1_000,
                cpu_time_ms: 1_000,
            },
            intrusion_window_ms: 10_000,
            intrusion_max_events: 3,
        }
    }

    async fn write_plugin(dir: &std::path::Path, id: &str, permissions: &[&str]) {
        let plugin_dir = dir.join(id);
        tokio::fs::create_dir_all(&plugin_dir).await.unwrap();
        let manifest = serde_json::json!({
            "id": id, "name": id, "version": "0.1.0", "description": "", "author": "",
            "main": "main.txt", "permissions": permissions, "dependencies": [],
            "resource_limits": {"memory_bytes": 1024, "wall_timeout_ms": 1000, "cpu_time_ms": 1000}
        });
        tokio::fs::write(plugin_dir.join("plugin.json"), manifest.to_string()).await.unwrap();
        tokio::fs::write(plugin_dir.join("main.txt"), "fn main() {}").await.unwrap();
    }

    #[tokio::test]
    async fn load_nonexistent_reports_plugin_io_error() {
        let plugins_dir = tempdir().unwrap();
        let data_dir = tempdir().unwrap();
        let manager = Manager::new(base_config(plugins_dir.path().to_path_buf(), data_dir.path().to_path_buf()))
            .await
            .unwrap();
        manager.initialize().await.unwrap();

        let err = manager.load("missing").await.unwrap_err();
        assert_eq!(err.kind_tag(), "plugin_io");
    }

    #[tokio::test]
    async fn stats_aggregate_across_plugins() {
        let plugins_dir = tempdir().unwrap();
        let data_dir = tempdir().unwrap();
        write_plugin(plugins_dir.path(), "a", &[]).await;
        let manager = Manager::new(base_config(plugins_dir.path().to_path_buf(), data_dir.path().to_path_buf()))
            .await
            .unwrap();
        manager.initialize().await.unwrap();

        // load_one will fail without a real compiled plugin object,
        // but load() still records the attempt and reports not_found
        // for subsequent stats/get_info calls on the failed id.
        let _ = manager.load("a").await;
        let stats = manager.stats().await;
        assert_eq!(stats.total_plugins, 0);
    }

    #[tokio::test]
    async fn get_info_on_unknown_plugin_is_not_found() {
        let plugins_dir = tempdir().unwrap();
        let data_dir = tempdir().unwrap();
        let manager = Manager::new(base_config(plugins_dir.path().to_path_buf(), data_dir.path().to_path_buf()))
            .await
            .unwrap();
        manager.initialize().await.unwrap();

        let err = manager.get_info("ghost").await.unwrap_err();
        assert_eq!(err.kind_tag(), "not_found");
    }
}
