//! Loader (spec §4.5): discovers plugins, validates and scans them,
//! verifies signatures, builds Sandboxes, and orchestrates the
//! dependency-ordered load sequence. Lifecycle transitions themselves
//! live on `PluginRecord`; the Loader is the component that drives
//! them to completion or to `error`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use runtime_core::hash::source_hash;
use runtime_core::types::{Manifest, Permission, PluginId, ResourceLimits};
use runtime_core::PluginError;
use runtime_sandbox::capability::{
    CapabilityBindings, CryptoCapability, EventBus, EventsCapability, FilesystemCapability,
    NetworkCapability, StorageCapability, TimeCapability,
};
use runtime_sandbox::module::{DynamicPluginModule, EntrypointTable, PluginModule};
use runtime_sandbox::Sandbox;
use runtime_security::signature::SignatureVerifier;
use runtime_security::{scanner, ScanSeverity};

use crate::dag::{missing_dependencies, topological_order};
use crate::discovery::{discover, DiscoveredPlugin};
use crate::entity::{PluginRecord, Status};

/// Resolves a plugin's `main` file into a callable module. The default
/// (`DynamicEntrypointResolver`) loads a compiled object via
/// `libloading`; tests substitute a stub to avoid needing a real
/// compiled plugin object on disk.
pub trait EntrypointResolver: Send + Sync {
    fn resolve(&self, plugin_id: &str, main_path: &Path) -> Result<Arc<dyn PluginModule>, PluginError>;
}

pub struct DynamicEntrypointResolver;

impl EntrypointResolver for DynamicEntrypointResolver {
    fn resolve(&self, plugin_id: &str, main_path: &Path) -> Result<Arc<dyn PluginModule>, PluginError> {
        let module = unsafe { DynamicPluginModule::load(plugin_id, main_path) }.map_err(|e| match e {
            PluginError::PluginIo { reason, .. } => PluginError::PluginIo {
                plugin_id: plugin_id.to_string(),
                reason,
            },
            PluginError::MalformedManifest { reason, .. } => PluginError::MalformedManifest {
                plugin_id: plugin_id.to_string(),
                reason,
            },
            other => other,
        })?;
        Ok(Arc::new(module))
    }
}

pub struct LoaderConfig {
    pub plugins_dir: PathBuf,
    pub data_dir: PathBuf,
    pub scan_plugins: bool,
    pub require_signature: bool,
    pub allowed_domains: Vec<String>,
    pub blocked_domains: Vec<String>,
    pub max_request_bytes: u64,
    pub request_timeout_ms: u64,
    pub default_resource_limits: ResourceLimits,
}

pub struct Loader {
    config: LoaderConfig,
    signature_verifier: Option<Arc<SignatureVerifier>>,
    event_bus: Arc<EventBus>,
    resolver: Arc<dyn EntrypointResolver>,
}

impl Loader {
    pub fn new(config: LoaderConfig, signature_verifier: Option<Arc<SignatureVerifier>>) -> Self {
        Loader {
            config,
            signature_verifier,
            event_bus: Arc::new(EventBus::new()),
            resolver: Arc::new(DynamicEntrypointResolver),
        }
    }

    /// Swap the entrypoint resolver, used by tests to stand in for a
    /// real compiled plugin object.
    pub fn with_resolver(mut self, resolver: Arc<dyn EntrypointResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub async fn discover(&self) -> anyhow::Result<Vec<Result<DiscoveredPlugin, PluginError>>> {
        discover(&self.config.plugins_dir).await
    }

    /// Load every discovered plugin in dependency order. Plugins whose
    /// manifest failed to parse are reported immediately as `error`
    /// without participating in ordering. A load failure anywhere in
    /// the chain propagates to dependents as `dependency_unavailable`
    /// rather than attempting a partial init (spec §4.5).
    pub async fn load_all(&self) -> anyhow::Result<Vec<(PluginId, Result<PluginRecord, PluginError>)>> {
        let discovered = self.discover().await?;

        let mut results: Vec<(PluginId, Result<PluginRecord, PluginError>)> = Vec::new();
        let mut ok_discoveries = Vec::new();
        for entry in discovered {
            match entry {
                Ok(plugin) => ok_discoveries.push(plugin),
                Err(e) => {
                    let id = e.plugin_id().unwrap_or("unknown").to_string();
                    results.push((id, Err(e)));
                }
            }
        }

        let manifests: Vec<Manifest> = ok_discoveries.iter().map(|p| p.manifest.clone()).collect();
        let order = match topological_order(&manifests) {
            Ok(order) => order,
            Err(e) => {
                let cycle_ids: BTreeSet<&str> = if let PluginError::DependencyCycle { cycle } = &e {
                    cycle.iter().map(|s| s.as_str()).collect()
                } else {
                    BTreeSet::new()
                };
                for plugin in &ok_discoveries {
                    if cycle_ids.contains(plugin.manifest.id.as_str()) {
                        results.push((plugin.manifest.id.clone(), Err(e.clone())));
                    }
                }
                return Ok(results);
            }
        };

        let dir_by_id: std::collections::HashMap<PluginId, PathBuf> = ok_discoveries
            .iter()
            .map(|p| (p.manifest.id.clone(), p.dir.clone()))
            .collect();
        let manifest_by_id: std::collections::HashMap<PluginId, Manifest> = ok_discoveries
            .into_iter()
            .map(|p| (p.manifest.id.clone(), p.manifest))
            .collect();

        let mut loaded_ids: Vec<PluginId> = Vec::new();
        let mut failed_ids: BTreeSet<PluginId> = BTreeSet::new();

        for id in order {
            let manifest = manifest_by_id[&id].clone();
            let dir = dir_by_id[&id].clone();

            let missing = missing_dependencies(&manifest, &loaded_ids);
            let unavailable = !missing.is_empty() || manifest.dependencies.iter().any(|d| failed_ids.contains(d));

            if unavailable {
                failed_ids.insert(id.clone());
                results.push((
                    id.clone(),
                    Err(PluginError::UnresolvedDependency {
                        plugin_id: id,
                        dependency: manifest.dependencies.first().cloned().unwrap_or_default(),
                    }),
                ));
                continue;
            }

            match self.load_one(&manifest, &dir).await {
                Ok(record) => {
                    loaded_ids.push(id.clone());
                    results.push((id, Ok(record)));
                }
                Err(e) => {
                    failed_ids.insert(id.clone());
                    results.push((id, Err(e)));
                }
            }
        }

        Ok(results)
    }

    /// Run the full load pipeline for one plugin: validate, scan,
    /// verify signature, hash, build capability bindings, build and
    /// initialize the Sandbox.
    pub async fn load_one(&self, manifest: &Manifest, dir: &Path) -> Result<PluginRecord, PluginError> {
        let mut record = PluginRecord::new(manifest.clone());
        record.transition(Status::Loading);

        let (permissions, wildcard_used) = runtime_security::validate_manifest(manifest)?;
        if wildcard_used {
            log::warn!("plugin '{}' uses the '*' permission wildcard", manifest.id);
        }

        let main_path = dir.join(&manifest.main);
        let source = tokio::fs::read(&main_path).await.map_err(|e| PluginError::PluginIo {
            plugin_id: manifest.id.clone(),
            reason: e.to_string(),
        })?;

        if self.config.scan_plugins {
            let source_text = String::from_utf8_lossy(&source);
            let findings = scanner::scan_source(&source_text);
            if scanner::highest_severity(&findings) == Some(ScanSeverity::High) {
                let finding = findings
                    .iter()
                    .find(|f| f.severity == ScanSeverity::High)
                    .map(|f| f.description.clone())
                    .unwrap_or_default();
                return Err(PluginError::ScanFailed {
                    plugin_id: manifest.id.clone(),
                    finding,
                });
            }
        }

        let hash = source_hash(&source);

        if self.config.require_signature {
            let sig_path = dir.join("plugin.sig");
            let sig_b64 = tokio::fs::read_to_string(&sig_path)
                .await
                .map_err(|_| PluginError::SignatureMissing {
                    plugin_id: manifest.id.clone(),
                })?;
            let verifier = self
                .signature_verifier
                .as_ref()
                .ok_or_else(|| PluginError::SignatureMissing {
                    plugin_id: manifest.id.clone(),
                })?;
            let sig_hex = base64_to_hex(sig_b64.trim()).map_err(|_| PluginError::SignatureInvalid {
                plugin_id: manifest.id.clone(),
            })?;

            let manifest_bytes = serde_json::to_vec(manifest).map_err(|e| PluginError::MalformedManifest {
                plugin_id: manifest.id.clone(),
                reason: e.to_string(),
            })?;
            let manifest_hash = source_hash(&manifest_bytes);
            let other_hash = other_source_files_hash(dir, &manifest.id, &manifest.main).await?;
            let digest = format!("{manifest_hash}{hash}{other_hash}");

            verifier.verify(&manifest.id, &digest, &sig_hex)?;
            record.signature = Some(sig_b64.trim().to_string());
        }

        record.source_hash = hash;

        let bindings = self.build_bindings(manifest, dir, &permissions);
        let module = self.resolver.resolve(&manifest.id, &main_path)?;
        let entrypoints = EntrypointTable::new(module);

        let limits = if manifest.resource_limits.is_positive() {
            manifest.resource_limits
        } else {
            self.config.default_resource_limits
        };

        let sandbox = Sandbox::new(manifest.id.clone(), limits, bindings, entrypoints);
        sandbox.initialize().await?;

        record.sandbox = Some(Arc::new(sandbox));
        record.transition(Status::Loaded);
        Ok(record)
    }

    fn build_bindings(&self, manifest: &Manifest, dir: &Path, permissions: &BTreeSet<Permission>) -> CapabilityBindings {
        let fs = permissions
            .contains(&Permission::Fs)
            .then(|| FilesystemCapability::new(dir.to_path_buf(), manifest.id.clone()));
        let network = permissions.contains(&Permission::Network).then(|| {
            NetworkCapability::new(
                manifest.id.clone(),
                self.config.allowed_domains.clone(),
                self.config.blocked_domains.clone(),
                self.config.max_request_bytes,
                self.config.request_timeout_ms,
            )
        });
        let storage = permissions
            .contains(&Permission::Storage)
            .then(|| StorageCapability::new(&self.config.data_dir, manifest.id.clone()));
        let events = permissions
            .contains(&Permission::Events)
            .then(|| EventsCapability::new(manifest.id.clone(), self.event_bus.clone()));

        CapabilityBindings {
            plugin_id: manifest.id.clone(),
            fs,
            network,
            storage,
            events,
            crypto: CryptoCapability::default(),
            time: TimeCapability::default(),
        }
    }
}

fn base64_to_hex(b64: &str) -> Result<String, ()> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    let bytes = STANDARD.decode(b64).map_err(|_| ())?;
    Ok(hex::encode(bytes))
}

/// Hashes every plugin-directory file other than the manifest's `main`
/// entry, `plugin.json`, and `plugin.sig`, in sorted relative-path
/// order, as one SHA-256 digest over their concatenated bytes. This is
/// the third component of the signed message (spec §6): without it, a
/// signature covering only the entry file would leave a plugin's other
/// source files free for an attacker to tamper with undetected.
async fn other_source_files_hash(dir: &Path, plugin_id: &str, main: &str) -> Result<String, PluginError> {
    let excluded: BTreeSet<PathBuf> = [PathBuf::from(main), PathBuf::from("plugin.json"), PathBuf::from("plugin.sig")]
        .into_iter()
        .collect();

    let mut files: Vec<PathBuf> = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let mut entries = tokio::fs::read_dir(&current).await.map_err(|e| PluginError::PluginIo {
            plugin_id: plugin_id.to_string(),
            reason: e.to_string(),
        })?;
        while let Some(entry) = entries.next_entry().await.map_err(|e| PluginError::PluginIo {
            plugin_id: plugin_id.to_string(),
            reason: e.to_string(),
        })? {
            let path = entry.path();
            let file_type = entry.file_type().await.map_err(|e| PluginError::PluginIo {
                plugin_id: plugin_id.to_string(),
                reason: e.to_string(),
            })?;
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() {
                let rel = path.strip_prefix(dir).unwrap_or(&path).to_path_buf();
                if !excluded.contains(&rel) {
                    files.push(rel);
                }
            }
        }
    }
    files.sort();

    let mut concatenated = Vec::new();
    for rel in &files {
        let bytes = tokio::fs::read(dir.join(&rel)).await.map_err(|e| PluginError::PluginIo {
            plugin_id: plugin_id.to_string(),
            reason: e.to_string(),
        })?;
        concatenated.extend_from_slice(&bytes);
    }
    Ok(source_hash(&concatenated))
}
