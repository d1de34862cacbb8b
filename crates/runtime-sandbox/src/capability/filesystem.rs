//! Filesystem capability facade (spec §4.1, permission `fs`).
//!
//! Grounded on `fluent-agent::tools::filesystem::FileSystemExecutor`'s
//! validate-then-canonicalize containment check: every path is
//! resolved against the plugin root and rejected with
//! `capability_violation` if it would escape, whether via `..` or a
//! symlink.

use std::path::{Path, PathBuf};

use runtime_core::PluginError;
use tokio::io::AsyncWriteExt;

pub struct FilesystemCapability {
    root: PathBuf,
    plugin_id: String,
}

impl FilesystemCapability {
    pub fn new(root: PathBuf, plugin_id: impl Into<String>) -> Self {
        FilesystemCapability {
            root,
            plugin_id: plugin_id.into(),
        }
    }

    /// Canonicalize `requested` against the plugin root and confirm
    /// containment. For a path that does not yet exist (a write
    /// target), canonicalize the existing parent instead, matching
    /// the teacher's handling of not-yet-created files.
    fn resolve(&self, requested: &str) -> Result<PathBuf, PluginError> {
        let joined = self.root.join(requested);

        let canonical_root = self
            .root
            .canonicalize()
            .map_err(|e| PluginError::PluginIo {
                plugin_id: self.plugin_id.clone(),
                reason: e.to_string(),
            })?;

        let resolved = if joined.exists() {
            joined.canonicalize().map_err(|e| PluginError::PluginIo {
                plugin_id: self.plugin_id.clone(),
                reason: e.to_string(),
            })?
        } else {
            let parent = joined.parent().unwrap_or(&joined);
            let canonical_parent = parent.canonicalize().map_err(|_| PluginError::CapabilityViolation {
                plugin_id: self.plugin_id.clone(),
                reason: format!("path does not resolve under plugin root: {requested}"),
            })?;
            let file_name = joined.file_name().ok_or_else(|| PluginError::CapabilityViolation {
                plugin_id: self.plugin_id.clone(),
                reason: format!("invalid path: {requested}"),
            })?;
            canonical_parent.join(file_name)
        };

        if !resolved.starts_with(&canonical_root) {
            return Err(PluginError::CapabilityViolation {
                plugin_id: self.plugin_id.clone(),
                reason: format!("path escapes plugin root: {requested}"),
            });
        }

        Ok(resolved)
    }

    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>, PluginError> {
        let resolved = self.resolve(path)?;
        tokio::fs::read(&resolved).await.map_err(|e| PluginError::PluginIo {
            plugin_id: self.plugin_id.clone(),
            reason: e.to_string(),
        })
    }

    pub async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<(), PluginError> {
        let resolved = self.resolve(path)?;
        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        let mut file = tokio::fs::File::create(&resolved)
            .await
            .map_err(|e| PluginError::PluginIo {
                plugin_id: self.plugin_id.clone(),
                reason: e.to_string(),
            })?;
        file.write_all(bytes).await.map_err(|e| PluginError::PluginIo {
            plugin_id: self.plugin_id.clone(),
            reason: e.to_string(),
        })
    }

    pub async fn exists(&self, path: &str) -> Result<bool, PluginError> {
        let resolved = self.resolve(path)?;
        Ok(tokio::fs::try_exists(&resolved).await.unwrap_or(false))
    }

    pub async fn list_dir(&self, path: &str) -> Result<Vec<String>, PluginError> {
        let resolved = self.resolve(path)?;
        let mut entries = tokio::fs::read_dir(&resolved).await.map_err(|e| PluginError::PluginIo {
            plugin_id: self.plugin_id.clone(),
            reason: e.to_string(),
        })?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| PluginError::PluginIo {
            plugin_id: self.plugin_id.clone(),
            reason: e.to_string(),
        })? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
