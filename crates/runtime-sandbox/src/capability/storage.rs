//! Storage capability facade (spec §4.1, §6, permission `storage`).
//!
//! One file per key under `data_dir/<plugin-id>/kv/<key>`, written
//! via write-temp-then-rename. Deliberately not backed by an embedded
//! database (`sled` is available elsewhere in the stack) because the
//! spec's on-disk contract is the one-file-per-key layout itself.

use std::path::PathBuf;

use runtime_core::PluginError;
use uuid::Uuid;

pub struct StorageCapability {
    plugin_id: String,
    kv_dir: PathBuf,
}

impl StorageCapability {
    pub fn new(data_dir: &std::path::Path, plugin_id: impl Into<String>) -> Self {
        let plugin_id = plugin_id.into();
        let kv_dir = data_dir.join(&plugin_id).join("kv");
        StorageCapability { plugin_id, kv_dir }
    }

    fn key_path(&self, key: &str) -> Result<PathBuf, PluginError> {
        if key.is_empty() || key.contains('/') || key.contains("..") {
            return Err(PluginError::CapabilityViolation {
                plugin_id: self.plugin_id.clone(),
                reason: format!("invalid storage key: {key}"),
            });
        }
        Ok(self.kv_dir.join(key))
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PluginError> {
        let path = self.key_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PluginError::PluginIo {
                plugin_id: self.plugin_id.clone(),
                reason: e.to_string(),
            }),
        }
    }

    pub async fn set(&self, key: &str, value: &[u8]) -> Result<(), PluginError> {
        let path = self.key_path(key)?;
        tokio::fs::create_dir_all(&self.kv_dir)
            .await
            .map_err(|e| PluginError::PluginIo {
                plugin_id: self.plugin_id.clone(),
                reason: e.to_string(),
            })?;

        let tmp_path = self.kv_dir.join(format!(".{}.tmp", Uuid::new_v4()));
        tokio::fs::write(&tmp_path, value).await.map_err(|e| PluginError::PluginIo {
            plugin_id: self.plugin_id.clone(),
            reason: e.to_string(),
        })?;
        tokio::fs::rename(&tmp_path, &path).await.map_err(|e| PluginError::PluginIo {
            plugin_id: self.plugin_id.clone(),
            reason: e.to_string(),
        })
    }

    pub async fn delete(&self, key: &str) -> Result<(), PluginError> {
        let path = self.key_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) | Err(_) => Ok(()),
        }
    }

    pub async fn list(&self) -> Result<Vec<String>, PluginError> {
        let mut keys = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.kv_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
            Err(e) => {
                return Err(PluginError::PluginIo {
                    plugin_id: self.plugin_id.clone(),
                    reason: e.to_string(),
                })
            }
        };
        while let Some(entry) = entries.next_entry().await.map_err(|e| PluginError::PluginIo {
            plugin_id: self.plugin_id.clone(),
            reason: e.to_string(),
        })? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') {
                keys.push(name);
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn set_get_delete_round_trip() {
        let dir = tempdir().unwrap();
        let storage = StorageCapability::new(dir.path(), "p1");

        storage.set("counter", b"1").await.unwrap();
        assert_eq!(storage.get("counter").await.unwrap(), Some(b"1".to_vec()));

        storage.set("counter", b"2").await.unwrap();
        assert_eq!(storage.get("counter").await.unwrap(), Some(b"2".to_vec()));

        storage.delete("counter").await.unwrap();
        assert_eq!(storage.get("counter").await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_reports_only_real_keys() {
        let dir = tempdir().unwrap();
        let storage = StorageCapability::new(dir.path(), "p1");
        storage.set("a", b"1").await.unwrap();
        storage.set("b", b"2").await.unwrap();

        let mut keys = storage.list().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn key_with_path_separator_is_rejected() {
        let dir = tempdir().unwrap();
        let storage = StorageCapability::new(dir.path(), "p1");
        let err = storage.set("../escape", b"x").await.unwrap_err();
        assert_eq!(err.kind_tag(), "capability_violation");
    }
}
