//! Plugin discovery (spec §6): walks `plugins_dir` for candidate
//! plugin directories, each expected to contain a `plugin.json`.

use std::path::{Path, PathBuf};

use runtime_core::types::Manifest;
use runtime_core::PluginError;

pub struct DiscoveredPlugin {
    pub dir: PathBuf,
    pub manifest: Manifest,
}

/// Scan `plugins_dir` for immediate subdirectories containing a
/// `plugin.json`, parsing each manifest. A subdirectory without a
/// manifest is silently skipped (not every directory under
/// `plugins_dir` need be a plugin); a subdirectory with a malformed
/// manifest is reported per-entry so one bad plugin doesn't abort
/// discovery of the rest.
pub async fn discover(plugins_dir: &Path) -> anyhow::Result<Vec<Result<DiscoveredPlugin, PluginError>>> {
    let mut results = Vec::new();

    let mut entries = match tokio::fs::read_dir(plugins_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(results),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let dir = entry.path();
        let manifest_path = dir.join("plugin.json");
        if !tokio::fs::try_exists(&manifest_path).await.unwrap_or(false) {
            continue;
        }

        let candidate_id = entry.file_name().to_string_lossy().into_owned();
        let result = load_manifest(&manifest_path, &candidate_id)
            .await
            .map(|manifest| DiscoveredPlugin { dir, manifest });
        results.push(result);
    }

    Ok(results)
}

async fn load_manifest(path: &Path, candidate_id: &str) -> Result<Manifest, PluginError> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| PluginError::PluginIo {
        plugin_id: candidate_id.to_string(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&raw).map_err(|e| PluginError::MalformedManifest {
        plugin_id: candidate_id.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn discovers_only_directories_with_a_manifest() {
        let dir = tempdir().unwrap();
        let plugin_a = dir.path().join("a");
        tokio::fs::create_dir_all(&plugin_a).await.unwrap();
        tokio::fs::write(
            plugin_a.join("plugin.json"),
            r#"{"id":"a","name":"A","version":"0.1.0","description":"","author":"","main":"main.so","permissions":[],"dependencies":[],"resource_limits":{"memory_bytes":1024,"wall_timeout_ms":100,"cpu_time_ms":100}}"#,
        )
        .await
        .unwrap();

        let not_a_plugin = dir.path().join("scratch");
        tokio::fs::create_dir_all(&not_a_plugin).await.unwrap();

        let found = discover(dir.path()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].is_ok());
    }

    #[tokio::test]
    async fn malformed_manifest_is_reported_per_entry() {
        let dir = tempdir().unwrap();
        let plugin_a = dir.path().join("a");
        tokio::fs::create_dir_all(&plugin_a).await.unwrap();
        tokio::fs::write(plugin_a.join("plugin.json"), "not json").await.unwrap();

        let found = discover(dir.path()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].is_err());
    }

    #[tokio::test]
    async fn missing_plugins_dir_yields_empty_list() {
        let found = discover(Path::new("/nonexistent/plugins")).await.unwrap();
        assert!(found.is_empty());
    }
}
