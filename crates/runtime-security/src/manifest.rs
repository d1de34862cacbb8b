//! Manifest validation (spec §3, §6): well-formedness and permission
//! token closure. Dependency-cycle checking lives in `runtime-loader`
//! since it needs the full plugin set, not a single manifest.

use std::collections::BTreeSet;

use runtime_core::types::{Manifest, Permission};
use runtime_core::{PluginError, PluginResult};

/// Validate a manifest's required fields and permission tokens.
/// Returns the parsed permission set and whether the `"*"` wildcard
/// was used, so the caller can log a high-severity audit note.
pub fn validate_manifest(manifest: &Manifest) -> PluginResult<(BTreeSet<Permission>, bool)> {
    if manifest.id.trim().is_empty() {
        return Err(PluginError::MalformedManifest {
            plugin_id: manifest.id.clone(),
            reason: "id must not be empty".into(),
        });
    }
    if manifest.name.trim().is_empty() {
        return Err(PluginError::MalformedManifest {
            plugin_id: manifest.id.clone(),
            reason: "name must not be empty".into(),
        });
    }
    if manifest.main.trim().is_empty() {
        return Err(PluginError::MalformedManifest {
            plugin_id: manifest.id.clone(),
            reason: "main must not be empty".into(),
        });
    }
    if !manifest.resource_limits.is_positive() {
        return Err(PluginError::MalformedManifest {
            plugin_id: manifest.id.clone(),
            reason: "resource_limits fields must all be positive".into(),
        });
    }
    if manifest.dependencies.iter().any(|d| d == &manifest.id) {
        return Err(PluginError::MalformedManifest {
            plugin_id: manifest.id.clone(),
            reason: "a plugin cannot depend on itself".into(),
        });
    }

    Permission::parse_set(&manifest.permissions).map_err(|token| PluginError::UnknownPermission {
        plugin_id: manifest.id.clone(),
        permission: token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use runtime_core::types::ResourceLimits;

    fn base_manifest() -> Manifest {
        Manifest {
            id: "demo".into(),
            name: "Demo".into(),
            version: "0.1.0".into(),
            description: "".into(),
            author: "".into(),
            main: "main.wasm".into(),
            permissions: vec!["fs".into()],
            dependencies: vec![],
            resource_limits: ResourceLimits {
                memory_bytes: 1024,
                wall_timeout_ms: 100,
                cpu_time_ms: 100,
            },
        }
    }

    #[test]
    fn valid_manifest_passes() {
        let manifest = base_manifest();
        let (set, wildcard) = validate_manifest(&manifest).unwrap();
        assert!(!wildcard);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn empty_id_is_rejected() {
        let mut manifest = base_manifest();
        manifest.id = "".into();
        assert!(validate_manifest(&manifest).is_err());
    }

    #[test]
    fn self_dependency_is_rejected() {
        let mut manifest = base_manifest();
        manifest.dependencies.push("demo".into());
        assert!(validate_manifest(&manifest).is_err());
    }

    #[test]
    fn unknown_permission_is_rejected() {
        let mut manifest = base_manifest();
        manifest.permissions.push("root".into());
        let err = validate_manifest(&manifest).unwrap_err();
        assert_eq!(err.kind_tag(), "unknown_permission");
    }
}
