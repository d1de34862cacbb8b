//! Manifest, permission, and resource-limit types shared across the runtime.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Stable plugin identifier, unique within a single Manager.
pub type PluginId = String;

/// Closed permission enum (spec §6). The wildcard token `"*"` is handled
/// at parse time by [`Permission::parse_set`], not by this enum itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Fs,
    Network,
    Storage,
    Events,
}

impl Permission {
    pub const ALL: [Permission; 4] = [
        Permission::Fs,
        Permission::Network,
        Permission::Storage,
        Permission::Events,
    ];

    fn from_token(token: &str) -> Option<Permission> {
        match token {
            "fs" => Some(Permission::Fs),
            "network" => Some(Permission::Network),
            "storage" => Some(Permission::Storage),
            "events" => Some(Permission::Events),
            _ => None,
        }
    }

    /// Parse the manifest's raw permission token list into the closed
    /// enum set. The `"*"` wildcard expands to every permission and is
    /// reported back to the caller so the security layer can record a
    /// high-severity audit note (spec §6). An unrecognized token is a
    /// fatal manifest error.
    pub fn parse_set(tokens: &[String]) -> Result<(BTreeSet<Permission>, bool), String> {
        let mut wildcard_used = false;
        let mut set = BTreeSet::new();

        for token in tokens {
            if token == "*" {
                wildcard_used = true;
                set.extend(Permission::ALL);
                continue;
            }
            match Permission::from_token(token) {
                Some(perm) => {
                    set.insert(perm);
                }
                None => return Err(token.clone()),
            }
        }

        Ok((set, wildcard_used))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Fs => "fs",
            Permission::Network => "network",
            Permission::Storage => "storage",
            Permission::Events => "events",
        }
    }
}

/// Resource ceilings enforced per call by the Sandbox (spec §3, §4.2).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub memory_bytes: u64,
    pub wall_timeout_ms: u64,
    pub cpu_time_ms: u64,
}

impl ResourceLimits {
    pub fn is_positive(&self) -> bool {
        self.memory_bytes > 0 && self.wall_timeout_ms > 0 && self.cpu_time_ms > 0
    }

    pub fn within(&self, max: &ResourceLimits) -> bool {
        self.memory_bytes <= max.memory_bytes
            && self.wall_timeout_ms <= max.wall_timeout_ms
            && self.cpu_time_ms <= max.cpu_time_ms
    }
}

/// Static, immutable manifest as read from `plugin.json` (spec §3, §6).
///
/// `permissions` is kept as the raw token list here; [`Permission::parse_set`]
/// is applied during manifest validation in `runtime-security`, which is the
/// only place unknown-permission rejection happens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub id: PluginId,
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: String,
    pub main: String,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<PluginId>,
    pub resource_limits: ResourceLimits,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_expands_to_all_permissions() {
        let (set, wildcard) = Permission::parse_set(&["*".to_string()]).unwrap();
        assert!(wildcard);
        assert_eq!(set.len(), Permission::ALL.len());
    }

    #[test]
    fn unknown_permission_token_is_rejected() {
        let err = Permission::parse_set(&["fs".to_string(), "bogus".to_string()]).unwrap_err();
        assert_eq!(err, "bogus");
    }

    #[test]
    fn resource_limits_reject_zero_and_over_max() {
        let max = ResourceLimits {
            memory_bytes: 1024,
            wall_timeout_ms: 1000,
            cpu_time_ms: 1000,
        };
        let zero = ResourceLimits {
            memory_bytes: 0,
            wall_timeout_ms: 1000,
            cpu_time_ms: 1000,
        };
        assert!(!zero.is_positive());

        let over = ResourceLimits {
            memory_bytes: 2048,
            wall_timeout_ms: 1000,
            cpu_time_ms: 1000,
        };
        assert!(over.is_positive());
        assert!(!over.within(&max));
    }
}
