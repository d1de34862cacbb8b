//! Runtime configuration (spec §3), loaded from a TOML file with
//! environment overrides, in the style of the teacher's layered config.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::types::ResourceLimits;

fn default_plugins_dir() -> PathBuf {
    PathBuf::from("./plugins")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_intrusion_window_ms() -> u64 {
    10_000
}

fn default_intrusion_max_events() -> u32 {
    20
}

fn default_request_timeout_ms() -> u64 {
    5_000
}

fn default_max_request_bytes() -> u64 {
    1_048_576
}

fn default_resource_limits() -> ResourceLimits {
    ResourceLimits {
        memory_bytes: 64 * 1024 * 1024,
        wall_timeout_ms: 1_000,
        cpu_time_ms: 1_000,
    }
}

/// Top-level runtime configuration. Deserializes from `runtime.toml`
/// (or a path given on the CLI) and may be partially overridden by
/// `RUNTIME_*` environment variables at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default = "default_plugins_dir")]
    pub plugins_dir: PathBuf,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub auto_activate: bool,

    #[serde(default = "default_true")]
    pub scan_plugins: bool,

    #[serde(default = "default_true")]
    pub require_signature: bool,

    pub public_key_path: Option<PathBuf>,
    pub private_key_path: Option<PathBuf>,

    #[serde(default)]
    pub allowed_domains: Vec<String>,
    #[serde(default)]
    pub blocked_domains: Vec<String>,

    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_resource_limits")]
    pub default_resource_limits: ResourceLimits,

    #[serde(default = "default_intrusion_window_ms")]
    pub intrusion_window_ms: u64,
    #[serde(default = "default_intrusion_max_events")]
    pub intrusion_max_events: u32,
}

fn default_true() -> bool {
    true
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            plugins_dir: default_plugins_dir(),
            data_dir: default_data_dir(),
            auto_activate: false,
            scan_plugins: true,
            require_signature: true,
            public_key_path: None,
            private_key_path: None,
            allowed_domains: Vec::new(),
            blocked_domains: Vec::new(),
            max_request_bytes: default_max_request_bytes(),
            request_timeout_ms: default_request_timeout_ms(),
            default_resource_limits: default_resource_limits(),
            intrusion_window_ms: default_intrusion_window_ms(),
            intrusion_max_events: default_intrusion_max_events(),
        }
    }
}

impl Configuration {
    /// Load from a TOML file, falling back to defaults for any field
    /// the file doesn't set. Returns `Ok(Configuration::default())` if
    /// `path` does not exist, matching the teacher's permissive config
    /// loading (a missing config file is not a startup failure).
    pub async fn load(path: &std::path::Path) -> anyhow::Result<Configuration> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(Configuration::default());
        }
        let raw = tokio::fs::read_to_string(path).await?;
        let config: Configuration = toml::from_str(&raw)?;
        Ok(config)
    }

    pub fn require_signature(&self) -> bool {
        self.require_signature
    }
}
