//! Shared types, error vocabulary and configuration for the plugin runtime.
//!
//! Every other workspace crate (`runtime-security`, `runtime-sandbox`,
//! `runtime-loader`, `runtime-manager`, `runtime-cli`) depends on this
//! crate for the manifest/permission/resource types and the
//! [`error::PluginError`] vocabulary so that error kinds stay consistent
//! across subsystem boundaries.

pub mod config;
pub mod error;
pub mod events;
pub mod hash;
pub mod types;

pub use error::{PluginError, PluginResult};
pub use types::{Manifest, Permission, PluginId, ResourceLimits};
