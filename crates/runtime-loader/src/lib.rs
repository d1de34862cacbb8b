//! Plugin Entity and Loader (spec §4.4, §4.5).
//!
//! `entity` carries the manifest + lifecycle state + statistics
//! (`PluginRecord`). `dag` resolves dependency order and detects
//! cycles. `discovery` walks `plugins_dir` for candidate plugin
//! directories. `loader` orchestrates the state machine across all
//! three.

pub mod dag;
pub mod discovery;
pub mod entity;
pub mod loader;

pub use entity::{PluginRecord, PluginStats, ResourceUsage, Status};
pub use loader::Loader;
