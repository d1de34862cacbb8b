//! Sandbox and Capability API (spec §4.1, §4.2).
//!
//! `capability` exposes the narrow host-side facades sandboxed plugin
//! code may reach through; `sandbox` wires a per-plugin set of granted
//! facades to a loaded plugin module and meters every call.

pub mod capability;
pub mod meter;
pub mod module;
pub mod sandbox;

pub use meter::CallMeter;
pub use module::{EntrypointTable, PluginModule};
pub use sandbox::Sandbox;
