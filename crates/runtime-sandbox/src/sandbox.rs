//! Sandbox (spec §4.2): one isolated evaluation context per plugin.
//! Binds only permitted Capability API facades, enforces wall-clock
//! timeout, and tracks peak memory/CPU per call.
//!
//! At most one call executes per Sandbox at any time (spec §3, §5):
//! `call_lock` is the per-Sandbox mutex that serializes entrypoint
//! invocations; independent Sandboxes run freely in parallel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use runtime_core::types::ResourceLimits;
use runtime_core::PluginError;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::capability::CapabilityBindings;
use crate::meter::CallMeter;
use crate::module::EntrypointTable;

pub struct Sandbox {
    plugin_id: String,
    limits: ResourceLimits,
    bindings: CapabilityBindings,
    entrypoints: EntrypointTable,
    call_lock: Mutex<()>,
    warm: AtomicBool,
    quarantined: AtomicBool,
}

impl std::fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sandbox")
            .field("plugin_id", &self.plugin_id)
            .field("limits", &self.limits)
            .field("warm", &self.warm.load(Ordering::Relaxed))
            .field("quarantined", &self.quarantined.load(Ordering::Relaxed))
            .finish()
    }
}

impl Sandbox {
    pub fn new(
        plugin_id: impl Into<String>,
        limits: ResourceLimits,
        bindings: CapabilityBindings,
        entrypoints: EntrypointTable,
    ) -> Self {
        Sandbox {
            plugin_id: plugin_id.into(),
            limits,
            bindings,
            entrypoints,
            call_lock: Mutex::new(()),
            warm: AtomicBool::new(false),
            quarantined: AtomicBool::new(false),
        }
    }

    pub fn capabilities(&self) -> &CapabilityBindings {
        &self.bindings
    }

    pub fn is_warm(&self) -> bool {
        self.warm.load(Ordering::Acquire)
    }

    pub fn is_quarantined(&self) -> bool {
        self.quarantined.load(Ordering::Acquire)
    }

    pub fn set_quarantined(&self, value: bool) {
        self.quarantined.store(value, Ordering::Release);
    }

    /// Call the module's `init` entrypoint under metering. Leaves the
    /// Sandbox warm on success; the Manager transitions the plugin to
    /// `error` on failure, per spec §4.5.
    pub async fn initialize(&self) -> Result<(), PluginError> {
        let _guard = self.call_lock.lock().await;
        let mut meter = CallMeter::start(self.plugin_id.clone(), self.limits);
        meter.check()?;

        self.entrypoints.module.init(&self.bindings).await?;

        meter.check()?;
        self.warm.store(true, Ordering::Release);
        Ok(())
    }

    /// Run one `execute` call. Input is already-copied JSON (the
    /// boundary copy happened when the caller constructed `args`);
    /// output is likewise owned data, never a reference into sandbox
    /// state.
    pub async fn execute(&self, args: Value) -> Result<Value, PluginError> {
        if self.is_quarantined() {
            return Err(PluginError::NotReady {
                plugin_id: self.plugin_id.clone(),
                reason: "plugin is quarantined".into(),
            });
        }
        if !self.is_warm() {
            return Err(PluginError::NotReady {
                plugin_id: self.plugin_id.clone(),
                reason: "sandbox has not completed init".into(),
            });
        }

        let _guard = self.call_lock.lock().await;
        let mut meter = CallMeter::start(self.plugin_id.clone(), self.limits);
        meter.check()?;

        let result = self.entrypoints.module.execute(args, &self.bindings).await;

        meter.check()?;
        result
    }

    pub async fn configure(&self, cfg: Value) -> Result<(), PluginError> {
        let _guard = self.call_lock.lock().await;
        let mut meter = CallMeter::start(self.plugin_id.clone(), self.limits);
        meter.check()?;

        self.entrypoints.module.configure(cfg, &self.bindings).await?;

        meter.check()
    }

    /// Tear down, calling the optional `destroy` entrypoint. Never
    /// fails: a plugin that misbehaves on teardown still releases its
    /// Sandbox and KV storage, per spec §4.5 unload semantics.
    pub async fn teardown(&self) {
        let _guard = self.call_lock.lock().await;
        self.entrypoints.module.destroy(&self.bindings).await;
        self.warm.store(false, Ordering::Release);
    }
}

/// Convenience alias used by the Loader/Manager when they hand out a
/// shared handle to a built Sandbox.
pub type SharedSandbox = Arc<Sandbox>;

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::capability::{CryptoCapability, HostDispatch, TimeCapability};
    use crate::module::PluginModule;

    struct EchoModule;
    #[async_trait]
    impl PluginModule for EchoModule {
        async fn execute(&self, args: Value, _host: &dyn HostDispatch) -> Result<Value, PluginError> {
            Ok(args)
        }
    }

    struct FailingInitModule;
    #[async_trait]
    impl PluginModule for FailingInitModule {
        async fn init(&self, _host: &dyn HostDispatch) -> Result<(), PluginError> {
            Err(PluginError::PluginError {
                plugin_id: "p1".into(),
                message: "bad init".into(),
            })
        }
        async fn execute(&self, _args: Value, _host: &dyn HostDispatch) -> Result<Value, PluginError> {
            Ok(Value::Null)
        }
    }

    /// Calls `host.dispatch("fs.read", ...)` directly during `execute`,
    /// exercising the bridge the way a real compiled plugin object
    /// would through its `host_call` callback.
    struct HostCallingModule;
    #[async_trait]
    impl PluginModule for HostCallingModule {
        async fn execute(&self, _args: Value, host: &dyn HostDispatch) -> Result<Value, PluginError> {
            host.dispatch("fs.read", serde_json::json!({"path": "note.txt"})).await
        }
    }

    fn bindings() -> CapabilityBindings {
        CapabilityBindings {
            plugin_id: "p1".into(),
            fs: None,
            network: None,
            storage: None,
            events: None,
            crypto: CryptoCapability::default(),
            time: TimeCapability::default(),
        }
    }

    fn limits() -> ResourceLimits {
        ResourceLimits {
            memory_bytes: u64::MAX,
            wall_timeout_ms: 60_000,
            cpu_time_ms: u64::MAX,
        }
    }

    #[tokio::test]
    async fn execute_before_init_is_not_ready() {
        let sandbox = Sandbox::new(
            "p1",
            limits(),
            bindings(),
            EntrypointTable::new(Arc::new(EchoModule)),
        );
        let err = sandbox.execute(Value::Null).await.unwrap_err();
        assert_eq!(err.kind_tag(), "not_ready");
    }

    #[tokio::test]
    async fn init_then_execute_round_trips_args() {
        let sandbox = Sandbox::new(
            "p1",
            limits(),
            bindings(),
            EntrypointTable::new(Arc::new(EchoModule)),
        );
        sandbox.initialize().await.unwrap();
        let result = sandbox.execute(serde_json::json!({"x": 1})).await.unwrap();
        assert_eq!(result, serde_json::json!({"x": 1}));
    }

    #[tokio::test]
    async fn failing_init_leaves_sandbox_cold() {
        let sandbox = Sandbox::new(
            "p1",
            limits(),
            bindings(),
            EntrypointTable::new(Arc::new(FailingInitModule)),
        );
        assert!(sandbox.initialize().await.is_err());
        assert!(!sandbox.is_warm());
    }

    #[tokio::test]
    async fn quarantined_sandbox_rejects_execute() {
        let sandbox = Sandbox::new(
            "p1",
            limits(),
            bindings(),
            EntrypointTable::new(Arc::new(EchoModule)),
        );
        sandbox.initialize().await.unwrap();
        sandbox.set_quarantined(true);
        let err = sandbox.execute(Value::Null).await.unwrap_err();
        assert_eq!(err.kind_tag(), "not_ready");
    }

    #[tokio::test]
    async fn unbound_capability_raises_permission_denied() {
        let sandbox = Sandbox::new(
            "p1",
            limits(),
            bindings(),
            EntrypointTable::new(Arc::new(HostCallingModule)),
        );
        sandbox.initialize().await.unwrap();
        let err = sandbox.execute(Value::Null).await.unwrap_err();
        assert_eq!(err.kind_tag(), "permission_denied");
    }
}
