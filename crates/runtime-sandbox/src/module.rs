//! Plugin entrypoints (spec §9): a capability record of optional
//! function handles populated when the Sandbox loads a compiled
//! plugin object via `libloading`. Missing `execute` is a fatal load
//! error; `init`/`configure`/`destroy` are optional and no-op when
//! absent.
//!
//! Every entrypoint also receives a host-call callback and opaque
//! context pointer (spec §4.1): the only way a plugin object reaches
//! the permission-gated Capability API is by calling back through
//! `host_call` with an operation name and JSON payload. Without this
//! channel the facades built in `capability/` would be unreachable
//! from inside `execute`.

use std::cell::RefCell;
use std::ffi::c_void;
use std::sync::Arc;

use async_trait::async_trait;
use libloading::{Library, Symbol};
use runtime_core::PluginError;
use serde_json::Value;

use crate::capability::HostDispatch;

/// A loaded plugin's callable surface. Implemented either by the
/// dynamic-library adapter below or, in tests, by an in-process stand-in.
/// `host` is the plugin's only route back into the Capability API;
/// an implementation that never calls it simply never exercises any
/// gated facade.
#[async_trait]
pub trait PluginModule: Send + Sync {
    async fn init(&self, _host: &dyn HostDispatch) -> Result<(), PluginError> {
        Ok(())
    }
    async fn execute(&self, args: Value, host: &dyn HostDispatch) -> Result<Value, PluginError>;
    async fn configure(&self, _cfg: Value, _host: &dyn HostDispatch) -> Result<(), PluginError> {
        Ok(())
    }
    async fn destroy(&self, _host: &dyn HostDispatch) {}
}

/// The callback every exported plugin entrypoint receives alongside
/// its `host_ctx` pointer: a plugin invokes this to reach a
/// permission-gated Capability API facade, naming the operation
/// (`"fs.read"`, `"crypto.sha256"`, ...) and passing its JSON-encoded
/// arguments in `payload_ptr`/`payload_len`. The JSON result is
/// written to `out_ptr` and the byte count returned; a negative
/// return is one of the sentinel codes below, and the exact
/// `PluginError` that produced it is recovered from the `HostCtx`
/// behind `ctx`, not reconstructed from the code alone.
pub type HostCallFn = unsafe extern "C" fn(
    ctx: *mut c_void,
    op_ptr: *const u8,
    op_len: usize,
    payload_ptr: *const u8,
    payload_len: usize,
    out_ptr: *mut u8,
    out_cap: usize,
) -> isize;

const HOST_CALL_GENERIC_ERROR: isize = -1;
const HOST_CALL_PERMISSION_DENIED: isize = -2;
const HOST_CALL_CAPABILITY_VIOLATION: isize = -3;

/// Per-call context passed across the FFI boundary as an opaque
/// pointer. `last_error` is the side channel that preserves the exact
/// `plugin_id`/`permission`/`reason` of a failed host call, since the
/// raw ABI can only carry a sentinel integer back through `execute`'s
/// own return value.
struct HostCtx<'a> {
    dispatch: &'a dyn HostDispatch,
    last_error: RefCell<Option<PluginError>>,
}

impl<'a> HostCtx<'a> {
    fn new(dispatch: &'a dyn HostDispatch) -> Self {
        HostCtx {
            dispatch,
            last_error: RefCell::new(None),
        }
    }

    fn take_error(&self, plugin_id: &str, code: isize) -> PluginError {
        self.last_error.borrow_mut().take().unwrap_or_else(|| PluginError::PluginError {
            plugin_id: plugin_id.to_string(),
            message: format!("plugin call failed with code {code}"),
        })
    }
}

unsafe extern "C" fn host_call_trampoline(
    ctx: *mut c_void,
    op_ptr: *const u8,
    op_len: usize,
    payload_ptr: *const u8,
    payload_len: usize,
    out_ptr: *mut u8,
    out_cap: usize,
) -> isize {
    let ctx = &*(ctx as *const HostCtx<'_>);

    let op = match std::str::from_utf8(std::slice::from_raw_parts(op_ptr, op_len)) {
        Ok(op) => op,
        Err(_) => return HOST_CALL_GENERIC_ERROR,
    };
    let payload: Value = match serde_json::from_slice(std::slice::from_raw_parts(payload_ptr, payload_len)) {
        Ok(payload) => payload,
        Err(_) => return HOST_CALL_GENERIC_ERROR,
    };

    let result = tokio::task::block_in_place(|| {
        tokio::runtime::Handle::current().block_on(ctx.dispatch.dispatch(op, payload))
    });

    match result {
        Ok(value) => {
            let bytes = match serde_json::to_vec(&value) {
                Ok(bytes) => bytes,
                Err(_) => return HOST_CALL_GENERIC_ERROR,
            };
            if bytes.len() > out_cap {
                return HOST_CALL_GENERIC_ERROR;
            }
            std::slice::from_raw_parts_mut(out_ptr, out_cap)[..bytes.len()].copy_from_slice(&bytes);
            bytes.len() as isize
        }
        Err(err) => {
            let code = match &err {
                PluginError::PermissionDenied { .. } => HOST_CALL_PERMISSION_DENIED,
                PluginError::CapabilityViolation { .. } => HOST_CALL_CAPABILITY_VIOLATION,
                _ => HOST_CALL_GENERIC_ERROR,
            };
            *ctx.last_error.borrow_mut() = Some(err);
            code
        }
    }
}

type InitFn = unsafe extern "C" fn(HostCallFn, *mut c_void) -> i32;
type ExecuteFn =
    unsafe extern "C" fn(*const u8, usize, *mut u8, usize, HostCallFn, *mut c_void) -> isize;
type ConfigureFn = unsafe extern "C" fn(*const u8, usize, HostCallFn, *mut c_void) -> i32;
type DestroyFn = unsafe extern "C" fn(HostCallFn, *mut c_void);

const EXECUTE_OUTPUT_CAP: usize = 1 << 20;

/// Adapter around a `libloading::Library` exposing the C ABI the spec
/// expects compiled plugin objects to implement. Owns the library for
/// the Sandbox's lifetime so symbol pointers stay valid.
pub struct DynamicPluginModule {
    plugin_id: String,
    _library: Library,
    has_init: bool,
    execute: ExecuteFn,
    has_configure: bool,
    has_destroy: bool,
}

impl DynamicPluginModule {
    /// Load a compiled plugin object and resolve its entrypoints.
    /// `execute` must be present; the rest are optional.
    ///
    /// # Safety
    /// The caller must ensure `path` points to a plugin object that
    /// honors this module's C ABI; `libloading` cannot verify this.
    pub unsafe fn load(plugin_id: impl Into<String>, path: &std::path::Path) -> Result<Self, PluginError> {
        let plugin_id = plugin_id.into();
        let library = Library::new(path).map_err(|e| PluginError::PluginIo {
            plugin_id: plugin_id.clone(),
            reason: format!("failed to load plugin object: {e}"),
        })?;

        let execute: Symbol<ExecuteFn> = library.get(b"execute\0").map_err(|_| PluginError::MalformedManifest {
            plugin_id: plugin_id.clone(),
            reason: "plugin object is missing a required 'execute' symbol".into(),
        })?;
        let execute = *execute;

        let has_init = library.get::<InitFn>(b"init\0").is_ok();
        let has_configure = library.get::<ConfigureFn>(b"configure\0").is_ok();
        let has_destroy = library.get::<DestroyFn>(b"destroy\0").is_ok();

        Ok(DynamicPluginModule {
            plugin_id,
            _library: library,
            has_init,
            execute,
            has_configure,
            has_destroy,
        })
    }
}

#[async_trait]
impl PluginModule for DynamicPluginModule {
    async fn init(&self, host: &dyn HostDispatch) -> Result<(), PluginError> {
        if !self.has_init {
            return Ok(());
        }
        let init: Symbol<InitFn> = unsafe {
            self._library.get(b"init\0").map_err(|e| PluginError::PluginError {
                plugin_id: self.plugin_id.clone(),
                message: format!("init symbol vanished: {e}"),
            })?
        };

        let ctx = HostCtx::new(host);
        let ctx_ptr = &ctx as *const HostCtx<'_> as *mut c_void;
        let code = unsafe { init(host_call_trampoline, ctx_ptr) };
        if code == 0 {
            Ok(())
        } else {
            Err(ctx.take_error(&self.plugin_id, code as isize))
        }
    }

    async fn execute(&self, args: Value, host: &dyn HostDispatch) -> Result<Value, PluginError> {
        let input = serde_json::to_vec(&args).map_err(|e| PluginError::PluginError {
            plugin_id: self.plugin_id.clone(),
            message: e.to_string(),
        })?;
        let mut output = vec![0u8; EXECUTE_OUTPUT_CAP];

        let ctx = HostCtx::new(host);
        let ctx_ptr = &ctx as *const HostCtx<'_> as *mut c_void;
        let written = unsafe {
            (self.execute)(
                input.as_ptr(),
                input.len(),
                output.as_mut_ptr(),
                output.len(),
                host_call_trampoline,
                ctx_ptr,
            )
        };
        if written < 0 {
            return Err(ctx.take_error(&self.plugin_id, written));
        }
        output.truncate(written as usize);
        serde_json::from_slice(&output).map_err(|e| PluginError::PluginError {
            plugin_id: self.plugin_id.clone(),
            message: format!("malformed plugin output: {e}"),
        })
    }

    async fn configure(&self, cfg: Value, host: &dyn HostDispatch) -> Result<(), PluginError> {
        if !self.has_configure {
            return Ok(());
        }
        let configure: Symbol<ConfigureFn> = unsafe {
            self._library.get(b"configure\0").map_err(|e| PluginError::PluginError {
                plugin_id: self.plugin_id.clone(),
                message: format!("configure symbol vanished: {e}"),
            })?
        };
        let input = serde_json::to_vec(&cfg).map_err(|e| PluginError::PluginError {
            plugin_id: self.plugin_id.clone(),
            message: e.to_string(),
        })?;

        let ctx = HostCtx::new(host);
        let ctx_ptr = &ctx as *const HostCtx<'_> as *mut c_void;
        let code = unsafe { configure(input.as_ptr(), input.len(), host_call_trampoline, ctx_ptr) };
        if code == 0 {
            Ok(())
        } else {
            Err(ctx.take_error(&self.plugin_id, code as isize))
        }
    }

    async fn destroy(&self, host: &dyn HostDispatch) {
        if !self.has_destroy {
            return;
        }
        if let Ok(destroy) = unsafe { self._library.get::<DestroyFn>(b"destroy\0") } {
            let ctx = HostCtx::new(host);
            let ctx_ptr = &ctx as *const HostCtx<'_> as *mut c_void;
            unsafe { destroy(host_call_trampoline, ctx_ptr) }
        }
    }
}

/// The table a Sandbox holds once a plugin module is loaded.
pub struct EntrypointTable {
    pub module: Arc<dyn PluginModule>,
}

impl EntrypointTable {
    pub fn new(module: Arc<dyn PluginModule>) -> Self {
        EntrypointTable { module }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHost;

    #[async_trait]
    impl HostDispatch for NoopHost {
        async fn dispatch(&self, op: &str, _payload: Value) -> Result<Value, PluginError> {
            Err(PluginError::CapabilityViolation {
                plugin_id: "stub".into(),
                reason: format!("unbound host in test double: {op}"),
            })
        }
    }

    struct StubModule {
        init_fails: bool,
    }

    #[async_trait]
    impl PluginModule for StubModule {
        async fn init(&self, _host: &dyn HostDispatch) -> Result<(), PluginError> {
            if self.init_fails {
                Err(PluginError::PluginError {
                    plugin_id: "stub".into(),
                    message: "boom".into(),
                })
            } else {
                Ok(())
            }
        }

        async fn execute(&self, args: Value, _host: &dyn HostDispatch) -> Result<Value, PluginError> {
            Ok(args)
        }
    }

    #[tokio::test]
    async fn stub_module_echoes_args() {
        let table = EntrypointTable::new(Arc::new(StubModule { init_fails: false }));
        let result = table.module.execute(serde_json::json!({"x": 1}), &NoopHost).await.unwrap();
        assert_eq!(result, serde_json::json!({"x": 1}));
    }

    #[tokio::test]
    async fn failing_init_surfaces_as_error() {
        let table = EntrypointTable::new(Arc::new(StubModule { init_fails: true }));
        assert!(table.module.init(&NoopHost).await.is_err());
    }
}
