//! Host-call dispatch bridge (spec §4.1, §9): the single channel a
//! loaded plugin object has back into the Capability API. `execute`
//! never hands a plugin a direct reference to `CapabilityBindings`;
//! it hands it a `&dyn HostDispatch` and every facade call is routed
//! by name through `dispatch`. That indirection is what makes an
//! unbound facade return `permission_denied` instead of simply being
//! unreachable.
//!
//! Binary payloads cross the JSON boundary base64-encoded, the same
//! convention the loader already uses for `plugin.sig` contents.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};

use runtime_core::PluginError;

use super::network::FetchOptions;
use super::CapabilityBindings;

/// A named host call with JSON-encoded arguments, and the facade
/// lookup/permission check it resolves to. Implemented once, natively
/// async, against `CapabilityBindings` directly; the C-ABI trampoline
/// in `module.rs` is the only caller that needs to block on it from
/// synchronous plugin code.
#[async_trait]
pub trait HostDispatch: Send + Sync {
    async fn dispatch(&self, op: &str, payload: Value) -> Result<Value, PluginError>;
}

fn missing_field(plugin_id: &str, field: &str) -> PluginError {
    PluginError::CapabilityViolation {
        plugin_id: plugin_id.to_string(),
        reason: format!("host call missing '{field}' field"),
    }
}

fn str_field<'a>(payload: &'a Value, field: &str, plugin_id: &str) -> Result<&'a str, PluginError> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| missing_field(plugin_id, field))
}

fn bytes_field(payload: &Value, field: &str, plugin_id: &str) -> Result<Vec<u8>, PluginError> {
    let encoded = str_field(payload, field, plugin_id)?;
    STANDARD.decode(encoded).map_err(|_| PluginError::CapabilityViolation {
        plugin_id: plugin_id.to_string(),
        reason: format!("host call '{field}' is not valid base64"),
    })
}

#[async_trait]
impl HostDispatch for CapabilityBindings {
    async fn dispatch(&self, op: &str, payload: Value) -> Result<Value, PluginError> {
        match op {
            "fs.read" => {
                let fs = self.require_fs()?;
                let path = str_field(&payload, "path", &self.plugin_id)?;
                let data = fs.read_file(path).await?;
                Ok(json!({ "data_b64": STANDARD.encode(data) }))
            }
            "fs.write" => {
                let fs = self.require_fs()?;
                let path = str_field(&payload, "path", &self.plugin_id)?;
                let data = bytes_field(&payload, "data_b64", &self.plugin_id)?;
                fs.write_file(path, &data).await?;
                Ok(Value::Null)
            }
            "fs.exists" => {
                let fs = self.require_fs()?;
                let path = str_field(&payload, "path", &self.plugin_id)?;
                Ok(json!({ "exists": fs.exists(path).await? }))
            }
            "fs.list_dir" => {
                let fs = self.require_fs()?;
                let path = str_field(&payload, "path", &self.plugin_id)?;
                Ok(json!({ "names": fs.list_dir(path).await? }))
            }

            "network.fetch" => {
                let net = self.require_network()?;
                let url = str_field(&payload, "url", &self.plugin_id)?;
                let opts = FetchOptions {
                    method: payload.get("method").and_then(Value::as_str).map(str::to_string),
                    headers: payload
                        .get("headers")
                        .and_then(Value::as_object)
                        .map(|map| {
                            map.iter()
                                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                                .collect()
                        })
                        .unwrap_or_default(),
                    body: match payload.get("body_b64").and_then(Value::as_str) {
                        Some(encoded) => Some(STANDARD.decode(encoded).map_err(|_| {
                            PluginError::CapabilityViolation {
                                plugin_id: self.plugin_id.clone(),
                                reason: "host call 'body_b64' is not valid base64".into(),
                            }
                        })?),
                        None => None,
                    },
                    timeout_ms: payload.get("timeout_ms").and_then(Value::as_u64),
                };
                let response = net.fetch(url, opts).await?;
                Ok(json!({
                    "status": response.status,
                    "body_b64": STANDARD.encode(response.body),
                    "truncated": response.truncated,
                }))
            }

            "storage.get" => {
                let storage = self.require_storage()?;
                let key = str_field(&payload, "key", &self.plugin_id)?;
                let value = storage.get(key).await?;
                Ok(json!({ "value_b64": value.map(|v| STANDARD.encode(v)) }))
            }
            "storage.set" => {
                let storage = self.require_storage()?;
                let key = str_field(&payload, "key", &self.plugin_id)?;
                let value = bytes_field(&payload, "value_b64", &self.plugin_id)?;
                storage.set(key, &value).await?;
                Ok(Value::Null)
            }
            "storage.delete" => {
                let storage = self.require_storage()?;
                let key = str_field(&payload, "key", &self.plugin_id)?;
                storage.delete(key).await?;
                Ok(Value::Null)
            }
            "storage.list" => {
                let storage = self.require_storage()?;
                Ok(json!({ "keys": storage.list().await? }))
            }

            "events.emit" => {
                let events = self.require_events()?;
                let topic = str_field(&payload, "topic", &self.plugin_id)?;
                let event_payload = payload.get("payload").cloned().unwrap_or(Value::Null);
                events.emit(topic, event_payload)?;
                Ok(Value::Null)
            }

            "crypto.sha256" => {
                let data = bytes_field(&payload, "data_b64", &self.plugin_id)?;
                Ok(json!({ "hex": self.crypto.sha256(&data) }))
            }
            "crypto.sha512" => {
                let data = bytes_field(&payload, "data_b64", &self.plugin_id)?;
                Ok(json!({ "hex": self.crypto.sha512(&data) }))
            }
            "crypto.random_bytes" => {
                let n = payload
                    .get("n")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| missing_field(&self.plugin_id, "n"))? as usize;
                let bytes = self.crypto.random_bytes(n)?;
                Ok(json!({ "data_b64": STANDARD.encode(bytes) }))
            }
            "crypto.uuid_v4" => Ok(json!({ "uuid": self.crypto.uuid_v4() })),

            "time.now_ms" => Ok(json!({ "ms": self.time.now_ms() })),
            "time.sleep" => {
                let ms = payload
                    .get("ms")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| missing_field(&self.plugin_id, "ms"))?;
                self.time.sleep(ms).await?;
                Ok(Value::Null)
            }

            _ => Err(PluginError::CapabilityViolation {
                plugin_id: self.plugin_id.clone(),
                reason: format!("unknown host operation: {op}"),
            }),
        }
    }
}
