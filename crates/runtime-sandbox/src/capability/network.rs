//! Network capability facade (spec §4.1, permission `network`).
//!
//! Built on `reqwest`, already present in the teacher's stack for its
//! own HTTP engines. The response body is streamed and truncated at
//! `max_request_bytes` rather than buffered unbounded.

use std::collections::HashMap;
use std::time::Duration;

use futures::StreamExt;
use runtime_core::PluginError;
use url::Url;

#[derive(Debug, Default, Clone)]
pub struct FetchOptions {
    pub method: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub truncated: bool,
}

pub struct NetworkCapability {
    plugin_id: String,
    client: reqwest::Client,
    allowed_domains: Vec<String>,
    blocked_domains: Vec<String>,
    max_request_bytes: u64,
    max_timeout_ms: u64,
}

impl NetworkCapability {
    pub fn new(
        plugin_id: impl Into<String>,
        allowed_domains: Vec<String>,
        blocked_domains: Vec<String>,
        max_request_bytes: u64,
        max_timeout_ms: u64,
    ) -> Self {
        NetworkCapability {
            plugin_id: plugin_id.into(),
            client: reqwest::Client::new(),
            allowed_domains,
            blocked_domains,
            max_request_bytes,
            max_timeout_ms,
        }
    }

    fn check_domain(&self, url: &Url) -> Result<(), PluginError> {
        let host = url.host_str().unwrap_or_default().to_string();

        if self.blocked_domains.iter().any(|d| d == &host) {
            return Err(PluginError::CapabilityViolation {
                plugin_id: self.plugin_id.clone(),
                reason: format!("host '{host}' is blocked"),
            });
        }
        if !self.allowed_domains.is_empty() && !self.allowed_domains.iter().any(|d| d == &host) {
            return Err(PluginError::CapabilityViolation {
                plugin_id: self.plugin_id.clone(),
                reason: format!("host '{host}' is not in the allow list"),
            });
        }
        Ok(())
    }

    pub async fn fetch(&self, url_str: &str, opts: FetchOptions) -> Result<FetchResponse, PluginError> {
        let url = Url::parse(url_str).map_err(|e| PluginError::CapabilityViolation {
            plugin_id: self.plugin_id.clone(),
            reason: format!("invalid url: {e}"),
        })?;
        self.check_domain(&url)?;

        let timeout_ms = opts.timeout_ms.unwrap_or(self.max_timeout_ms).min(self.max_timeout_ms);
        let method = opts
            .method
            .as_deref()
            .unwrap_or("GET")
            .parse::<reqwest::Method>()
            .map_err(|_| PluginError::CapabilityViolation {
                plugin_id: self.plugin_id.clone(),
                reason: "invalid http method".into(),
            })?;

        let mut request = self
            .client
            .request(method, url)
            .timeout(Duration::from_millis(timeout_ms));
        for (key, value) in &opts.headers {
            request = request.header(key, value);
        }
        if let Some(body) = opts.body {
            request = request.body(body);
        }

        let response = request.send().await.map_err(|e| PluginError::CapabilityViolation {
            plugin_id: self.plugin_id.clone(),
            reason: format!("request failed: {e}"),
        })?;
        let status = response.status().as_u16();

        let mut body = Vec::new();
        let mut truncated = false;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| PluginError::CapabilityViolation {
                plugin_id: self.plugin_id.clone(),
                reason: format!("stream read failed: {e}"),
            })?;
            if body.len() as u64 + chunk.len() as u64 > self.max_request_bytes {
                let remaining = (self.max_request_bytes - body.len() as u64) as usize;
                body.extend_from_slice(&chunk[..remaining.min(chunk.len())]);
                truncated = true;
                break;
            }
            body.extend_from_slice(&chunk);
        }

        Ok(FetchResponse { status, body, truncated })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocked_domain_is_rejected() {
        let net = NetworkCapability::new("p1", vec![], vec!["evil.example".into()], 1024, 1000);
        let url = Url::parse("https://evil.example/data").unwrap();
        assert!(net.check_domain(&url).is_err());
    }

    #[test]
    fn allow_list_restricts_to_listed_hosts() {
        let net = NetworkCapability::new("p1", vec!["good.example".into()], vec![], 1024, 1000);
        let good = Url::parse("https://good.example/data").unwrap();
        let other = Url::parse("https://other.example/data").unwrap();
        assert!(net.check_domain(&good).is_ok());
        assert!(net.check_domain(&other).is_err());
    }

    #[test]
    fn empty_allow_list_permits_any_unblocked_host() {
        let net = NetworkCapability::new("p1", vec![], vec![], 1024, 1000);
        let url = Url::parse("https://anything.example/data").unwrap();
        assert!(net.check_domain(&url).is_ok());
    }
}
