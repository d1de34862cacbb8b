//! Crypto capability facade (spec §4.1, ungated).

use rand::RngCore;
use runtime_core::PluginError;
use sha2::{Digest, Sha256, Sha512};
use uuid::Uuid;

const MAX_RANDOM_BYTES: usize = 1024;

#[derive(Default)]
pub struct CryptoCapability;

impl CryptoCapability {
    pub fn sha256(&self, data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    pub fn sha512(&self, data: &[u8]) -> String {
        let mut hasher = Sha512::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    pub fn random_bytes(&self, n: usize) -> Result<Vec<u8>, PluginError> {
        if n > MAX_RANDOM_BYTES {
            return Err(PluginError::CapabilityViolation {
                plugin_id: String::new(),
                reason: format!("requested {n} random bytes, max is {MAX_RANDOM_BYTES}"),
            });
        }
        let mut buf = vec![0u8; n];
        rand::thread_rng().fill_bytes(&mut buf);
        Ok(buf)
    }

    pub fn uuid_v4(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_is_deterministic() {
        let crypto = CryptoCapability::default();
        assert_eq!(crypto.sha256(b"abc"), crypto.sha256(b"abc"));
    }

    #[test]
    fn random_bytes_rejects_over_limit() {
        let crypto = CryptoCapability::default();
        assert!(crypto.random_bytes(2000).is_err());
        assert_eq!(crypto.random_bytes(32).unwrap().len(), 32);
    }

    #[test]
    fn uuid_v4_is_well_formed() {
        let crypto = CryptoCapability::default();
        let id = crypto.uuid_v4();
        assert_eq!(id.len(), 36);
    }
}
