//! RSA-SHA256 signature verification (spec §6), with an LRU cache
//! keyed by source hash so re-verifying an unchanged plugin on a
//! subsequent `load` is a cache hit, not a fresh RSA operation.
//!
//! Shaped after the teacher's `SignatureVerifier` trait in
//! `secure_plugin_system.rs` (load-time verification behind an async
//! trait, trusted keys loaded once at construction), swapped from
//! ed25519 to RSA to match the signature scheme this runtime requires.

use std::sync::Mutex;

use lru::LruCache;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha2::Sha256;

use runtime_core::{PluginError, PluginResult};

const CACHE_CAPACITY: usize = 256;

/// Verifies detached RSA-SHA256 signatures over a plugin's source
/// hash. The cache never substitutes for verification: a miss always
/// performs a real RSA check, and a plugin whose source hash changes
/// gets a fresh cache entry rather than reusing the old verdict.
pub struct SignatureVerifier {
    public_key: RsaPublicKey,
    cache: Mutex<LruCache<String, bool>>,
}

impl SignatureVerifier {
    pub fn from_public_key_pem(pem: &str) -> PluginResult<Self> {
        let public_key = RsaPublicKey::from_public_key_pem(pem).map_err(|e| {
            PluginError::MalformedManifest {
                plugin_id: String::new(),
                reason: format!("invalid public key: {e}"),
            }
        })?;
        Ok(SignatureVerifier {
            public_key,
            cache: Mutex::new(LruCache::new(
                std::num::NonZeroUsize::new(CACHE_CAPACITY).unwrap(),
            )),
        })
    }

    /// Verify `signature_hex` (a hex-encoded PKCS#1 v1.5 RSA-SHA256
    /// signature) over `source_hash` -- the caller's signed digest, not
    /// necessarily a single file's hash; `runtime-loader` passes the
    /// three-part manifest+entry+other-files digest spec §6 fixes.
    /// Results are memoized per digest; a previously-failed digest is
    /// not retried unless the signature bytes differ, matching the
    /// spec's "verification cache never substitutes for re-verification
    /// on source change" rule: the key is the digest, so any source or
    /// manifest change always misses.
    pub fn verify(&self, plugin_id: &str, source_hash: &str, signature_hex: &str) -> PluginResult<()> {
        let cache_key = format!("{source_hash}:{signature_hex}");
        if let Some(&result) = self.cache.lock().unwrap().peek(&cache_key) {
            return if result {
                Ok(())
            } else {
                Err(PluginError::SignatureInvalid {
                    plugin_id: plugin_id.to_string(),
                })
            };
        }

        let verified = self.verify_uncached(source_hash, signature_hex);
        self.cache.lock().unwrap().put(cache_key, verified);

        if verified {
            Ok(())
        } else {
            Err(PluginError::SignatureInvalid {
                plugin_id: plugin_id.to_string(),
            })
        }
    }

    fn verify_uncached(&self, source_hash: &str, signature_hex: &str) -> bool {
        let Ok(sig_bytes) = hex::decode(signature_hex) else {
            return false;
        };
        let Ok(signature) = Signature::try_from(sig_bytes.as_slice()) else {
            return false;
        };
        let verifying_key = VerifyingKey::<Sha256>::new(self.public_key.clone());
        verifying_key.verify(source_hash.as_bytes(), &signature).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1v15::SigningKey;
    use rsa::pkcs8::EncodePublicKey;
    use rsa::signature::{RandomizedSigner, SignatureEncoding};
    use rsa::RsaPrivateKey;

    fn keypair() -> (RsaPrivateKey, String) {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public_key = RsaPublicKey::from(&private_key);
        let pem = public_key.to_public_key_pem(Default::default()).unwrap();
        (private_key, pem)
    }

    #[test]
    fn valid_signature_verifies() {
        let (private_key, pem) = keypair();
        let verifier = SignatureVerifier::from_public_key_pem(&pem).unwrap();

        let signing_key = SigningKey::<Sha256>::new(private_key);
        let mut rng = rand::thread_rng();
        let signature = signing_key.sign_with_rng(&mut rng, b"abc123hash");
        let sig_hex = hex::encode(signature.to_bytes());

        assert!(verifier.verify("demo", "abc123hash", &sig_hex).is_ok());
    }

    #[test]
    fn tampered_hash_fails_verification() {
        let (private_key, pem) = keypair();
        let verifier = SignatureVerifier::from_public_key_pem(&pem).unwrap();

        let signing_key = SigningKey::<Sha256>::new(private_key);
        let mut rng = rand::thread_rng();
        let signature = signing_key.sign_with_rng(&mut rng, b"abc123hash");
        let sig_hex = hex::encode(signature.to_bytes());

        let err = verifier.verify("demo", "different-hash", &sig_hex).unwrap_err();
        assert_eq!(err.kind_tag(), "signature_invalid");
    }

    #[test]
    fn malformed_signature_hex_fails_cleanly() {
        let (_private_key, pem) = keypair();
        let verifier = SignatureVerifier::from_public_key_pem(&pem).unwrap();
        assert!(verifier.verify("demo", "abc123hash", "not-hex!!").is_err());
    }
}
