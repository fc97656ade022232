//! HMAC-SHA256 signing over canonical event bytes.
//!
//! Generalizes the teacher's plain `Hash256::from_content` (a bare SHA-256
//! digest with no key) into a keyed MAC, since the event model needs both a
//! hash-chain digest *and* a signature that only holders of the secret can
//! produce or verify.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("secret key is empty")]
    EmptySecretKey,

    #[error("secret key is too weak: must be at least 32 bytes with nontrivial entropy")]
    WeakSecretKey,
}

/// A validated HMAC signing key. Weakness checks run once, at construction,
/// so a misconfigured deployment fails fast at startup rather than on the
/// first request (see the error-handling design's "fatal at startup" rule
/// for crypto misconfiguration).
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, SignatureError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(SignatureError::EmptySecretKey);
        }
        if bytes.len() < 32 {
            return Err(SignatureError::WeakSecretKey);
        }
        if bytes.iter().all(|b| *b == bytes[0]) {
            return Err(SignatureError::WeakSecretKey);
        }
        Ok(Self(bytes))
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SecretKey").field(&"<redacted>").finish()
    }
}

/// A 32-byte HMAC-SHA256 signature, represented externally as base64.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature([u8; 32]);

impl Signature {
    pub fn compute(data: &[u8], key: &SecretKey) -> Self {
        let mut mac =
            HmacSha256::new_from_slice(&key.0).expect("HMAC accepts keys of any length");
        mac.update(data);
        let bytes: [u8; 32] = mac.finalize().into_bytes().into();
        Self(bytes)
    }

    /// Constant-time verification against the signature the caller expects
    /// `data` to carry.
    pub fn verify(&self, data: &[u8], key: &SecretKey) -> bool {
        let mut mac =
            HmacSha256::new_from_slice(&key.0).expect("HMAC accepts keys of any length");
        mac.update(data);
        mac.verify_slice(&self.0).is_ok()
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        BASE64.encode(self.0)
    }
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_base64())
    }
}
