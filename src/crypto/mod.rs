//! Cryptographic primitives backing the audit event model: HMAC signing
//! and SHA-256 hash-chain linkage.

pub mod hash_chain;
pub mod signature;

pub use hash_chain::{ChainLink, HashChain};
pub use signature::{SecretKey, Signature, SignatureError};
