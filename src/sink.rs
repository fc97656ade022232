//! The `AuditSink` contract and in-memory reference implementations.
//!
//! Grounded on `providers::Provider` (an `async_trait` object-safe
//! collaborator the core only depends on through its trait, with concrete
//! implementations living outside the abstraction).

use crate::domain::event::AuditEvent;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink transport error: {0}")]
    Transport(String),
}

/// Accepts sealed audit events. Implementations may batch, persist, or
/// forward; the core treats any error as non-fatal unless the middleware's
/// `continue_on_error` policy says otherwise.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn submit(&self, event: &AuditEvent) -> Result<(), SinkError>;
}

/// Discards every event. Useful as a default when audit output genuinely
/// isn't wired up yet (tests of unrelated components, local smoke runs).
#[derive(Debug, Default)]
pub struct NullAuditSink;

#[async_trait]
impl AuditSink for NullAuditSink {
    async fn submit(&self, _event: &AuditEvent) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Buffers events in memory in emission order. The reference sink for
/// integration tests that need to inspect what was emitted (e.g. to run
/// `HashChain::verify_range` over a captured sequence).
#[derive(Debug, Default)]
pub struct VecAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl VecAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl AuditSink for VecAuditSink {
    async fn submit(&self, event: &AuditEvent) -> Result<(), SinkError> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}
