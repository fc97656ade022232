//! Per-chain sequence and hash linkage.
//!
//! Generalizes the teacher's `AuditLogChain` (which keeps entries in a
//! `Vec` and checks linkage only at the end, for one context type `T`) into
//! a multi-chain registry that appends one event at a time and never holds
//! the events themselves — the Emitter owns those, this just hands back the
//! `(sequence, previousHash, eventHash)` triple for each append.

use crate::domain::identifiers::ChainName;
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

/// 32 zero bytes: the `previousHash` of the first event in any chain.
pub const GENESIS_HASH: [u8; 32] = [0u8; 32];

/// The result of appending one event's canonical bytes to a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainLink {
    pub sequence: u64,
    pub previous_hash: [u8; 32],
    pub event_hash: [u8; 32],
}

#[derive(Debug, Clone, Copy)]
struct ChainState {
    last_hash: [u8; 32],
    last_sequence: u64,
}

impl Default for ChainState {
    fn default() -> Self {
        Self {
            last_hash: GENESIS_HASH,
            last_sequence: 0,
        }
    }
}

/// Registry of independent hash chains, one per logical chain name.
#[derive(Debug, Default)]
pub struct HashChain {
    chains: RwLock<HashMap<ChainName, Arc<Mutex<ChainState>>>>,
}

impl HashChain {
    pub fn new() -> Self {
        Self::default()
    }

    fn chain_state(&self, name: &ChainName) -> Arc<Mutex<ChainState>> {
        if let Some(state) = self.chains.read().get(name) {
            return Arc::clone(state);
        }
        let mut chains = self.chains.write();
        Arc::clone(
            chains
                .entry(name.clone())
                .or_insert_with(|| Arc::new(Mutex::new(ChainState::default()))),
        )
    }

    /// Atomically increments the chain's sequence number and links
    /// `event_bytes` onto it. Never fails: an unknown chain name is created
    /// on first use, starting from the genesis hash.
    pub fn append(&self, name: &ChainName, event_bytes: &[u8]) -> ChainLink {
        let state = self.chain_state(name);
        let mut state = state.lock();

        let previous_hash = state.last_hash;
        let sequence = state.last_sequence + 1;

        let mut hasher = Sha256::new();
        hasher.update(previous_hash);
        hasher.update(event_bytes);
        let event_hash: [u8; 32] = hasher.finalize().into();

        state.last_hash = event_hash;
        state.last_sequence = sequence;

        ChainLink {
            sequence,
            previous_hash,
            event_hash,
        }
    }

    /// Recomputes a chain from a sequence of `(previous_hash, event_bytes)`
    /// pairs as recorded by the sink, and reports whether it reproduces the
    /// recorded hashes. Returns `(is_valid, first_break_index, aggregate_hash)`.
    pub fn verify_range<'a, I>(events: I) -> (bool, Option<usize>, [u8; 32])
    where
        I: IntoIterator<Item = (&'a [u8; 32], &'a [u8; 32], &'a [u8])>,
    {
        let mut expected_previous = GENESIS_HASH;
        let mut last_hash = GENESIS_HASH;
        let mut first_break = None;

        for (index, (recorded_previous, recorded_event_hash, event_bytes)) in
            events.into_iter().enumerate()
        {
            let mut hasher = Sha256::new();
            hasher.update(expected_previous);
            hasher.update(event_bytes);
            let recomputed: [u8; 32] = hasher.finalize().into();

            let matches =
                *recorded_previous == expected_previous && *recorded_event_hash == recomputed;

            if !matches && first_break.is_none() {
                first_break = Some(index);
            }

            last_hash = recomputed;
            expected_previous = recomputed;
        }

        (first_break.is_none(), first_break, last_hash)
    }
}
