//! Freshness-bounded cache of built context documents.
//!
//! Keyed by purpose name plus the canonical JSON of the arguments, so two
//! requests that differ only in key order share an entry. Reads and writes
//! take a short lock and never wait on anything else.

use crate::purpose::Purpose;
use cadlens_core::{Payload, canonical_json};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Default freshness window.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    purpose: String,
    arguments: String,
}

impl CacheKey {
    fn new(purpose: &Purpose, arguments: &Payload) -> Self {
        Self {
            purpose: purpose.name().to_string(),
            arguments: canonical_json(&Value::Object(arguments.clone())),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    context: String,
    created_at: Instant,
}

/// Context documents younger than the TTL, keyed by request identity.
#[derive(Debug)]
pub struct ContextCache {
    ttl: Duration,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl ContextCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cached document, if one exists and is still fresh.
    pub fn get(&self, purpose: &Purpose, arguments: &Payload) -> Option<String> {
        let key = CacheKey::new(purpose, arguments);
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(&key)?;
        if entry.created_at.elapsed() < self.ttl {
            Some(entry.context.clone())
        } else {
            debug!(purpose = %purpose, "Cached context expired");
            None
        }
    }

    /// Store `context`, replacing any previous entry for the same request.
    pub fn insert(&self, purpose: &Purpose, arguments: &Payload, context: String) {
        let entry = CacheEntry {
            context,
            created_at: Instant::now(),
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(CacheKey::new(purpose, arguments), entry);
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| entry.created_at.elapsed() < self.ttl);
        before - entries.len()
    }
}

impl Default for ContextCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}
