//! Hosts known to answer without a password.
//!
//! Entries only decide whether the connector sends AUTH on the first
//! handshake with a host. A stale entry costs one extra round-trip, never a
//! wrong result, so updates are last-write-wins.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

/// Set of `host:port` keys for servers that run without `requirepass`.
#[derive(Debug, Default)]
pub struct CredentialCache {
    hosts: RwLock<HashSet<String>>,
}

static GLOBAL: OnceLock<Arc<CredentialCache>> = OnceLock::new();

impl CredentialCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide instance used when no cache is injected.
    pub fn global() -> Arc<CredentialCache> {
        GLOBAL.get_or_init(|| Arc::new(CredentialCache::new())).clone()
    }

    /// Remember that `host` accepts commands without AUTH.
    pub fn add(&self, host: &str) {
        let inserted = self.hosts.write().insert(host.to_string());
        if inserted {
            tracing::debug!(host, "host marked as not requiring auth");
        }
    }

    /// Forget `host`, typically after it answered NOAUTH.
    pub fn remove(&self, host: &str) {
        let removed = self.hosts.write().remove(host);
        if removed {
            tracing::debug!(host, "host now requires auth");
        }
    }

    pub fn contains(&self, host: &str) -> bool {
        self.hosts.read().contains(host)
    }

    pub fn len(&self) -> usize {
        self.hosts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.read().is_empty()
    }
}
