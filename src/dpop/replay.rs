//! DPoP jti replay protection
//!
//! One process-wide store shared by every issuer: RFC 9449 jtis are globally
//! unique, so a jti observed under one issuer must not be fresh under
//! another.
//!
//! # How it works
//!
//! 1. `check_and_store` does an atomic put-if-absent. An existing entry older
//!    than the TTL is atomically replaced and counts as first sight; a live
//!    entry means replay.
//! 2. A background task sweeps expired entries every 60 seconds.
//! 3. When occupancy exceeds the configured max, the oldest entries by
//!    insertion order are evicted opportunistically.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// Interval between background sweeps.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
struct ReplayEntry {
    order: u64,
    seen_at: Instant,
}

#[derive(Debug)]
struct ReplayShared {
    entries: DashMap<String, ReplayEntry>,
    order: AtomicU64,
    max_entries: usize,
    ttl: Duration,
}

/// Linearizable first-sight tracker for DPoP proof jtis.
#[derive(Debug)]
pub struct ReplayGuard {
    shared: Arc<ReplayShared>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl ReplayGuard {
    /// Create the store and start its sweeper.
    ///
    /// Must run inside a Tokio runtime.
    #[must_use]
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        let shared = Arc::new(ReplayShared {
            entries: DashMap::new(),
            order: AtomicU64::new(0),
            max_entries,
            ttl,
        });
        let sweeper = {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(SWEEP_INTERVAL).await;
                    if Arc::strong_count(&shared) <= 1 {
                        break;
                    }
                    Self::sweep(&shared);
                }
            })
        };
        Self {
            shared,
            sweeper: Mutex::new(Some(sweeper)),
        }
    }

    /// Record `jti`; `true` means first sight inside the TTL, `false` means
    /// replay.
    ///
    /// The decision is atomic per jti: of any concurrent group presenting the
    /// same value, exactly one caller observes `true`.
    pub fn check_and_store(&self, jti: &str) -> bool {
        let fresh = ReplayEntry {
            order: self.shared.order.fetch_add(1, Ordering::Relaxed),
            seen_at: Instant::now(),
        };
        let first_sight = match self.shared.entries.entry(jti.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().seen_at.elapsed() > self.shared.ttl {
                    // Expired but not yet swept: replacing counts as first sight.
                    occupied.insert(fresh);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                true
            }
        };

        if first_sight && self.shared.entries.len() > self.shared.max_entries {
            self.evict_oldest();
        }
        first_sight
    }

    /// Drop entries older than the TTL.
    pub fn evict_expired(&self) {
        Self::sweep(&self.shared);
    }

    fn sweep(shared: &ReplayShared) {
        let ttl = shared.ttl;
        let before = shared.entries.len();
        shared.entries.retain(|_, entry| entry.seen_at.elapsed() <= ttl);
        let removed = before.saturating_sub(shared.entries.len());
        if removed > 0 {
            debug!(removed, "swept expired DPoP jtis");
        }
    }

    fn evict_oldest(&self) {
        while self.shared.entries.len() > self.shared.max_entries {
            let oldest = self
                .shared
                .entries
                .iter()
                .min_by_key(|entry| entry.value().order)
                .map(|entry| entry.key().clone());
            let Some(key) = oldest else { break };
            self.shared.entries.remove(&key);
            debug!("evicted oldest DPoP jti under capacity pressure");
        }
    }

    /// Current number of tracked jtis.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.entries.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.entries.is_empty()
    }

    /// Stop the sweeper and clear the store.
    pub fn close(&self) {
        if let Some(task) = self.sweeper.lock().take() {
            task.abort();
        }
        self.shared.entries.clear();
    }
}

impl Drop for ReplayGuard {
    fn drop(&mut self) {
        self.close();
    }
}
