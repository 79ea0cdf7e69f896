//! TTL cache of solver solutions keyed by intent id.
//!
//! An entry exists only for intents the relay was asked to track. Appends for
//! any other id are discarded, so the cache cannot grow from untracked
//! upstream traffic. Every append slides the entry's expiry forward; reads do
//! not.

use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use relay_core::{IntentId, SolverSolution};
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::debug;

/// Default time an entry lives after its last touch.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

struct CacheEntry {
    solutions: Vec<SolverSolution>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Concurrent solution cache with sliding expiry.
pub struct SolutionCache {
    entries: DashMap<IntentId, CacheEntry>,
    ttl: Duration,
}

impl SolutionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Start tracking an intent. No-op if it is already tracked.
    pub fn create(&self, intent_id: &str) {
        let now = Instant::now();
        match self.entries.entry(intent_id.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(CacheEntry {
                        solutions: Vec::new(),
                        expires_at: now + self.ttl,
                    });
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry {
                    solutions: Vec::new(),
                    expires_at: now + self.ttl,
                });
            }
        }
    }

    /// Snapshot of the solutions for a tracked intent.
    ///
    /// `None` means the intent is not tracked; `Some(vec![])` means it is
    /// tracked but nothing has arrived yet.
    pub fn get(&self, intent_id: &str) -> Option<Vec<SolverSolution>> {
        let entry = self.entries.get(intent_id)?;
        if entry.is_expired(Instant::now()) {
            return None;
        }
        Some(entry.solutions.clone())
    }

    /// Append a solution to a tracked intent. Returns false if untracked.
    pub fn append(&self, intent_id: &str, solution: SolverSolution) -> bool {
        let now = Instant::now();
        let Some(mut entry) = self.entries.get_mut(intent_id) else {
            return false;
        };

        if entry.is_expired(now) {
            drop(entry);
            self.entries.remove_if(intent_id, |_, e| e.is_expired(now));
            return false;
        }

        entry.solutions.push(solution);
        entry.expires_at = now + self.ttl;
        true
    }

    /// Drop every expired entry. Returns how many were evicted.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Spawn a task that sweeps expired entries once per TTL.
    ///
    /// The task stops on its own once the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        let period = self.ttl;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let evicted = cache.purge_expired();
                if evicted > 0 {
                    debug!(evicted, "swept expired solution cache entries");
                }
            }
        })
    }
}

impl Default for SolutionCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
