// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Bounded tracking of failed logins per username.
//!
//! Counts live in an LRU cache, so usernames typed once and never again are
//! evicted instead of accumulating. A count older than the window starts over.

use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use lru::LruCache;

/// Usernames tracked at once.
pub const DEFAULT_TRACKED_USERNAMES: usize = 1024;

/// Failures older than this no longer count.
pub const DEFAULT_FAILURE_WINDOW: Duration = Duration::from_secs(60 * 60);

struct Failures {
    count: u32,
    last_at: Instant,
}

/// Failed login counter keyed by lowercase username.
pub struct FailedLogins {
    cache: Mutex<LruCache<String, Failures>>,
    window: Duration,
}

impl Default for FailedLogins {
    fn default() -> Self {
        Self::new(DEFAULT_TRACKED_USERNAMES, DEFAULT_FAILURE_WINDOW)
    }
}

impl FailedLogins {
    pub fn new(capacity: usize, window: Duration) -> Self {
        Self {
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN),
            )),
            window,
        }
    }

    /// Record a failure and return how many are on file for `username`.
    pub fn record_failure(&self, username: &str) -> u32 {
        let key = username.to_lowercase();
        let now = Instant::now();
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);

        let count = match cache.get(&key) {
            Some(previous) if now.duration_since(previous.last_at) < self.window => {
                previous.count.saturating_add(1)
            }
            _ => 1,
        };
        cache.put(key, Failures { count, last_at: now });
        count
    }

    /// Forget failures for `username` after a successful login.
    pub fn clear(&self, username: &str) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop(&username.to_lowercase());
    }

    /// Usernames currently tracked.
    pub fn tracked(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl std::fmt::Debug for FailedLogins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailedLogins")
            .field("tracked", &self.tracked())
            .field("window", &self.window)
            .finish()
    }
}
