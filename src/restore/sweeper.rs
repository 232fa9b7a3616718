// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Restore Code Sweeper
//!
//! Background task that periodically drops used and expired restore codes so
//! the code table never fills with dead entries.
//!
//! ## Shutdown
//!
//! Uses `tokio_util::sync::CancellationToken` for graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::authority::RestoreAuthority;

/// Default interval between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Periodic purge of inactive restore codes.
pub struct RestoreCodeSweeper {
    authority: Arc<RestoreAuthority>,
    interval: Duration,
}

impl RestoreCodeSweeper {
    pub fn new(authority: Arc<RestoreAuthority>, interval: Duration) -> Self {
        Self {
            authority,
            interval,
        }
    }

    /// Run the sweep loop until the cancellation token is triggered.
    ///
    /// Should be spawned as a background task:
    /// ```rust,ignore
    /// tokio::spawn(sweeper.run(shutdown.clone()));
    /// ```
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Restore code sweeper starting"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {},
                _ = shutdown.cancelled() => {
                    info!("Restore code sweeper shutting down");
                    return;
                }
            }

            self.sweep_step();
        }
    }

    fn sweep_step(&self) {
        let removed = self.authority.purge_inactive();
        if removed > 0 {
            info!(removed, "Purged inactive restore codes");
        } else {
            debug!("No inactive restore codes to purge");
        }
    }
}
