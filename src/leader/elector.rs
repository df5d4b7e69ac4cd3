// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Standby/Active state machine driven by a [`LeaderLock`].

use crate::config::LeaderElectionSettings;
use crate::leader::{LeaderLock, LeaderState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, instrument, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeaseTiming {
    /// How long a lease stays valid without renewal
    pub lease_duration: Duration,
    /// How long the active process keeps trying to renew before stepping down
    pub renew_deadline: Duration,
    /// Pause between acquisition and renewal attempts
    pub retry_period: Duration,
}

impl From<&LeaderElectionSettings> for LeaseTiming {
    fn from(settings: &LeaderElectionSettings) -> Self {
        Self {
            lease_duration: settings.lease_duration(),
            renew_deadline: settings.renew_deadline(),
            retry_period: settings.retry_period(),
        }
    }
}

pub struct LeaderElector {
    lock: Arc<dyn LeaderLock>,
    identity: String,
    timing: LeaseTiming,
    state_tx: watch::Sender<LeaderState>,
}

impl LeaderElector {
    /// Create an elector in Standby; the receiver observes every state transition
    pub fn new(
        lock: Arc<dyn LeaderLock>,
        identity: impl Into<String>,
        timing: LeaseTiming,
    ) -> (Self, watch::Receiver<LeaderState>) {
        let (state_tx, state_rx) = watch::channel(LeaderState::Standby);
        let elector = Self {
            lock,
            identity: identity.into(),
            timing,
            state_tx,
        };
        (elector, state_rx)
    }

    /// Contend for leadership until `shutdown` fires, then release the lock if held.
    ///
    /// Losing the lock moves back to Standby and contention resumes; it never ends the loop.
    #[instrument(skip_all, fields(identity = %self.identity))]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if !self.acquire(&mut shutdown).await {
                break;
            }
            info!("Acquired leader lock, becoming active");
            self.set_state(LeaderState::Active);

            let stopping = self.keep_renewing(&mut shutdown).await;
            self.set_state(LeaderState::Standby);

            if stopping {
                if let Err(e) = self.lock.release(&self.identity).await {
                    warn!("Failed to release leader lock: {}", e);
                } else {
                    info!("Released leader lock");
                }
                break;
            }
            warn!("Lost leader lock, back to standby");
        }
        debug!("Leader election stopped");
    }

    /// Returns true once the lock is held, false if shutdown came first
    async fn acquire(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        loop {
            if *shutdown.borrow() {
                return false;
            }
            match self
                .lock
                .acquire(&self.identity, self.timing.lease_duration)
                .await
            {
                Ok(true) => return true,
                Ok(false) => debug!("Leader lock held by another process"),
                Err(e) => warn!("Error acquiring leader lock: {}", e),
            }

            tokio::select! {
                _ = sleep(self.timing.retry_period) => {}
                _ = shutdown_requested(shutdown) => return false,
            }
        }
    }

    /// Returns true when stopping for shutdown, false when leadership was lost
    async fn keep_renewing(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let mut last_renew = Instant::now();
        loop {
            let elapsed = last_renew.elapsed();
            if elapsed >= self.timing.renew_deadline {
                warn!(
                    "Could not renew leader lock within {:?}",
                    self.timing.renew_deadline
                );
                return false;
            }
            let wait = self
                .timing
                .retry_period
                .min(self.timing.renew_deadline - elapsed);

            tokio::select! {
                _ = sleep(wait) => {}
                _ = shutdown_requested(shutdown) => return true,
            }

            let remaining = self
                .timing
                .renew_deadline
                .saturating_sub(last_renew.elapsed());
            if remaining.is_zero() {
                continue;
            }
            match timeout(
                remaining,
                self.lock.renew(&self.identity, self.timing.lease_duration),
            )
            .await
            {
                Ok(Ok(true)) => {
                    debug!("Renewed leader lock");
                    last_renew = Instant::now();
                }
                Ok(Ok(false)) => return false,
                Ok(Err(e)) => warn!("Error renewing leader lock: {}", e),
                Err(_) => warn!("Timed out renewing leader lock"),
            }
        }
    }

    fn set_state(&self, state: LeaderState) {
        self.state_tx.send_replace(state);
    }
}

/// Resolves once shutdown is signalled or the signalling side is gone
pub(crate) async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
