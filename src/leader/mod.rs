// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Leader election: one active replica at a time, coordinated through an external lock.

pub mod elector;

pub use elector::{LeaderElector, LeaseTiming};

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

/// Whether this process may run reconciliation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeaderState {
    Standby,
    Active,
}

impl fmt::Display for LeaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeaderState::Standby => f.write_str("standby"),
            LeaderState::Active => f.write_str("active"),
        }
    }
}

/// Exclusive, TTL-based lock shared by all replicas.
#[async_trait]
pub trait LeaderLock: Send + Sync {
    /// Take the lock if it is free, expired or already ours. Returns whether `holder` now holds it.
    async fn acquire(&self, holder: &str, lease_duration: Duration) -> Result<bool>;

    /// Extend our lease. Returns false once the lock belongs to someone else.
    async fn renew(&self, holder: &str, lease_duration: Duration) -> Result<bool>;

    /// Give the lock up so a peer does not have to wait out the lease
    async fn release(&self, holder: &str) -> Result<()>;
}
