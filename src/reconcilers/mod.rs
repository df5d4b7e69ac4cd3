// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Reconcilers invoked by the worker pool, one key at a time.

pub mod watch;

pub use watch::WatchReconciler;

use crate::error::Result;
use crate::types::ResourceKey;
use async_trait::async_trait;
use std::time::Duration;

/// Outcome of a reconcile that did not fail outright
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconcileResult {
    pub success: bool,
    pub requeue_after: Option<Duration>,
}

impl ReconcileResult {
    pub fn done() -> Self {
        Self {
            success: true,
            requeue_after: None,
        }
    }

    /// Done for now, but look again after `delay`
    pub fn requeue(delay: Duration) -> Self {
        Self {
            success: true,
            requeue_after: Some(delay),
        }
    }
}

#[async_trait]
pub trait Reconcile: Send + Sync {
    /// An `Err` makes the worker requeue the key with backoff.
    async fn reconcile(&self, key: &ResourceKey) -> Result<ReconcileResult>;
}
