// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

use crate::actions::ActionRegistry;
use crate::controller::cache::CacheReader;
use crate::error::{ControllerError, Result};
use crate::reconcilers::{Reconcile, ReconcileResult};
use crate::types::{ResourceKey, WatchSpec};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Runs a watch spec's actions, in declared order, for a changed object
pub struct WatchReconciler {
    spec: Arc<WatchSpec>,
    cache: CacheReader,
    actions: ActionRegistry,
    requeue_on_partial_failure: bool,
}

impl WatchReconciler {
    pub fn new(
        spec: Arc<WatchSpec>,
        cache: CacheReader,
        actions: ActionRegistry,
        requeue_on_partial_failure: bool,
    ) -> Self {
        Self {
            spec,
            cache,
            actions,
            requeue_on_partial_failure,
        }
    }
}

#[async_trait]
impl Reconcile for WatchReconciler {
    #[instrument(skip(self), fields(kind = %self.spec.kind))]
    async fn reconcile(&self, key: &ResourceKey) -> Result<ReconcileResult> {
        // Deleted and not-yet-cached objects look the same here
        let Some(object) = self.cache.get(key).await else {
            debug!("{} {} is not in the cache, nothing to do", self.spec.kind, key);
            return Ok(ReconcileResult::done());
        };
        debug!(
            "Reconciling {} {} at version {}",
            object.kind,
            key,
            object.resource_version().unwrap_or("?")
        );

        let total = self.spec.actions.len();
        let mut succeeded = 0;
        for action in &self.spec.actions {
            let outcome = match self.actions.get(action.action_type) {
                Ok(executor) => executor.execute(action).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(()) => succeeded += 1,
                Err(e) => warn!("Action {} failed for {}: {}", action, key, e),
            }
        }

        if succeeded == total {
            info!("Ran {} actions for {} {}", total, self.spec.kind, key);
            return Ok(ReconcileResult::done());
        }
        warn!(
            "{} of {} actions succeeded for {} {}",
            succeeded, total, self.spec.kind, key
        );
        if self.requeue_on_partial_failure {
            return Err(ControllerError::PartialFailure {
                failed: total - succeeded,
                total,
            });
        }
        Ok(ReconcileResult {
            success: false,
            requeue_after: None,
        })
    }
}
