// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

use crate::controller::queue::WorkQueue;
use crate::reconcilers::Reconcile;
use crate::types::ResourceKey;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn, Instrument};

/// Start `count` workers pulling from `queue`; they exit when the queue shuts down
pub fn spawn_workers(
    count: usize,
    name: &str,
    queue: WorkQueue<ResourceKey>,
    reconciler: Arc<dyn Reconcile>,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|id| {
            let span = tracing::info_span!("worker", controller = %name, id);
            tokio::spawn(run_worker(queue.clone(), reconciler.clone()).instrument(span))
        })
        .collect()
}

async fn run_worker(queue: WorkQueue<ResourceKey>, reconciler: Arc<dyn Reconcile>) {
    while let Some(key) = queue.get().await {
        match reconciler.reconcile(&key).await {
            Ok(result) => {
                queue.forget(&key);
                if let Some(delay) = result.requeue_after {
                    queue.add_after(key.clone(), delay);
                }
            }
            Err(e) => {
                let delay = queue.add_rate_limited(key.clone());
                warn!("Reconcile of {} failed, retrying in {:?}: {}", key, delay, e);
            }
        }
        queue.done(&key);
    }
    debug!("Queue shut down, worker exiting");
}
