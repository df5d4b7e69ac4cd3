// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! One watch → filter → queue → reconcile pipeline per watch spec.

use crate::actions::ActionRegistry;
use crate::config::Config;
use crate::controller::cache::{CacheReader, EventHandler, SyncedCache};
use crate::controller::filter::{should_enqueue, EventType};
use crate::controller::queue::WorkQueue;
use crate::controller::worker::spawn_workers;
use crate::error::{ControllerError, Result};
use crate::kubernetes::{KindRegistry, ObjectStore, WatchScope};
use crate::reconcilers::WatchReconciler;
use crate::types::{CachedObject, ResourceKey, WatchSpec};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, trace, warn};

/// Filters cache events and queues the keys that pass
struct Enqueuer {
    spec: Arc<WatchSpec>,
    queue: WorkQueue<ResourceKey>,
}

#[async_trait]
impl EventHandler for Enqueuer {
    async fn on_event(&self, event: EventType, object: &CachedObject) {
        if should_enqueue(event, &self.spec, object.namespace()) {
            trace!("Queueing {} {} on {}", object.kind, object.key(), event);
            self.queue.add(object.key());
        }
    }
}

/// A validated watch spec plus everything needed to run it
pub struct ControlLoop {
    spec: Arc<WatchSpec>,
    store: Arc<dyn ObjectStore>,
    actions: ActionRegistry,
    config: Arc<Config>,
    /// Shared with every run, so readiness can be read without a running loop
    synced: Arc<AtomicBool>,
}

impl ControlLoop {
    /// Check a watch spec against the registries; an invalid spec never gets a loop
    pub fn new(
        spec: WatchSpec,
        config: Arc<Config>,
        store: Arc<dyn ObjectStore>,
        kinds: &KindRegistry,
        actions: ActionRegistry,
    ) -> Result<Self> {
        if !spec.kind.is_watchable() {
            return Err(ControllerError::InvalidWatchSpec(format!(
                "{} cannot be watched",
                spec.kind
            )));
        }
        if spec.namespace.trim().is_empty() {
            return Err(ControllerError::InvalidWatchSpec(format!(
                "no namespace set for {}",
                spec.kind
            )));
        }
        kinds.get(spec.kind)?;
        for action in &spec.actions {
            if !actions.contains(action.action_type) {
                return Err(ControllerError::Unsupported(format!(
                    "action {}",
                    action.action_type
                )));
            }
            kinds.get(action.target_kind)?;
            if action.target_namespace.trim().is_empty() {
                return Err(ControllerError::InvalidWatchSpec(format!(
                    "no target namespace set for {}",
                    action
                )));
            }
        }

        Ok(Self {
            spec: Arc::new(spec),
            store,
            actions,
            config,
            synced: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn name(&self) -> String {
        self.spec.describe()
    }

    /// Whether the cache of the running loop finished its initial list
    pub fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    pub(crate) fn synced_flag(&self) -> Arc<AtomicBool> {
        self.synced.clone()
    }

    fn scope(&self) -> WatchScope {
        WatchScope {
            kind: self.spec.kind,
            namespace: self.spec.namespace.clone(),
            label_selector: self.spec.label_selector(),
            field_selector: self.spec.field_selector(),
        }
    }

    /// Start the cache, then the workers once the cache has synced
    pub fn start(&self) -> RunningLoop {
        let name = self.name();
        info!("Starting control loop for {}", name);

        let queue = WorkQueue::with_rate_limiter(&self.config.rate_limiter);
        let handler = Arc::new(Enqueuer {
            spec: self.spec.clone(),
            queue: queue.clone(),
        });
        let cache = SyncedCache::new(
            self.scope(),
            self.store.clone(),
            handler,
            self.config.resync_period(),
        );
        let reader = cache.reader();
        let (stop_tx, stop_rx) = watch::channel(false);
        let cache_task = tokio::spawn(cache.run(stop_rx));

        let reconciler = Arc::new(WatchReconciler::new(
            self.spec.clone(),
            reader.clone(),
            self.actions.clone(),
            self.config.requeue_on_partial_failure,
        ));
        let workers = self.config.workers;
        let synced = self.synced.clone();
        synced.store(false, Ordering::Release);
        let worker_queue = queue.clone();
        let worker_name = name.clone();
        let supervisor = tokio::spawn(async move {
            wait_for_sync(&reader).await;
            synced.store(true, Ordering::Release);
            if worker_queue.is_shutting_down() {
                return Vec::new();
            }
            debug!("Cache for {} synced, starting {} workers", worker_name, workers);
            spawn_workers(workers, &worker_name, worker_queue, reconciler)
        });

        RunningLoop {
            name,
            queue,
            synced: self.synced.clone(),
            stop_tx,
            cache_task,
            supervisor,
        }
    }
}

async fn wait_for_sync(reader: &CacheReader) {
    while !reader.has_synced() {
        sleep(Duration::from_millis(100)).await;
    }
}

/// Handle on a started loop
pub struct RunningLoop {
    name: String,
    queue: WorkQueue<ResourceKey>,
    synced: Arc<AtomicBool>,
    stop_tx: watch::Sender<bool>,
    cache_task: JoinHandle<()>,
    supervisor: JoinHandle<Vec<JoinHandle<()>>>,
}

impl RunningLoop {
    /// Stop watching and queueing, let in-flight reconciles finish within `grace`
    pub async fn stop(self, grace: Duration) {
        info!("Stopping control loop for {}", self.name);
        let _ = self.stop_tx.send(true);
        self.queue.shutdown();

        if let Err(e) = self.cache_task.await {
            warn!("Cache task for {} ended abnormally: {}", self.name, e);
        }

        let workers = if self.supervisor.is_finished() {
            self.supervisor.await.unwrap_or_else(|e| {
                warn!("Worker supervisor for {} failed: {}", self.name, e);
                Vec::new()
            })
        } else {
            // Still waiting for sync: no workers were started
            self.supervisor.abort();
            let _ = self.supervisor.await;
            Vec::new()
        };
        self.synced.store(false, Ordering::Release);

        let aborts: Vec<_> = workers.iter().map(|w| w.abort_handle()).collect();
        let joined = futures::future::join_all(workers);
        if timeout(grace, joined).await.is_err() {
            warn!(
                "Workers for {} did not finish within {:?}, aborting",
                self.name, grace
            );
            for abort in aborts {
                abort.abort();
            }
        }
    }
}
