// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Synced cache: an in-memory copy of one watch scope, kept current by list + watch.
//!
//! Only the task running [`SyncedCache::run`] writes the store. Everyone else
//! holds a [`CacheReader`] and receives shared immutable snapshots.

use crate::constants::watch::{RELIST_INTERVAL_MILLIS, RELIST_MAX_INTERVAL_MILLIS};
use crate::controller::filter::EventType;
use crate::error::ControllerError;
use crate::kubernetes::{ObjectStore, WatchEvent, WatchScope};
use crate::leader::elector::shutdown_requested;
use crate::types::{CachedObject, ResourceKey};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

type Objects = HashMap<ResourceKey, Arc<CachedObject>>;

/// Receives every change the cache applies, after the store reflects it
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_event(&self, event: EventType, object: &CachedObject);
}

/// Read-only, cloneable view of a synced cache
#[derive(Clone)]
pub struct CacheReader {
    objects: Arc<RwLock<Objects>>,
    synced: Arc<AtomicBool>,
}

impl CacheReader {
    pub async fn get(&self, key: &ResourceKey) -> Option<Arc<CachedObject>> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// True once the initial list has been applied
    pub fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }
}

/// The single writing handle; deliberately not `Clone`
struct CacheWriter {
    objects: Arc<RwLock<Objects>>,
    synced: Arc<AtomicBool>,
}

impl CacheWriter {
    fn new() -> (Self, CacheReader) {
        let objects = Arc::new(RwLock::new(HashMap::new()));
        let synced = Arc::new(AtomicBool::new(false));
        let reader = CacheReader {
            objects: objects.clone(),
            synced: synced.clone(),
        };
        (Self { objects, synced }, reader)
    }

    async fn upsert(&self, object: CachedObject) -> Arc<CachedObject> {
        let object = Arc::new(object);
        self.objects
            .write()
            .await
            .insert(object.key(), object.clone());
        object
    }

    async fn remove(&self, key: &ResourceKey) -> Option<Arc<CachedObject>> {
        self.objects.write().await.remove(key)
    }

    async fn snapshot(&self) -> Vec<Arc<CachedObject>> {
        self.objects.read().await.values().cloned().collect()
    }

    fn mark_synced(&self) {
        self.synced.store(true, Ordering::Release);
    }
}

enum WatchOutcome {
    /// The server closed the stream; resume from the last seen version
    Ended,
    /// The stream failed or the version expired; a fresh list is needed
    Relist,
    Stopped,
}

pub struct SyncedCache {
    scope: WatchScope,
    store: Arc<dyn ObjectStore>,
    handler: Arc<dyn EventHandler>,
    writer: CacheWriter,
    reader: CacheReader,
    resync_period: Option<Duration>,
    version: Option<String>,
}

impl SyncedCache {
    pub fn new(
        scope: WatchScope,
        store: Arc<dyn ObjectStore>,
        handler: Arc<dyn EventHandler>,
        resync_period: Option<Duration>,
    ) -> Self {
        let (writer, reader) = CacheWriter::new();
        Self {
            scope,
            store,
            handler,
            writer,
            reader,
            resync_period,
            version: None,
        }
    }

    pub fn reader(&self) -> CacheReader {
        self.reader.clone()
    }

    /// List, then watch, until `stop` fires. Failures relist with backoff.
    #[instrument(skip_all, fields(kind = %self.scope.kind, namespace = %self.scope.namespace))]
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        let mut backoff = Duration::from_millis(RELIST_INTERVAL_MILLIS);
        let max_backoff = Duration::from_millis(RELIST_MAX_INTERVAL_MILLIS);
        let mut resync = self.resync_period.map(|period| {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            if self.version.is_none() {
                let listed = tokio::select! {
                    result = self.relist() => result,
                    _ = shutdown_requested(&mut stop) => break,
                };
                if let Err(e) = listed {
                    warn!("Failed to list objects, retrying in {:?}: {}", backoff, e);
                    tokio::select! {
                        _ = sleep(backoff) => {}
                        _ = shutdown_requested(&mut stop) => break,
                    }
                    backoff = (backoff * 2).min(max_backoff);
                    continue;
                }
                backoff = Duration::from_millis(RELIST_INTERVAL_MILLIS);
            }

            match self.watch(&mut stop, &mut resync).await {
                WatchOutcome::Ended => debug!("Watch stream ended, resuming"),
                WatchOutcome::Relist => {
                    self.version = None;
                    tokio::select! {
                        _ = sleep(backoff) => {}
                        _ = shutdown_requested(&mut stop) => break,
                    }
                    backoff = (backoff * 2).min(max_backoff);
                }
                WatchOutcome::Stopped => break,
            }
        }
        debug!("Cache stopped");
    }

    /// Replace the store contents with a fresh list, dispatching only real changes
    async fn relist(&mut self) -> crate::error::Result<()> {
        let snapshot = self.store.list(&self.scope).await?;
        let mut stale: HashMap<ResourceKey, Arc<CachedObject>> = self
            .writer
            .snapshot()
            .await
            .into_iter()
            .map(|o| (o.key(), o))
            .collect();

        let mut changed = 0;
        for object in snapshot.objects {
            let previous = stale.remove(&object.key());
            let event = match &previous {
                Some(old) if old.resource_version() == object.resource_version() => continue,
                Some(_) => EventType::Update,
                None => EventType::Add,
            };
            let object = self.writer.upsert(object).await;
            self.handler.on_event(event, &object).await;
            changed += 1;
        }
        for (key, _) in stale {
            if let Some(object) = self.writer.remove(&key).await {
                self.handler.on_event(EventType::Delete, &object).await;
                changed += 1;
            }
        }

        if !self.reader.has_synced() {
            info!(
                "Cache synced with {} objects at version {}",
                self.reader.len().await,
                snapshot.resource_version
            );
        } else {
            debug!(
                "Relisted at version {}, {} changes",
                snapshot.resource_version, changed
            );
        }
        self.writer.mark_synced();
        self.version = Some(snapshot.resource_version);
        Ok(())
    }

    async fn watch(
        &mut self,
        stop: &mut watch::Receiver<bool>,
        resync: &mut Option<Interval>,
    ) -> WatchOutcome {
        let since = self.version.clone().unwrap_or_default();
        let mut stream = tokio::select! {
            result = self.store.watch(&self.scope, &since) => match result {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Failed to start watch: {}", e);
                    return WatchOutcome::Relist;
                }
            },
            _ = shutdown_requested(stop) => return WatchOutcome::Stopped,
        };

        loop {
            tokio::select! {
                event = stream.next() => match event {
                    Some(Ok(event)) => self.apply(event).await,
                    Some(Err(ControllerError::WatchExpired(msg))) => {
                        info!("Watch version expired, relisting: {}", msg);
                        return WatchOutcome::Relist;
                    }
                    Some(Err(e)) => {
                        warn!("Watch failed, relisting: {}", e);
                        return WatchOutcome::Relist;
                    }
                    None => return WatchOutcome::Ended,
                },
                _ = next_resync(resync) => self.resync().await,
                _ = shutdown_requested(stop) => return WatchOutcome::Stopped,
            }
        }
    }

    async fn apply(&mut self, event: WatchEvent) {
        let (event, object) = match event {
            WatchEvent::Added(object) => (EventType::Add, self.writer.upsert(object).await),
            WatchEvent::Modified(object) => (EventType::Update, self.writer.upsert(object).await),
            WatchEvent::Deleted(object) => {
                self.writer.remove(&object.key()).await;
                (EventType::Delete, Arc::new(object))
            }
            WatchEvent::Bookmark(version) => {
                self.version = Some(version);
                return;
            }
        };
        if let Some(version) = object.resource_version() {
            self.version = Some(version.to_string());
        }
        self.handler.on_event(event, &object).await;
    }

    /// Re-deliver every cached object as an update
    async fn resync(&self) {
        let objects = self.writer.snapshot().await;
        debug!("Resyncing {} objects", objects.len());
        for object in objects {
            self.handler.on_event(EventType::Update, &object).await;
        }
    }
}

async fn next_resync(resync: &mut Option<Interval>) {
    match resync {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
