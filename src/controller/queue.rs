// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Deduplicating, rate-limited, delaying work queue.
//!
//! A key is either waiting in the queue, being processed, or both (dirty while
//! processing). It is never handed to two consumers at once: a key added while
//! in flight is queued again only when [`WorkQueue::done`] is called for it.

use crate::config::RateLimiterSettings;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::sleep;
use tracing::trace;

struct QueueState<K> {
    queue: VecDeque<K>,
    /// Keys that need processing, queued or waiting for an in-flight run to finish
    dirty: HashSet<K>,
    processing: HashSet<K>,
    failures: HashMap<K, u32>,
    shutting_down: bool,
}

struct Inner<K> {
    state: Mutex<QueueState<K>>,
    notify: Notify,
    base_delay: Duration,
    max_delay: Duration,
}

pub struct WorkQueue<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    failures: HashMap::new(),
                    shutting_down: false,
                }),
                notify: Notify::new(),
                base_delay,
                max_delay,
            }),
        }
    }

    pub fn with_rate_limiter(settings: &RateLimiterSettings) -> Self {
        Self::new(settings.base_delay(), settings.max_delay())
    }

    fn state(&self) -> MutexGuard<'_, QueueState<K>> {
        // Critical sections never panic, so a poisoned lock still holds consistent state
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a key. No-op if it is already waiting; deferred if it is in flight.
    pub fn add(&self, key: K) {
        let mut state = self.state();
        if state.shutting_down || state.dirty.contains(&key) {
            return;
        }
        state.dirty.insert(key.clone());
        if state.processing.contains(&key) {
            trace!("Key in flight, marked dirty");
            return;
        }
        state.queue.push_back(key);
        drop(state);
        self.inner.notify.notify_one();
    }

    /// Wait for the next key. Returns `None` once the queue is shutting down.
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state();
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    let more = !state.queue.is_empty();
                    drop(state);
                    if more {
                        // Pass the wakeup on so idle consumers pick up the rest
                        self.inner.notify.notify_one();
                    }
                    return Some(key);
                }
            }

            notified.await;
        }
    }

    /// Mark processing of `key` finished; a key re-added meanwhile goes back in the queue.
    pub fn done(&self, key: &K) {
        let mut state = self.state();
        state.processing.remove(key);
        if state.dirty.contains(key) && !state.shutting_down {
            state.queue.push_back(key.clone());
            drop(state);
            self.inner.notify.notify_one();
        }
    }

    /// Add the key once `delay` has passed
    pub fn add_after(&self, key: K, delay: Duration) {
        if self.is_shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.add(key);
            return;
        }
        let queue = self.clone();
        tokio::spawn(async move {
            sleep(delay).await;
            queue.add(key);
        });
    }

    /// Add the key after its backoff delay, and grow that delay for next time
    pub fn add_rate_limited(&self, key: K) -> Duration {
        let delay = {
            let mut state = self.state();
            let failures = state.failures.entry(key.clone()).or_insert(0);
            let delay = backoff(self.inner.base_delay, self.inner.max_delay, *failures);
            *failures = failures.saturating_add(1);
            delay
        };
        self.add_after(key, delay);
        delay
    }

    /// Reset the key's backoff to the base delay
    pub fn forget(&self, key: &K) {
        self.state().failures.remove(key);
    }

    pub fn num_requeues(&self, key: &K) -> u32 {
        self.state().failures.get(key).copied().unwrap_or(0)
    }

    /// Stop accepting keys and release every waiting consumer
    pub fn shutdown(&self) {
        let mut state = self.state();
        state.shutting_down = true;
        state.queue.clear();
        state.dirty.clear();
        drop(state);
        self.inner.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state().shutting_down
    }

    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn backoff(base: Duration, max: Duration, failures: u32) -> Duration {
    let factor = 2u32.checked_pow(failures).unwrap_or(u32::MAX);
    base.checked_mul(factor).map_or(max, |d| d.min(max))
}
