// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Runs every control loop as a unit while this process is the leader.

use crate::actions::ActionRegistry;
use crate::config::Config;
use crate::controller::control_loop::{ControlLoop, RunningLoop};
use crate::kubernetes::{KindRegistry, ObjectStore};
use crate::leader::elector::shutdown_requested;
use crate::leader::LeaderState;
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Aggregate readiness: every loop's cache has synced
#[derive(Clone, Default)]
pub struct Readiness {
    synced: Arc<Vec<Arc<AtomicBool>>>,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        self.synced.iter().all(|s| s.load(Ordering::Acquire))
    }
}

/// Why [`ControllerManager::run`] returned
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManagerExit {
    Shutdown,
    LeadershipLost,
}

pub struct ControllerManager {
    config: Arc<Config>,
    loops: Vec<ControlLoop>,
}

impl ControllerManager {
    /// Build a loop per watched resource. An entry that does not parse or fails
    /// validation is logged and skipped.
    pub fn from_config(
        config: Arc<Config>,
        store: Arc<dyn ObjectStore>,
        kinds: &KindRegistry,
        actions: ActionRegistry,
    ) -> Self {
        let mut loops = Vec::new();
        for (index, parsed) in config.watch_specs().into_iter().enumerate() {
            let spec = match parsed {
                Ok(spec) => spec,
                Err(e) => {
                    error!("Skipping watched resource #{}: {}", index, e);
                    continue;
                }
            };
            let description = spec.describe();
            match ControlLoop::new(
                spec,
                config.clone(),
                store.clone(),
                kinds,
                actions.clone(),
            ) {
                Ok(control) => loops.push(control),
                Err(e) => error!(
                    "Skipping watched resource #{} ({}): {}",
                    index, description, e
                ),
            }
        }
        info!(
            "Configured {} of {} watched resources",
            loops.len(),
            config.watched_resources.len()
        );
        Self { config, loops }
    }

    pub fn loops(&self) -> &[ControlLoop] {
        &self.loops
    }

    pub fn readiness(&self) -> Readiness {
        Readiness {
            synced: Arc::new(self.loops.iter().map(|l| l.synced_flag()).collect()),
        }
    }

    /// Follow the leader state: start every loop on Active, stop them on Standby.
    ///
    /// Returns on shutdown, or on leadership loss when configured to exit then.
    /// Loops are always stopped before returning.
    pub async fn run(
        &self,
        mut leader: watch::Receiver<LeaderState>,
        mut shutdown: watch::Receiver<bool>,
    ) -> ManagerExit {
        let mut running: Option<Vec<RunningLoop>> = None;
        loop {
            let state = *leader.borrow_and_update();
            match (state, running.is_some()) {
                (LeaderState::Active, false) => {
                    info!("Leading, starting {} control loops", self.loops.len());
                    running = Some(self.loops.iter().map(ControlLoop::start).collect());
                }
                (LeaderState::Standby, true) => {
                    warn!("No longer leading, pausing control loops");
                    self.stop(running.take(), self.config.step_down_grace()).await;
                    if self.config.exit_on_leadership_loss {
                        return ManagerExit::LeadershipLost;
                    }
                }
                _ => {}
            }

            tokio::select! {
                changed = leader.changed() => {
                    if changed.is_err() {
                        warn!("Leader election ended, stopping control loops");
                        self.stop(running.take(), self.config.step_down_grace()).await;
                        return ManagerExit::Shutdown;
                    }
                }
                _ = shutdown_requested(&mut shutdown) => {
                    info!("Shutting down control loops");
                    self.stop(running.take(), self.config.shutdown_grace()).await;
                    return ManagerExit::Shutdown;
                }
            }
        }
    }

    async fn stop(&self, running: Option<Vec<RunningLoop>>, grace: Duration) {
        let Some(running) = running else {
            return;
        };
        join_all(running.into_iter().map(|l| l.stop(grace))).await;
        info!("All control loops stopped");
    }
}
