// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Control loops: synced cache → event filter → work queue → workers → reconciler.

pub mod cache;
pub mod control_loop;
pub mod filter;
pub mod manager;
pub mod queue;
pub mod worker;

pub use cache::{CacheReader, EventHandler, SyncedCache};
pub use control_loop::{ControlLoop, RunningLoop};
pub use filter::{should_enqueue, EventType};
pub use manager::{ControllerManager, ManagerExit, Readiness};
pub use queue::WorkQueue;
pub use worker::spawn_workers;
