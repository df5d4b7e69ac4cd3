// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes access: kind adapters, the object store and the lease-backed leader lock.

pub mod lease;
pub mod registry;
pub mod store;

pub use lease::LeaseLock;
pub use registry::{KindAdapter, KindRegistry};
pub use store::{KubeStore, ObjectSnapshot, ObjectStore, WatchEvent, WatchScope, WatchStream};
