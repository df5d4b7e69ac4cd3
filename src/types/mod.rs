// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Domain types shared across the control loop.

pub mod kind;
pub mod object;
pub mod spec;

pub use kind::Kind;
pub use object::{AnnotationTarget, CachedObject, ResourceKey};
pub use spec::{ActionSpec, ActionType, WatchSpec};
