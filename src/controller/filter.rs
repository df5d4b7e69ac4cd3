// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

use crate::types::WatchSpec;
use std::fmt;

/// Kind of change observed for a cached object
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventType {
    Add,
    Update,
    Delete,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Add => f.write_str("add"),
            EventType::Update => f.write_str("update"),
            EventType::Delete => f.write_str("delete"),
        }
    }
}

/// Whether an event should be queued for reconciliation.
///
/// Selectors are not checked here: they already narrow the watch scope, so
/// every object the cache sees matches them.
pub fn should_enqueue(event: EventType, spec: &WatchSpec, object_namespace: &str) -> bool {
    let wanted = match event {
        EventType::Add => spec.watch_add,
        EventType::Update => spec.watch_update,
        EventType::Delete => spec.watch_delete,
    };
    wanted && object_namespace.eq_ignore_ascii_case(&spec.namespace)
}
