// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Actions run against live target objects when a watched object changes.

pub mod annotate;

pub use annotate::AnnotateWithTimestamp;

use crate::error::{ControllerError, Result};
use crate::kubernetes::{KindRegistry, ObjectStore};
use crate::types::{ActionSpec, ActionType};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &ActionSpec) -> Result<()>;
}

/// Registry mapping each action type to its executor, built once at startup
#[derive(Clone, Default)]
pub struct ActionRegistry {
    executors: HashMap<ActionType, Arc<dyn ActionExecutor>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin(
        store: Arc<dyn ObjectStore>,
        kinds: KindRegistry,
        conflict_retries: u32,
    ) -> Self {
        Self::new().register(
            ActionType::AnnotateWithTimestamp,
            Arc::new(AnnotateWithTimestamp::new(store, kinds, conflict_retries)),
        )
    }

    pub fn register(mut self, action_type: ActionType, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executors.insert(action_type, executor);
        self
    }

    pub fn get(&self, action_type: ActionType) -> Result<Arc<dyn ActionExecutor>> {
        self.executors.get(&action_type).cloned().ok_or_else(|| {
            ControllerError::Unsupported(format!("no executor registered for {}", action_type))
        })
    }

    pub fn contains(&self, action_type: ActionType) -> bool {
        self.executors.contains_key(&action_type)
    }
}
