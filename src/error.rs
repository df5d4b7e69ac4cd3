// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::types::Kind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// The object changed since it was read; a fresh read is needed before retrying.
    #[error("Conflict updating {kind} {namespace}/{name} at resource version {resource_version}")]
    Conflict {
        kind: Kind,
        namespace: String,
        name: String,
        resource_version: String,
    },

    #[error("No targets found: no {kind} matched in namespace {namespace}")]
    NoTargetsFound { kind: Kind, namespace: String },

    #[error("API error on {kind} {namespace}/{name}: {source}")]
    TargetError {
        kind: Kind,
        namespace: String,
        name: String,
        #[source]
        source: Box<ControllerError>,
    },

    #[error("Invalid watch spec: {0}")]
    InvalidWatchSpec(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Malformed object: {0}")]
    MalformedObject(String),

    #[error("{failed} of {total} actions failed")]
    PartialFailure { failed: usize, total: usize },

    #[error("Watch stream error: {0}")]
    WatchError(String),

    #[error("Watch resource version expired: {0}")]
    WatchExpired(String),

    #[error("Leader lock error: {0}")]
    LeaderLockError(String),
}

impl ControllerError {
    /// Wrap an error with the identity of the object it occurred on.
    ///
    /// Conflicts and missing-target errors already carry their identity and are returned as is.
    pub fn for_target(self, kind: Kind, namespace: &str, name: &str) -> Self {
        match self {
            e @ (ControllerError::Conflict { .. }
            | ControllerError::NoTargetsFound { .. }
            | ControllerError::TargetError { .. }) => e,
            other => ControllerError::TargetError {
                kind,
                namespace: namespace.to_string(),
                name: name.to_string(),
                source: Box::new(other),
            },
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ControllerError::Conflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, ControllerError>;
