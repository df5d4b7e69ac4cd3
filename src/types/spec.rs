// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Watch and action specifications, as read from the configuration file.

use crate::constants::DEFAULT_ANNOTATION_KEY;
use crate::types::Kind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One resource kind and scope to observe, plus the actions to run on matching changes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WatchSpec {
    pub kind: Kind,
    pub namespace: String,
    #[serde(default)]
    pub label_selectors: Vec<String>,
    #[serde(default)]
    pub field_selectors: Vec<String>,
    #[serde(default = "default_true")]
    pub watch_add: bool,
    #[serde(default = "default_true")]
    pub watch_update: bool,
    #[serde(default)]
    pub watch_delete: bool,
    #[serde(default, alias = "actionList")]
    pub actions: Vec<ActionSpec>,
}

impl WatchSpec {
    pub fn label_selector(&self) -> Option<String> {
        join_selectors(&self.label_selectors)
    }

    pub fn field_selector(&self) -> Option<String> {
        join_selectors(&self.field_selectors)
    }

    /// Short human readable label used in logs and task names
    pub fn describe(&self) -> String {
        format!("{} in namespace {}", self.kind, self.namespace)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionType {
    /// Stamp the current local date-time into an annotation on the target objects
    #[serde(rename = "annotateWithTimestamp", alias = "ANNOTATE_WITH_TIMESTAMP")]
    AnnotateWithTimestamp,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionType::AnnotateWithTimestamp => f.write_str("annotateWithTimestamp"),
        }
    }
}

/// A remediation to perform against live target objects.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionSpec {
    #[serde(rename = "type", alias = "actionType")]
    pub action_type: ActionType,
    #[serde(alias = "annotatedResourceKind")]
    pub target_kind: Kind,
    #[serde(alias = "annotatedResourceNamespace")]
    pub target_namespace: String,
    #[serde(default, alias = "annotatedResourceLabelsSelectors")]
    pub target_label_selectors: Vec<String>,
    #[serde(default, alias = "annotatedResourceFieldSelectors")]
    pub target_field_selectors: Vec<String>,
    #[serde(
        default = "default_annotation_key",
        alias = "annotatedResourceAnnotationName"
    )]
    pub annotation_key: String,
}

impl ActionSpec {
    pub fn label_selector(&self) -> Option<String> {
        join_selectors(&self.target_label_selectors)
    }

    pub fn field_selector(&self) -> Option<String> {
        join_selectors(&self.target_field_selectors)
    }
}

impl fmt::Display for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} on {} in {}",
            self.action_type, self.target_kind, self.target_namespace
        )?;
        if let Some(labels) = self.label_selector() {
            write!(f, " [{}]", labels)?;
        }
        Ok(())
    }
}

/// Join selector terms into the comma separated form the API server expects
pub fn join_selectors(selectors: &[String]) -> Option<String> {
    let terms: Vec<&str> = selectors
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(","))
    }
}

fn default_true() -> bool {
    true
}

fn default_annotation_key() -> String {
    DEFAULT_ANNOTATION_KEY.to_string()
}
