// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Cached object snapshots and the keys that identify them.

use crate::error::{ControllerError, Result};
use crate::types::Kind;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// (namespace, name) of an object within one kind's cache; the work queue item.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Where an annotation is merged on an object of a given kind
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnnotationTarget {
    /// The object's own metadata
    Metadata,
    /// The embedded pod template metadata (`spec.template.metadata`), so rollouts pick it up
    PodTemplate,
}

/// Snapshot of an observed object.
///
/// Replaced wholesale on every event for its key, never mutated in place.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedObject {
    pub kind: Kind,
    pub metadata: ObjectMeta,
    /// Everything except metadata and type information (spec, status, data, ...)
    pub payload: Value,
}

impl CachedObject {
    pub fn new(kind: Kind, namespace: &str, name: &str) -> Self {
        Self {
            kind,
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            payload: Value::Object(Map::new()),
        }
    }

    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or_default()
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.metadata.resource_version.as_deref()
    }

    pub fn labels(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata.labels.as_ref()
    }

    pub fn annotations(&self) -> Option<&BTreeMap<String, String>> {
        self.metadata.annotations.as_ref()
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(self.namespace(), self.name())
    }

    /// Annotations at the given location, if any are set
    pub fn annotations_at(&self, target: AnnotationTarget) -> Option<BTreeMap<String, String>> {
        match target {
            AnnotationTarget::Metadata => self.metadata.annotations.clone(),
            AnnotationTarget::PodTemplate => self
                .payload
                .pointer("/spec/template/metadata/annotations")
                .and_then(|v| serde_json::from_value(v.clone()).ok()),
        }
    }

    /// Structural copy of this object with one annotation merged in at `target`.
    ///
    /// All other state, the resource version included, is carried over untouched.
    pub fn with_annotation(
        &self,
        target: AnnotationTarget,
        key: &str,
        value: &str,
    ) -> Result<CachedObject> {
        let mut updated = self.clone();
        match target {
            AnnotationTarget::Metadata => {
                updated
                    .metadata
                    .annotations
                    .get_or_insert_with(BTreeMap::new)
                    .insert(key.to_string(), value.to_string());
            }
            AnnotationTarget::PodTemplate => {
                let spec = updated
                    .payload
                    .get_mut("spec")
                    .and_then(Value::as_object_mut)
                    .ok_or_else(|| {
                        ControllerError::MalformedObject(format!(
                            "{} {}/{} has no spec",
                            self.kind,
                            self.namespace(),
                            self.name()
                        ))
                    })?;
                let annotations = object_entry(object_entry(spec, "template"), "metadata")
                    .entry("annotations")
                    .or_insert_with(|| Value::Object(Map::new()));
                if !annotations.is_object() {
                    *annotations = Value::Object(Map::new());
                }
                if let Some(map) = annotations.as_object_mut() {
                    map.insert(key.to_string(), Value::String(value.to_string()));
                }
            }
        }
        Ok(updated)
    }
}

/// Get or create a nested JSON object under `key`
fn object_entry<'a>(parent: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    let entry = parent
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    match entry {
        Value::Object(map) => map,
        _ => unreachable!("entry was just set to an object"),
    }
}
