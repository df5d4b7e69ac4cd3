// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

use crate::actions::ActionExecutor;
use crate::error::{ControllerError, Result};
use crate::kubernetes::{KindRegistry, ObjectStore, WatchScope};
use crate::types::{ActionSpec, AnnotationTarget, CachedObject};
use async_trait::async_trait;
use chrono::Local;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Stamps the current local date-time into an annotation on every matching target.
///
/// Workload kinds get the annotation on their pod template, which makes them roll out.
pub struct AnnotateWithTimestamp {
    store: Arc<dyn ObjectStore>,
    kinds: KindRegistry,
    conflict_retries: u32,
}

impl AnnotateWithTimestamp {
    pub fn new(store: Arc<dyn ObjectStore>, kinds: KindRegistry, conflict_retries: u32) -> Self {
        Self {
            store,
            kinds,
            conflict_retries,
        }
    }

    async fn annotate(
        &self,
        target: CachedObject,
        location: AnnotationTarget,
        key: &str,
    ) -> Result<()> {
        let mut current = target;
        let mut attempt = 0;
        loop {
            let updated = current.with_annotation(location, key, &timestamp())?;
            match self.store.replace(&updated).await {
                Ok(_) => {
                    info!(
                        "Annotated {} {} with {}",
                        current.kind,
                        current.key(),
                        key
                    );
                    return Ok(());
                }
                Err(e) if e.is_conflict() && attempt < self.conflict_retries => {
                    attempt += 1;
                    debug!(
                        "Conflict on {} {}, re-reading (attempt {} of {})",
                        current.kind,
                        current.key(),
                        attempt,
                        self.conflict_retries
                    );
                    match self
                        .store
                        .get(current.kind, current.namespace(), current.name())
                        .await?
                    {
                        Some(fresh) => current = fresh,
                        None => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl ActionExecutor for AnnotateWithTimestamp {
    #[instrument(skip_all, fields(action = %action))]
    async fn execute(&self, action: &ActionSpec) -> Result<()> {
        let location = self.kinds.get(action.target_kind)?.annotation_target;
        let scope = WatchScope {
            kind: action.target_kind,
            namespace: action.target_namespace.clone(),
            label_selector: action.label_selector(),
            field_selector: action.field_selector(),
        };

        // Always a live read, never the cache
        let targets = self
            .store
            .list(&scope)
            .await
            .map_err(|e| e.for_target(action.target_kind, &action.target_namespace, "*"))?
            .objects;
        if targets.is_empty() {
            return Err(ControllerError::NoTargetsFound {
                kind: action.target_kind,
                namespace: action.target_namespace.clone(),
            });
        }

        let total = targets.len();
        let mut first_error = None;
        for target in targets {
            let id = format!("{} {}", target.kind, target.key());
            if let Err(e) = self.annotate(target, location, &action.annotation_key).await {
                warn!("Failed to annotate {}: {}", id, e);
                first_error.get_or_insert(e);
            }
        }
        debug!("Processed {} targets", total);

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// ISO-8601 local date-time, without offset
fn timestamp() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_ANNOTATION_KEY;
    use crate::test_utils::MemoryStore;
    use crate::types::{ActionType, Kind};
    use chrono::NaiveDateTime;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn deployment(name: &str, app: &str) -> CachedObject {
        let mut object = CachedObject::new(Kind::Deployment, "default", name);
        object.metadata.labels = Some(BTreeMap::from([("app".to_string(), app.to_string())]));
        object.payload = json!({
            "spec": {
                "replicas": 2,
                "template": {
                    "metadata": { "labels": { "app": app } },
                    "spec": { "containers": [{ "name": "web", "image": "nginx" }] }
                }
            }
        });
        object
    }

    fn action(kind: Kind) -> ActionSpec {
        ActionSpec {
            action_type: ActionType::AnnotateWithTimestamp,
            target_kind: kind,
            target_namespace: "default".to_string(),
            target_label_selectors: vec!["app=foo".to_string()],
            target_field_selectors: vec![],
            annotation_key: DEFAULT_ANNOTATION_KEY.to_string(),
        }
    }

    fn executor(store: &MemoryStore, conflict_retries: u32) -> AnnotateWithTimestamp {
        AnnotateWithTimestamp::new(
            Arc::new(store.clone()),
            KindRegistry::builtin(),
            conflict_retries,
        )
    }

    fn template_stamp(object: &CachedObject) -> Option<String> {
        object
            .annotations_at(AnnotationTarget::PodTemplate)
            .and_then(|a| a.get(DEFAULT_ANNOTATION_KEY).cloned())
    }

    #[tokio::test]
    async fn test_one_update_per_matching_target_with_read_version() {
        let store = MemoryStore::new();
        let web = store.upsert(deployment("web", "foo"));
        let api = store.upsert(deployment("api", "foo"));
        store.upsert(deployment("other", "bar"));

        executor(&store, 0)
            .execute(&action(Kind::Deployment))
            .await
            .unwrap();

        let replaced = store.replaced();
        assert_eq!(replaced.len(), 2);
        for sent in &replaced {
            let read = if sent.name() == "web" { &web } else { &api };
            assert_eq!(sent.resource_version(), read.resource_version());
            let stamp = template_stamp(sent).unwrap();
            assert!(NaiveDateTime::parse_from_str(&stamp, "%Y-%m-%dT%H:%M:%S%.f").is_ok());
            // The object's own metadata is untouched
            assert!(sent.annotations().is_none());
        }
        let other = store.object(Kind::Deployment, "default", "other").unwrap();
        assert!(template_stamp(&other).is_none());
    }

    #[tokio::test]
    async fn test_repeat_run_refreshes_stamp_and_keeps_other_state() {
        let store = MemoryStore::new();
        store.upsert(deployment("web", "foo"));
        let executor = executor(&store, 0);

        executor.execute(&action(Kind::Deployment)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        executor.execute(&action(Kind::Deployment)).await.unwrap();

        let replaced = store.replaced();
        assert_eq!(replaced.len(), 2);
        assert!(template_stamp(&replaced[0]).unwrap() < template_stamp(&replaced[1]).unwrap());
        let current = store.object(Kind::Deployment, "default", "web").unwrap();
        assert_eq!(current.payload["spec"]["replicas"], 2);
        assert_eq!(current.payload["spec"]["template"]["spec"]["containers"][0]["image"], "nginx");
        assert_eq!(current.payload["spec"]["template"]["metadata"]["labels"]["app"], "foo");
    }

    #[tokio::test]
    async fn test_metadata_kinds_are_annotated_on_the_object() {
        let store = MemoryStore::new();
        let mut config = CachedObject::new(Kind::ConfigMap, "default", "settings");
        config.metadata.labels = Some(BTreeMap::from([("app".to_string(), "foo".to_string())]));
        store.upsert(config);

        executor(&store, 0)
            .execute(&action(Kind::ConfigMap))
            .await
            .unwrap();

        let current = store.object(Kind::ConfigMap, "default", "settings").unwrap();
        assert!(current.annotations().unwrap().contains_key(DEFAULT_ANNOTATION_KEY));
    }

    #[tokio::test]
    async fn test_no_matching_targets_fails() {
        let store = MemoryStore::new();
        store.upsert(deployment("other", "bar"));

        let err = executor(&store, 0)
            .execute(&action(Kind::Deployment))
            .await
            .unwrap_err();

        assert!(matches!(err, ControllerError::NoTargetsFound { .. }));
        assert!(err.to_string().starts_with("No targets found"));
    }

    #[tokio::test]
    async fn test_conflict_surfaces_without_retries() {
        let store = MemoryStore::new();
        store.upsert(deployment("web", "foo"));
        store.inject_conflicts(1);

        let err = executor(&store, 0)
            .execute(&action(Kind::Deployment))
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        assert!(store.replaced().is_empty());
    }

    #[tokio::test]
    async fn test_conflict_retry_rereads_before_updating() {
        let store = MemoryStore::new();
        store.upsert(deployment("web", "foo"));
        store.inject_conflicts(1);
        // Someone else changes the object between our read and our write
        store.touch(Kind::Deployment, "default", "web");
        let fresh = store.object(Kind::Deployment, "default", "web").unwrap();

        executor(&store, 2)
            .execute(&action(Kind::Deployment))
            .await
            .unwrap();

        let replaced = store.replaced();
        assert_eq!(replaced.len(), 1);
        assert_eq!(replaced[0].resource_version(), fresh.resource_version());
    }

    #[tokio::test]
    async fn test_every_target_is_attempted_when_one_fails() {
        let store = MemoryStore::new();
        let mut broken = CachedObject::new(Kind::Deployment, "default", "broken");
        broken.metadata.labels = Some(BTreeMap::from([("app".to_string(), "foo".to_string())]));
        store.upsert(broken);
        store.upsert(deployment("web", "foo"));

        let err = executor(&store, 0)
            .execute(&action(Kind::Deployment))
            .await
            .unwrap_err();

        assert!(matches!(err, ControllerError::MalformedObject(_)));
        assert_eq!(store.replaced().len(), 1);
        assert_eq!(store.replaced()[0].name(), "web");
    }
}
