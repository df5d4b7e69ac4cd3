// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Object store access: list, watch, get and optimistic-concurrency replace.

use crate::constants::{watch::WATCH_TIMEOUT_SECS, OPERATOR_NAME};
use crate::error::{ControllerError, Result};
use crate::kubernetes::registry::KindRegistry;
use crate::types::{CachedObject, Kind};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use kube::api::{
    Api, ApiResource, DynamicObject, ListParams, PostParams, WatchEvent as KubeWatchEvent,
    WatchParams,
};
use kube::core::TypeMeta;
use kube::Client;
use tracing::{debug, instrument};

/// Namespace and selectors narrowing what a cache observes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WatchScope {
    pub kind: Kind,
    pub namespace: String,
    pub label_selector: Option<String>,
    pub field_selector: Option<String>,
}

/// Result of a full list: the objects plus the version cursor to watch from
#[derive(Clone, Debug)]
pub struct ObjectSnapshot {
    pub objects: Vec<CachedObject>,
    pub resource_version: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum WatchEvent {
    Added(CachedObject),
    Modified(CachedObject),
    Deleted(CachedObject),
    /// Progress marker carrying a newer resource version and no object
    Bookmark(String),
}

pub type WatchStream = BoxStream<'static, Result<WatchEvent>>;

/// The external object store, as seen by the control loop.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list(&self, scope: &WatchScope) -> Result<ObjectSnapshot>;

    /// Incremental changes after `since`; the stream ends when the server closes it
    async fn watch(&self, scope: &WatchScope, since: &str) -> Result<WatchStream>;

    async fn get(&self, kind: Kind, namespace: &str, name: &str) -> Result<Option<CachedObject>>;

    /// Replace an object, guarded by the resource version it carries.
    ///
    /// A stale version fails with [`ControllerError::Conflict`].
    async fn replace(&self, object: &CachedObject) -> Result<CachedObject>;
}

/// [`ObjectStore`] backed by the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
    registry: KindRegistry,
}

impl KubeStore {
    pub fn new(client: Client, registry: KindRegistry) -> Self {
        Self { client, registry }
    }

    fn api(&self, kind: Kind, namespace: &str) -> Result<(Api<DynamicObject>, &ApiResource)> {
        let adapter = self.registry.get(kind)?;
        let api = Api::namespaced_with(self.client.clone(), namespace, &adapter.api_resource);
        Ok((api, &adapter.api_resource))
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    #[instrument(skip(self), fields(kind = %scope.kind, namespace = %scope.namespace))]
    async fn list(&self, scope: &WatchScope) -> Result<ObjectSnapshot> {
        let (api, _) = self.api(scope.kind, &scope.namespace)?;
        let mut lp = ListParams::default();
        if let Some(labels) = &scope.label_selector {
            lp = lp.labels(labels);
        }
        if let Some(fields) = &scope.field_selector {
            lp = lp.fields(fields);
        }

        let list = api.list(&lp).await?;
        let resource_version = list.metadata.resource_version.unwrap_or_default();
        debug!(
            "Listed {} objects at version {}",
            list.items.len(),
            resource_version
        );

        Ok(ObjectSnapshot {
            objects: list
                .items
                .into_iter()
                .map(|o| from_dynamic(scope.kind, o))
                .collect(),
            resource_version,
        })
    }

    async fn watch(&self, scope: &WatchScope, since: &str) -> Result<WatchStream> {
        let (api, _) = self.api(scope.kind, &scope.namespace)?;
        let mut wp = WatchParams::default().timeout(WATCH_TIMEOUT_SECS);
        if let Some(labels) = &scope.label_selector {
            wp = wp.labels(labels);
        }
        if let Some(fields) = &scope.field_selector {
            wp = wp.fields(fields);
        }

        let kind = scope.kind;
        let stream = api.watch(&wp, since).await?;
        Ok(stream
            .map(move |event| match event {
                Ok(KubeWatchEvent::Added(o)) => Ok(WatchEvent::Added(from_dynamic(kind, o))),
                Ok(KubeWatchEvent::Modified(o)) => Ok(WatchEvent::Modified(from_dynamic(kind, o))),
                Ok(KubeWatchEvent::Deleted(o)) => Ok(WatchEvent::Deleted(from_dynamic(kind, o))),
                Ok(KubeWatchEvent::Bookmark(b)) => {
                    Ok(WatchEvent::Bookmark(b.metadata.resource_version))
                }
                Ok(KubeWatchEvent::Error(e)) if e.code == 410 => {
                    Err(ControllerError::WatchExpired(e.message))
                }
                Ok(KubeWatchEvent::Error(e)) => Err(ControllerError::WatchError(format!(
                    "{} ({})",
                    e.message, e.code
                ))),
                Err(e) => Err(ControllerError::KubeError(e)),
            })
            .boxed())
    }

    #[instrument(skip(self))]
    async fn get(&self, kind: Kind, namespace: &str, name: &str) -> Result<Option<CachedObject>> {
        let (api, _) = self.api(kind, namespace)?;
        let object = api
            .get_opt(name)
            .await
            .map_err(|e| ControllerError::from(e).for_target(kind, namespace, name))?;
        Ok(object.map(|o| from_dynamic(kind, o)))
    }

    #[instrument(skip(self, object), fields(kind = %object.kind, object = %object.key()))]
    async fn replace(&self, object: &CachedObject) -> Result<CachedObject> {
        let (api, ar) = self.api(object.kind, object.namespace())?;
        let pp = PostParams {
            field_manager: Some(OPERATOR_NAME.to_string()),
            ..Default::default()
        };

        match api.replace(object.name(), &pp, &to_dynamic(object, ar)).await {
            Ok(updated) => Ok(from_dynamic(object.kind, updated)),
            Err(kube::Error::Api(err)) if err.code == 409 => Err(ControllerError::Conflict {
                kind: object.kind,
                namespace: object.namespace().to_string(),
                name: object.name().to_string(),
                resource_version: object.resource_version().unwrap_or_default().to_string(),
            }),
            Err(e) => Err(ControllerError::from(e).for_target(
                object.kind,
                object.namespace(),
                object.name(),
            )),
        }
    }
}

fn from_dynamic(kind: Kind, object: DynamicObject) -> CachedObject {
    CachedObject {
        kind,
        metadata: object.metadata,
        payload: object.data,
    }
}

fn to_dynamic(object: &CachedObject, ar: &ApiResource) -> DynamicObject {
    DynamicObject {
        types: Some(TypeMeta {
            api_version: ar.api_version.clone(),
            kind: ar.kind.clone(),
        }),
        metadata: object.metadata.clone(),
        data: object.payload.clone(),
    }
}
