// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Test doubles: a mock API server for `kube::Client`, an in-memory object store and leader lock.

use crate::error::{ControllerError, Result};
use crate::kubernetes::{ObjectSnapshot, ObjectStore, WatchEvent, WatchScope, WatchStream};
use crate::leader::LeaderLock;
use crate::types::{CachedObject, Kind};
use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use http::{Request, Response};
use http_body_util::BodyExt;
use kube::client::Body;
use kube::Client;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::Instant;
use tower::Service;

/// A request seen by [`MockService`]
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    pub body: Vec<u8>,
}

/// A mock HTTP service that returns predefined responses based on request paths.
#[derive(Clone)]
pub struct MockService {
    responses: Arc<Mutex<HashMap<(String, String), (u16, String)>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockService {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn on(self, method: &str, path: &str, status: u16, body: &str) -> Self {
        self.responses.lock().unwrap().insert(
            (method.to_string(), path.to_string()),
            (status, body.to_string()),
        );
        self
    }

    /// Add a response for GET requests matching the exact path
    pub fn on_get(self, path: &str, status: u16, body: &str) -> Self {
        self.on("GET", path, status, body)
    }

    pub fn on_post(self, path: &str, status: u16, body: &str) -> Self {
        self.on("POST", path, status, body)
    }

    pub fn on_put(self, path: &str, status: u16, body: &str) -> Self {
        self.on("PUT", path, status, body)
    }

    /// Build a kube Client from this mock service
    pub fn into_client(self) -> Client {
        Client::new(self, "default")
    }

    /// Every request received so far, in arrival order
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn find_response(&self, method: &str, path: &str) -> Option<(u16, String)> {
        let responses = self.responses.lock().unwrap();

        if let Some(resp) = responses.get(&(method.to_string(), path.to_string())) {
            return Some(resp.clone());
        }

        // Prefix match for paths like /api/v1/namespaces/foo
        for ((m, p), resp) in responses.iter() {
            if m == method && path.starts_with(p) {
                return Some(resp.clone());
            }
        }

        None
    }
}

impl Default for MockService {
    fn default() -> Self {
        Self::new()
    }
}

type ServiceResult = std::result::Result<Response<Body>, tower::BoxError>;

impl Service<Request<Body>> for MockService {
    type Response = Response<Body>;
    type Error = tower::BoxError;
    type Future = std::pin::Pin<Box<dyn std::future::Future<Output = ServiceResult> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();
        let query = req.uri().query().unwrap_or_default().to_string();
        let response = self.find_response(&method, &path);
        let requests = self.requests.clone();

        Box::pin(async move {
            let body = req
                .into_body()
                .collect()
                .await
                .map(|collected| collected.to_bytes().to_vec())
                .unwrap_or_default();
            requests.lock().unwrap().push(RecordedRequest {
                method,
                path,
                query,
                body,
            });

            let (status, body) =
                response.unwrap_or_else(|| (404, not_found_json("resource", "unknown")));
            Ok(Response::builder()
                .status(status)
                .header("content-type", "application/json")
                .body(Body::from(body.into_bytes()))
                .unwrap())
        })
    }
}

/// Create a 404 not found response
pub fn not_found_json(resource: &str, name: &str) -> String {
    serde_json::json!({
        "kind": "Status",
        "apiVersion": "v1",
        "status": "Failure",
        "message": format!("{} \"{}\" not found", resource, name),
        "reason": "NotFound",
        "code": 404
    })
    .to_string()
}

type ObjectId = (Kind, String, String);

#[derive(Default)]
struct MemoryState {
    objects: BTreeMap<ObjectId, CachedObject>,
    version: u64,
    /// Every change, so a watch can replay what happened after its starting version
    log: Vec<(u64, WatchEvent)>,
    watchers: Vec<(WatchScope, mpsc::UnboundedSender<Result<WatchEvent>>)>,
    replaced: Vec<CachedObject>,
    list_calls: usize,
    failing_lists: usize,
    conflicts_to_inject: usize,
}

impl MemoryState {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    fn publish(&mut self, event: WatchEvent) {
        let object = match &event {
            WatchEvent::Added(o) | WatchEvent::Modified(o) | WatchEvent::Deleted(o) => o.clone(),
            WatchEvent::Bookmark(_) => return,
        };
        self.log.push((self.version, event.clone()));
        self.watchers.retain(|(scope, tx)| {
            if !in_scope(scope, &object) {
                return true;
            }
            tx.unbounded_send(Ok(event.clone())).is_ok()
        });
    }
}

/// In-memory [`ObjectStore`] with resource version checks and live watch streams
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite an object, assigning it a fresh resource version
    pub fn upsert(&self, mut object: CachedObject) -> CachedObject {
        let mut state = self.state.lock().unwrap();
        object.metadata.resource_version = Some(state.next_version());
        let id = id_of(&object);
        let existed = state.objects.insert(id, object.clone()).is_some();
        let event = if existed {
            WatchEvent::Modified(object.clone())
        } else {
            WatchEvent::Added(object.clone())
        };
        state.publish(event);
        object
    }

    pub fn delete(&self, kind: Kind, namespace: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        let id = (kind, namespace.to_string(), name.to_string());
        if let Some(mut object) = state.objects.remove(&id) {
            object.metadata.resource_version = Some(state.next_version());
            state.publish(WatchEvent::Deleted(object));
        }
    }

    /// Change an object behind the controller's back: new version, no other change
    pub fn touch(&self, kind: Kind, namespace: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        let id = (kind, namespace.to_string(), name.to_string());
        let version = state.next_version();
        if let Some(object) = state.objects.get_mut(&id) {
            object.metadata.resource_version = Some(version);
        }
    }

    pub fn object(&self, kind: Kind, namespace: &str, name: &str) -> Option<CachedObject> {
        let state = self.state.lock().unwrap();
        state
            .objects
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Objects submitted through [`ObjectStore::replace`] that were accepted
    pub fn replaced(&self) -> Vec<CachedObject> {
        self.state.lock().unwrap().replaced.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    pub fn fail_next_lists(&self, count: usize) {
        self.state.lock().unwrap().failing_lists = count;
    }

    /// Make the next `count` replace calls fail with a conflict
    pub fn inject_conflicts(&self, count: usize) {
        self.state.lock().unwrap().conflicts_to_inject = count;
    }

    /// Break every open watch stream with an error
    pub fn break_watches(&self) {
        let mut state = self.state.lock().unwrap();
        for (_, tx) in state.watchers.drain(..) {
            let reset = ControllerError::WatchError("connection reset".to_string());
            let _ = tx.unbounded_send(Err(reset));
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list(&self, scope: &WatchScope) -> Result<ObjectSnapshot> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        if state.failing_lists > 0 {
            state.failing_lists -= 1;
            return Err(ControllerError::WatchError("list failed".to_string()));
        }
        let objects = state
            .objects
            .values()
            .filter(|o| in_scope(scope, o))
            .cloned()
            .collect();
        Ok(ObjectSnapshot {
            objects,
            resource_version: state.version.to_string(),
        })
    }

    async fn watch(&self, scope: &WatchScope, since: &str) -> Result<WatchStream> {
        let since: u64 = since.parse().unwrap_or(0);
        let mut state = self.state.lock().unwrap();
        let (tx, rx) = mpsc::unbounded();
        for (version, event) in &state.log {
            let object = match event {
                WatchEvent::Added(o) | WatchEvent::Modified(o) | WatchEvent::Deleted(o) => o,
                WatchEvent::Bookmark(_) => continue,
            };
            if *version > since && in_scope(scope, object) {
                let _ = tx.unbounded_send(Ok(event.clone()));
            }
        }
        state.watchers.push((scope.clone(), tx));
        Ok(rx.boxed())
    }

    async fn get(&self, kind: Kind, namespace: &str, name: &str) -> Result<Option<CachedObject>> {
        Ok(self.object(kind, namespace, name))
    }

    async fn replace(&self, object: &CachedObject) -> Result<CachedObject> {
        let mut state = self.state.lock().unwrap();
        let conflict = ControllerError::Conflict {
            kind: object.kind,
            namespace: object.namespace().to_string(),
            name: object.name().to_string(),
            resource_version: object.resource_version().unwrap_or_default().to_string(),
        };
        if state.conflicts_to_inject > 0 {
            state.conflicts_to_inject -= 1;
            return Err(conflict);
        }
        let id = id_of(object);
        let current = state.objects.get(&id).ok_or_else(|| ControllerError::TargetError {
            kind: object.kind,
            namespace: object.namespace().to_string(),
            name: object.name().to_string(),
            source: Box::new(ControllerError::MalformedObject("not found".to_string())),
        })?;
        if current.resource_version() != object.resource_version() {
            return Err(conflict);
        }

        state.replaced.push(object.clone());
        let mut stored = object.clone();
        stored.metadata.resource_version = Some(state.next_version());
        state.objects.insert(id, stored.clone());
        state.publish(WatchEvent::Modified(stored.clone()));
        Ok(stored)
    }
}

fn id_of(object: &CachedObject) -> ObjectId {
    (
        object.kind,
        object.namespace().to_string(),
        object.name().to_string(),
    )
}

/// Equality-based selector matching, enough for tests
fn in_scope(scope: &WatchScope, object: &CachedObject) -> bool {
    if object.kind != scope.kind || object.namespace() != scope.namespace {
        return false;
    }
    let labels_match = scope.label_selector.as_deref().map_or(true, |selector| {
        selector.split(',').all(|term| match term.split_once('=') {
            Some((k, v)) => {
                let value = object.labels().and_then(|l| l.get(k.trim()));
                value.map(String::as_str) == Some(v.trim())
            }
            None => object.labels().is_some_and(|l| l.contains_key(term.trim())),
        })
    });
    let fields_match = scope.field_selector.as_deref().map_or(true, |selector| {
        selector.split(',').all(|term| match term.split_once('=') {
            Some(("metadata.name", v)) => object.name() == v.trim(),
            Some(("metadata.namespace", v)) => object.namespace() == v.trim(),
            _ => true,
        })
    });
    labels_match && fields_match
}

#[derive(Default)]
struct LockState {
    holder: Option<(String, Instant)>,
    failing: bool,
}

/// In-memory [`LeaderLock`] with TTL expiry on the tokio clock
#[derive(Clone, Default)]
pub struct MemoryLock {
    state: Arc<Mutex<LockState>>,
}

impl MemoryLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current unexpired holder
    pub fn holder(&self) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .holder
            .as_ref()
            .filter(|(_, expires)| Instant::now() < *expires)
            .map(|(h, _)| h.clone())
    }

    pub fn force_holder(&self, holder: &str, ttl: Duration) {
        self.state.lock().unwrap().holder = Some((holder.to_string(), Instant::now() + ttl));
    }

    /// Make every lock call fail, like an unreachable coordination service
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }
}

#[async_trait]
impl LeaderLock for MemoryLock {
    async fn acquire(&self, holder: &str, lease_duration: Duration) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        if state.failing {
            return Err(ControllerError::LeaderLockError("unreachable".to_string()));
        }
        let now = Instant::now();
        let free = match &state.holder {
            None => true,
            Some((h, expires)) => h == holder || now >= *expires,
        };
        if free {
            state.holder = Some((holder.to_string(), now + lease_duration));
        }
        Ok(free)
    }

    async fn renew(&self, holder: &str, lease_duration: Duration) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        if state.failing {
            return Err(ControllerError::LeaderLockError("unreachable".to_string()));
        }
        let now = Instant::now();
        match &state.holder {
            Some((h, expires)) if h == holder && now < *expires => {
                state.holder = Some((holder.to_string(), now + lease_duration));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, holder: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.holder.as_ref().is_some_and(|(h, _)| h == holder) {
            state.holder = None;
        }
        Ok(())
    }
}
