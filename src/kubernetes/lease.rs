// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Leader lock backed by a `coordination.k8s.io/v1` Lease.

use crate::error::{ControllerError, Result};
use crate::leader::LeaderLock;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{ObjectMeta, PostParams};
use kube::{Api, Client};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Lease object keyed by (namespace, name); the holder identity marks the leader
#[derive(Clone)]
pub struct LeaseLock {
    api: Api<Lease>,
    name: String,
}

impl LeaseLock {
    pub fn new(client: Client, namespace: &str, name: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            name: name.to_string(),
        }
    }

    async fn take(&self, holder: &str, lease_duration: Duration, must_hold: bool) -> Result<bool> {
        let now = Utc::now();
        let Some(lease) = self.api.get_opt(&self.name).await? else {
            if must_hold {
                return Ok(false);
            }
            return self.create(holder, lease_duration, now).await;
        };

        let spec = lease.spec.clone().unwrap_or_default();
        let current = spec.holder_identity.clone().filter(|h| !h.is_empty());
        let ours = current.as_deref() == Some(holder);
        if must_hold && !ours {
            return Ok(false);
        }
        if !ours && current.is_some() && !is_expired(&spec, now) {
            debug!("Lease {} held by {:?}", self.name, current);
            return Ok(false);
        }

        let mut updated = lease.clone();
        updated.spec = Some(LeaseSpec {
            holder_identity: Some(holder.to_string()),
            lease_duration_seconds: Some(duration_secs(lease_duration)),
            acquire_time: if ours {
                spec.acquire_time.clone()
            } else {
                Some(MicroTime(now))
            },
            renew_time: Some(MicroTime(now)),
            lease_transitions: Some(
                spec.lease_transitions.unwrap_or(0) + if ours { 0 } else { 1 },
            ),
            ..spec
        });

        match self
            .api
            .replace(&self.name, &PostParams::default(), &updated)
            .await
        {
            Ok(_) => {
                if !ours {
                    info!("Took over lease {} from {:?}", self.name, current);
                }
                Ok(true)
            }
            Err(kube::Error::Api(err)) if err.code == 409 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn create(
        &self,
        holder: &str,
        lease_duration: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let lease = Lease {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                ..Default::default()
            },
            spec: Some(LeaseSpec {
                holder_identity: Some(holder.to_string()),
                lease_duration_seconds: Some(duration_secs(lease_duration)),
                acquire_time: Some(MicroTime(now)),
                renew_time: Some(MicroTime(now)),
                lease_transitions: Some(0),
                ..Default::default()
            }),
        };

        match self.api.create(&PostParams::default(), &lease).await {
            Ok(_) => {
                info!("Created lease {}", self.name);
                Ok(true)
            }
            Err(kube::Error::Api(err)) if err.code == 409 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl LeaderLock for LeaseLock {
    #[instrument(skip(self))]
    async fn acquire(&self, holder: &str, lease_duration: Duration) -> Result<bool> {
        self.take(holder, lease_duration, false).await
    }

    async fn renew(&self, holder: &str, lease_duration: Duration) -> Result<bool> {
        self.take(holder, lease_duration, true).await
    }

    #[instrument(skip(self))]
    async fn release(&self, holder: &str) -> Result<()> {
        let Some(mut lease) = self.api.get_opt(&self.name).await? else {
            return Ok(());
        };
        let Some(spec) = lease.spec.as_mut() else {
            return Ok(());
        };
        if spec.holder_identity.as_deref() != Some(holder) {
            return Ok(());
        }
        spec.holder_identity = None;
        spec.renew_time = None;

        match self
            .api
            .replace(&self.name, &PostParams::default(), &lease)
            .await
        {
            Ok(_) => Ok(()),
            // Someone else already moved the lease on
            Err(kube::Error::Api(err)) if err.code == 409 => Ok(()),
            Err(e) => Err(ControllerError::LeaderLockError(format!(
                "failed to release lease {}: {}",
                self.name, e
            ))),
        }
    }
}

fn is_expired(spec: &LeaseSpec, now: DateTime<Utc>) -> bool {
    let Some(renewed) = spec.renew_time.as_ref().or(spec.acquire_time.as_ref()) else {
        return true;
    };
    let duration = chrono::Duration::seconds(i64::from(spec.lease_duration_seconds.unwrap_or(0)));
    renewed.0 + duration <= now
}

fn duration_secs(duration: Duration) -> i32 {
    i32::try_from(duration.as_secs()).unwrap_or(i32::MAX)
}
