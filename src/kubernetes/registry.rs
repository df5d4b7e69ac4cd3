// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kind adapters: how each supported kind is addressed and where it gets annotated.

use crate::error::{ControllerError, Result};
use crate::types::{AnnotationTarget, Kind};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret};
use kube::api::ApiResource;
use std::collections::HashMap;

#[derive(Clone, Debug)]
pub struct KindAdapter {
    pub api_resource: ApiResource,
    pub annotation_target: AnnotationTarget,
}

impl KindAdapter {
    fn of<K>(annotation_target: AnnotationTarget) -> Self
    where
        K: kube::Resource<DynamicType = ()>,
    {
        Self {
            api_resource: ApiResource::erase::<K>(&()),
            annotation_target,
        }
    }
}

/// Registry mapping each kind to its adapter, built once at startup
#[derive(Clone, Debug, Default)]
pub struct KindRegistry {
    adapters: HashMap<Kind, KindAdapter>,
}

impl KindRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All built-in kinds; workload kinds are annotated on their pod template
    pub fn builtin() -> Self {
        Self::new()
            .register(Kind::Pod, KindAdapter::of::<Pod>(AnnotationTarget::Metadata))
            .register(Kind::Secret, KindAdapter::of::<Secret>(AnnotationTarget::Metadata))
            .register(
                Kind::ConfigMap,
                KindAdapter::of::<ConfigMap>(AnnotationTarget::Metadata),
            )
            .register(
                Kind::Deployment,
                KindAdapter::of::<Deployment>(AnnotationTarget::PodTemplate),
            )
            .register(
                Kind::StatefulSet,
                KindAdapter::of::<StatefulSet>(AnnotationTarget::PodTemplate),
            )
            .register(
                Kind::DaemonSet,
                KindAdapter::of::<DaemonSet>(AnnotationTarget::PodTemplate),
            )
    }

    pub fn register(mut self, kind: Kind, adapter: KindAdapter) -> Self {
        self.adapters.insert(kind, adapter);
        self
    }

    pub fn get(&self, kind: Kind) -> Result<&KindAdapter> {
        self.adapters
            .get(&kind)
            .ok_or_else(|| {
                ControllerError::Unsupported(format!("no adapter registered for {}", kind))
            })
    }

    pub fn contains(&self, kind: Kind) -> bool {
        self.adapters.contains_key(&kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_covers_all_kinds() {
        let registry = KindRegistry::builtin();
        for kind in Kind::ALL {
            assert!(registry.contains(kind), "missing adapter for {}", kind);
        }
    }

    #[test]
    fn test_workloads_are_annotated_on_pod_template() {
        let registry = KindRegistry::builtin();

        let deployment = registry.get(Kind::Deployment).unwrap();
        assert_eq!(deployment.annotation_target, AnnotationTarget::PodTemplate);
        assert_eq!(deployment.api_resource.group, "apps");
        assert_eq!(deployment.api_resource.plural, "deployments");

        let config_map = registry.get(Kind::ConfigMap).unwrap();
        assert_eq!(config_map.annotation_target, AnnotationTarget::Metadata);
        assert_eq!(config_map.api_resource.api_version, "v1");
    }

    #[test]
    fn test_unregistered_kind_is_unsupported() {
        let registry = KindRegistry::new();
        assert!(matches!(
            registry.get(Kind::Pod),
            Err(ControllerError::Unsupported(_))
        ));
    }
}
