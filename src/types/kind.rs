// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Resource kinds the controller knows how to watch or annotate.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub enum Kind {
    Pod,
    Secret,
    ConfigMap,
    Deployment,
    StatefulSet,
    DaemonSet,
}

impl Kind {
    pub const ALL: [Kind; 6] = [
        Kind::Pod,
        Kind::Secret,
        Kind::ConfigMap,
        Kind::Deployment,
        Kind::StatefulSet,
        Kind::DaemonSet,
    ];

    /// Kinds a WatchSpec may observe
    pub fn is_watchable(&self) -> bool {
        matches!(self, Kind::Pod | Kind::Secret | Kind::ConfigMap)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Pod => "Pod",
            Kind::Secret => "Secret",
            Kind::ConfigMap => "ConfigMap",
            Kind::Deployment => "Deployment",
            Kind::StatefulSet => "StatefulSet",
            Kind::DaemonSet => "DaemonSet",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace(['_', '-'], "").to_ascii_lowercase();
        match normalized.as_str() {
            "pod" => Ok(Kind::Pod),
            "secret" => Ok(Kind::Secret),
            "configmap" => Ok(Kind::ConfigMap),
            // DEPLOYMENT_POD_TEMPLATE is the legacy name for annotating a deployment's pod template
            "deployment" | "deploymentpodtemplate" => Ok(Kind::Deployment),
            "statefulset" => Ok(Kind::StatefulSet),
            "daemonset" => Ok(Kind::DaemonSet),
            _ => Err(format!("unknown resource kind '{}'", s)),
        }
    }
}

impl TryFrom<String> for Kind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Kind> for String {
    fn from(kind: Kind) -> Self {
        kind.as_str().to_string()
    }
}
