// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{config as defaults, leader, queue};
use crate::types::WatchSpec;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Controller configuration, loaded once at startup from a YAML file
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[serde(default)]
    pub debug: bool,
    /// Namespace holding the leader lease
    pub namespace: String,
    #[serde(default = "default_lease_name")]
    pub lease_name: String,
    /// Raw entries; each is parsed on its own by [`Config::watch_specs`]
    #[serde(default, alias = "watchedResourceList")]
    pub watched_resources: Vec<serde_yaml::Value>,
    /// Workers per control loop
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Periodic re-delivery of cached objects as updates; 0 disables it
    #[serde(default)]
    pub resync_period_seconds: u64,
    #[serde(default)]
    pub requeue_on_partial_failure: bool,
    /// Fresh read-modify-write attempts after a conflicting update
    #[serde(default)]
    pub conflict_retries: u32,
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
    /// Exit cleanly when leadership is lost instead of waiting for re-election
    #[serde(default)]
    pub exit_on_leadership_loss: bool,
    #[serde(default = "default_probe_addr")]
    pub probe_addr: String,
    #[serde(default)]
    pub leader_election: LeaderElectionSettings,
    #[serde(default)]
    pub rate_limiter: RateLimiterSettings,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeaderElectionSettings {
    pub lease_duration_seconds: u64,
    pub renew_deadline_seconds: u64,
    pub retry_period_seconds: u64,
}

impl Default for LeaderElectionSettings {
    fn default() -> Self {
        Self {
            lease_duration_seconds: leader::LEASE_DURATION_SECS,
            renew_deadline_seconds: leader::RENEW_DEADLINE_SECS,
            retry_period_seconds: leader::RETRY_PERIOD_SECS,
        }
    }
}

impl LeaderElectionSettings {
    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_seconds)
    }

    pub fn renew_deadline(&self) -> Duration {
        Duration::from_secs(self.renew_deadline_seconds)
    }

    pub fn retry_period(&self) -> Duration {
        Duration::from_secs(self.retry_period_seconds)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RateLimiterSettings {
    pub base_delay_millis: u64,
    pub max_delay_seconds: u64,
}

impl Default for RateLimiterSettings {
    fn default() -> Self {
        Self {
            base_delay_millis: queue::BASE_DELAY_MILLIS,
            max_delay_seconds: queue::MAX_DELAY_SECS,
        }
    }
}

impl RateLimiterSettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_millis)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_seconds)
    }
}

impl Config {
    /// Load configuration from the file named by `RESOURCE_WATCHER_CONFIG_PATH`
    pub fn from_env() -> Result<Self> {
        Self::from_file(&config_path())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            bail!("No config found at {}", path.display());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Config at {} cannot be read", path.display()))?;
        Self::from_yaml(&contents)
            .with_context(|| format!("Config at {} cannot be parsed", path.display()))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.namespace.trim().is_empty() {
            bail!("namespace must not be empty");
        }
        if self.lease_name.trim().is_empty() {
            bail!("leaseName must not be empty");
        }
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        let le = &self.leader_election;
        if le.lease_duration_seconds <= le.renew_deadline_seconds {
            bail!(
                "leaseDurationSeconds ({}) must be greater than renewDeadlineSeconds ({})",
                le.lease_duration_seconds,
                le.renew_deadline_seconds
            );
        }
        if le.renew_deadline_seconds <= le.retry_period_seconds {
            bail!(
                "renewDeadlineSeconds ({}) must be greater than retryPeriodSeconds ({})",
                le.renew_deadline_seconds,
                le.retry_period_seconds
            );
        }
        if le.retry_period_seconds == 0 {
            bail!("retryPeriodSeconds must be at least 1");
        }
        Ok(())
    }

    /// Parse each watched resource entry independently, in configuration order
    pub fn watch_specs(&self) -> Vec<std::result::Result<WatchSpec, serde_yaml::Error>> {
        self.watched_resources
            .iter()
            .map(|entry| serde_yaml::from_value(entry.clone()))
            .collect()
    }

    pub fn resync_period(&self) -> Option<Duration> {
        (self.resync_period_seconds > 0).then(|| Duration::from_secs(self.resync_period_seconds))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    /// Drain time after losing the lease. Capped to the slack between the lease
    /// expiring and the renew deadline, so a new leader's loops and ours overlap
    /// for at most that long.
    pub fn step_down_grace(&self) -> Duration {
        let le = &self.leader_election;
        let slack = le.lease_duration().saturating_sub(le.renew_deadline());
        self.shutdown_grace().min(slack)
    }
}

/// Resolve the configuration file path; a blank variable counts as unset
pub fn config_path() -> PathBuf {
    env::var(defaults::PATH_ENV)
        .ok()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(defaults::DEFAULT_PATH))
}

fn default_lease_name() -> String {
    defaults::DEFAULT_LEASE_NAME.to_string()
}

fn default_workers() -> usize {
    defaults::DEFAULT_WORKERS
}

fn default_shutdown_grace() -> u64 {
    defaults::DEFAULT_SHUTDOWN_GRACE_SECS
}

fn default_probe_addr() -> String {
    defaults::DEFAULT_PROBE_ADDR.to_string()
}
