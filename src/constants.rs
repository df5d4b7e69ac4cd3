// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// Annotation written by the annotate-with-timestamp action when none is configured
pub const DEFAULT_ANNOTATION_KEY: &str = "com.charlyghislain.resourcewatcher.timestamp";

/// Field manager and component name reported to the API server
pub const OPERATOR_NAME: &str = "resource-watcher";

/// Configuration file lookup
pub mod config {
    /// Environment variable holding the configuration file path
    pub const PATH_ENV: &str = "RESOURCE_WATCHER_CONFIG_PATH";
    /// Used when the environment variable is unset or blank
    pub const DEFAULT_PATH: &str = "/var/run/config/resourcewatcher.yaml";
    pub const DEFAULT_LEASE_NAME: &str = "resource-watcher";
    pub const DEFAULT_WORKERS: usize = 2;
    pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;
    pub const DEFAULT_PROBE_ADDR: &str = "0.0.0.0:8080";
}

/// Leader election timing
pub mod leader {
    pub const LEASE_DURATION_SECS: u64 = 10;
    pub const RENEW_DEADLINE_SECS: u64 = 8;
    pub const RETRY_PERIOD_SECS: u64 = 5;
}

/// Per-key work queue backoff
pub mod queue {
    pub const BASE_DELAY_MILLIS: u64 = 5;
    pub const MAX_DELAY_SECS: u64 = 1000;
}

/// Relist backoff after a broken watch
pub mod watch {
    /// Initial backoff in milliseconds
    pub const RELIST_INTERVAL_MILLIS: u64 = 800;
    /// Backoff cap in milliseconds
    pub const RELIST_MAX_INTERVAL_MILLIS: u64 = 30_000;
    /// Server-side watch timeout; the stream is reopened from the last version afterwards
    pub const WATCH_TIMEOUT_SECS: u32 = 290;
}
