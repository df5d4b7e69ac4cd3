// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use kube::Client;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use resource_watcher::actions::ActionRegistry;
use resource_watcher::config::Config;
use resource_watcher::constants::OPERATOR_NAME;
use resource_watcher::controller::{ControllerManager, ManagerExit};
use resource_watcher::kubernetes::{KindRegistry, KubeStore, LeaseLock, ObjectStore};
use resource_watcher::leader::{LeaderElector, LeaseTiming};
use resource_watcher::server;

#[tokio::main]
async fn main() -> Result<()> {
    // Configuration first: the debug flag picks the default log level
    let config = Config::from_env();
    let debug = config.as_ref().map(|c| c.debug).unwrap_or(false);
    init_tracing(debug);
    let config = Arc::new(config?);

    info!("Starting {}", OPERATOR_NAME);
    if config.debug {
        debug!("Configuration: {:?}", config);
    }

    let client = Client::try_default()
        .await
        .context("Cannot create Kubernetes client")?;
    let version = client
        .apiserver_version()
        .await
        .context("Cannot reach the Kubernetes API server")?;
    info!(
        "Connected to Kubernetes {}.{}",
        version.major, version.minor
    );

    let kinds = KindRegistry::builtin();
    let store: Arc<dyn ObjectStore> = Arc::new(KubeStore::new(client.clone(), kinds.clone()));
    let actions = ActionRegistry::builtin(store.clone(), kinds.clone(), config.conflict_retries);
    let manager = ControllerManager::from_config(config.clone(), store, &kinds, actions);

    let identity = holder_identity();
    info!(
        "Contending for lease {}/{} as {}",
        config.namespace, config.lease_name, identity
    );
    let lock = Arc::new(LeaseLock::new(client, &config.namespace, &config.lease_name));
    let (elector, leader_rx) = LeaderElector::new(
        lock,
        identity,
        LeaseTiming::from(&config.leader_election),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (elector_stop_tx, elector_stop_rx) = watch::channel(false);
    let elector_task = tokio::spawn(elector.run(elector_stop_rx));

    let probe_addr = config.probe_addr.clone();
    let readiness = manager.readiness();
    let probe_shutdown = shutdown_rx.clone();
    let probes = tokio::spawn(async move {
        if let Err(e) = server::serve(&probe_addr, readiness, probe_shutdown).await {
            error!("Probe server failed: {}", e);
        }
    });

    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    let exit = manager.run(leader_rx, shutdown_rx).await;
    if exit == ManagerExit::LeadershipLost {
        info!("Leadership lost, exiting");
    }

    // Loops are stopped; hand the lease over
    let _ = elector_stop_tx.send(true);
    if let Err(e) = elector_task.await {
        error!("Leader election task failed: {}", e);
    }
    probes.abort();

    info!("{} stopped", OPERATOR_NAME);
    Ok(())
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Unique per process, readable in the lease: `<hostname>-<uuid>`
fn holder_identity() -> String {
    let host = std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| OPERATOR_NAME.to_string());
    format!("{}-{}", host, uuid::Uuid::new_v4())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                error!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
