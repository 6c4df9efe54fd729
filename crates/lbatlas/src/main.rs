// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

//! The lbatlas daemon: wires the store, the SNMP dispatcher, the web API
//! and the federation tier according to one YAML configuration file.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser;
use lbatlas_collectors::Dispatcher;
use lbatlas_config::Config;
use lbatlas_store::Store;
use lbatlas_web::AppState;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lbatlas", about = "SNMP inventory and control plane for load balancer fleets")]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "/etc/lbatlas/lbatlas.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let mut tasks: Vec<tokio::task::JoinHandle<()>> = Vec::new();

    // Database, collector and web form one stack; each can only run when
    // the previous layer is enabled.
    let store = if config.database.enabled {
        let store = Store::connect(&config.database)?;
        store
            .upgrade()
            .await
            .context("database is not usable, refusing to start")?;
        Some(store)
    } else {
        warn!("database has been disabled");
        None
    };

    let dispatcher = match &store {
        Some(store) if config.collector.enabled => {
            let dispatcher = Dispatcher::new(config.collector.clone(), store.clone());
            if config.collector.interval > 0 {
                let periodic = dispatcher.clone();
                let interval = Duration::from_secs(config.collector.interval);
                tasks.push(tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(interval);
                    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                    loop {
                        ticker.tick().await;
                        info!("starting fleet-wide refresh");
                        if let Err(e) = periodic.refresh(None, None, None, false).await {
                            warn!(error = %e, "fleet-wide refresh failed");
                        }
                    }
                }));
            }
            Some(dispatcher)
        }
        _ => {
            warn!("collector has been disabled");
            None
        }
    };

    match (&store, &dispatcher) {
        (Some(store), Some(dispatcher)) if config.web.enabled => {
            let state = AppState {
                store: store.clone(),
                dispatcher: dispatcher.clone(),
            };
            let interface = config.web.interface.clone();
            let port = config.web.port;
            tasks.push(tokio::spawn(async move {
                if let Err(e) = lbatlas_web::serve(state, &interface, port).await {
                    warn!(error = %e, "web service stopped");
                }
            }));
        }
        _ => warn!("web service has been disabled"),
    }

    // The federation tier is independent of the local stack; it runs
    // whenever backends are configured.
    if config.metaweb.proxy.is_empty() {
        warn!("federation service has been disabled (no backends)");
    } else {
        let client = lbatlas_meta::meta_client(&config.metaweb);
        let interface = config.metaweb.interface.clone();
        let port = config.metaweb.port;
        tasks.push(tokio::spawn(async move {
            if let Err(e) = lbatlas_meta::serve(client, &interface, port).await {
                warn!(error = %e, "federation service stopped");
            }
        }));
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutting down");
    for task in tasks {
        task.abort();
    }
    Ok(())
}
