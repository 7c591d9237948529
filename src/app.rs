//! Wires configuration, catalog, probes, orchestrator and the HTTP server
//! together, and owns the shutdown sequence.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::app_state::AppState;
use crate::catalog::Catalog;
use crate::config::{BeaconConfig, ServersDocument};
use crate::domain::Snapshot;
use crate::error::{Context, Result};
use crate::orchestrator::{run_scheduler, Orchestrator};
use crate::probe::{build_sources, FallbackStatusProber, TcpLatencyProber};
use crate::query::UpstreamQueryBackend;
use crate::server::ApiServer;
use crate::store::StatusStore;

pub struct BeaconApp {
    config: BeaconConfig,
    orchestrator: Arc<Orchestrator>,
    server: ApiServer,
    state: AppState,
    refresh_rx: mpsc::Receiver<()>,
}

impl BeaconApp {
    pub async fn initialise(config: BeaconConfig) -> Result<Self> {
        let document = ServersDocument::from_path(&config.catalog_path)?;
        let catalog = Arc::new(Catalog::from_document(&document)?);
        tracing::info!(
            path = config.catalog_path.as_str(),
            groups = catalog.groups.len(),
            endpoints = catalog.endpoint_count(),
            "server catalog loaded"
        );

        let client = reqwest::Client::builder()
            .timeout(config.poll.source_timeout())
            .user_agent(concat!("beacon/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        let sources = build_sources(&config.sources, &client)?;
        let status_probe = Arc::new(FallbackStatusProber::new(
            sources,
            config.poll.source_timeout(),
            config.poll.source_backoff(),
        ));
        let latency_probe = Arc::new(TcpLatencyProber::new(
            config.poll.latency_timeout(),
            config.poll.latency_samples,
        ));

        let store = StatusStore::new(Snapshot::initial(&catalog));
        let orchestrator = Orchestrator::new(
            Arc::clone(&catalog),
            store.clone(),
            status_probe,
            latency_probe,
        );

        // Capacity 1: a second refresh request while one is queued is a no-op.
        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        let query = Arc::new(UpstreamQueryBackend::new(
            client,
            config.poll.latency_timeout(),
        ));

        let server = ApiServer::build(&config.http).await?;
        let state = AppState {
            catalog,
            store,
            refresh: refresh_tx,
            query,
        };

        Ok(Self {
            config,
            orchestrator,
            server,
            state,
            refresh_rx,
        })
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            config,
            orchestrator,
            server,
            state,
            refresh_rx,
        } = self;

        let shutdown = CancellationToken::new();
        let mut server_task = tokio::spawn(server.serve(state, shutdown.clone()));
        let mut scheduler_task = tokio::spawn(run_scheduler(
            orchestrator,
            config.poll.refresh_interval(),
            refresh_rx,
            shutdown.clone(),
        ));

        let mut server_done = false;
        let mut scheduler_done = false;

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
            }
            joined = &mut server_task => {
                server_done = true;
                report_server_exit(joined);
            }
            joined = &mut scheduler_task => {
                scheduler_done = true;
                if let Err(err) = joined {
                    tracing::error!(error = %err, "scheduler task panicked");
                }
            }
        }

        shutdown.cancel();
        if !server_done {
            report_server_exit(server_task.await);
        }
        if !scheduler_done {
            if let Err(err) = scheduler_task.await {
                tracing::error!(error = %err, "scheduler task panicked");
            }
        }

        tracing::info!("shutdown complete");
        Ok(())
    }
}

fn report_server_exit(joined: std::result::Result<Result<()>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(())) => tracing::info!("HTTP server stopped"),
        Ok(Err(err)) => tracing::error!(error = %err, "HTTP server failed"),
        Err(err) => tracing::error!(error = %err, "HTTP server task panicked"),
    }
}
