//! The polling core: fans status and latency probes out across every
//! catalog endpoint, tracks completion, aggregates per node and per group,
//! and publishes one immutable snapshot per cycle. Exactly one cycle wins
//! per generation; superseded cycles discard their results.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::catalog::Catalog;
use crate::domain::{now_rfc3339, ServerStatus, Snapshot};
use crate::metrics::metrics;
use crate::probe::{LatencyProbe, StatusProbe};
use crate::store::{CycleProgress, StatusStore};

enum ProbeResult {
    Status {
        group: usize,
        node: usize,
        endpoint: usize,
        status: ServerStatus,
    },
    Latency {
        group: usize,
        node: usize,
        endpoint: usize,
        latency_ms: i64,
    },
}

pub struct Orchestrator {
    catalog: Arc<Catalog>,
    store: StatusStore,
    status_probe: Arc<dyn StatusProbe>,
    latency_probe: Arc<dyn LatencyProbe>,
    generation: AtomicU64,
    active: Mutex<Option<CancellationToken>>,
}

impl Orchestrator {
    pub fn new(
        catalog: Arc<Catalog>,
        store: StatusStore,
        status_probe: Arc<dyn StatusProbe>,
        latency_probe: Arc<dyn LatencyProbe>,
    ) -> Arc<Self> {
        Arc::new(Self {
            catalog,
            store,
            status_probe,
            latency_probe,
            generation: AtomicU64::new(0),
            active: Mutex::new(None),
        })
    }

    pub fn store(&self) -> &StatusStore {
        &self.store
    }

    /// Starts a polling cycle, superseding any cycle still in flight. The
    /// refreshing flag is cleared on every exit path, including panics
    /// inside probe tasks and unexpected errors.
    pub fn run_cycle(self: &Arc<Self>, initial: bool) -> JoinHandle<()> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        {
            let mut active = self.active.lock().expect("active cycle lock poisoned");
            if let Some(previous) = active.replace(token.clone()) {
                previous.cancel();
            }
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            metrics().inc_cycles_started();
            this.store.set_refreshing(true);
            let published = this.execute(generation, initial, token).await;
            // Only the current cycle may clear the flag: a superseded task
            // racing the clear against its successor's set would otherwise
            // report the live cycle as idle.
            if this.generation.load(Ordering::SeqCst) == generation {
                this.store.set_refreshing(false);
            }
            if published {
                metrics().inc_cycles_completed();
                tracing::info!(generation, "polling cycle completed");
            } else {
                metrics().inc_cycles_superseded();
                tracing::debug!(generation, "polling cycle superseded");
            }
        })
    }

    pub fn cancel_active(&self) {
        if let Some(token) = self
            .active
            .lock()
            .expect("active cycle lock poisoned")
            .take()
        {
            token.cancel();
        }
    }

    /// Runs one cycle to completion. Returns whether its snapshot was
    /// published; a superseded cycle discards its work and returns `false`.
    async fn execute(&self, generation: u64, initial: bool, token: CancellationToken) -> bool {
        let previous = self.store.snapshot().await;
        let mut snapshot = Snapshot::rebuild(&self.catalog, generation, Some(previous.as_ref()));

        // On the initial load readers should see the testing placeholders;
        // on a refresh the previous snapshot stays visible until the new
        // one is complete.
        if initial {
            self.store.publish(snapshot.clone()).await;
        }

        let mut probes: JoinSet<ProbeResult> = JoinSet::new();
        for (group_index, group) in self.catalog.groups.iter().enumerate() {
            for (node_index, node) in group.nodes.iter().enumerate() {
                for (endpoint_index, endpoint) in node.endpoints.iter().enumerate() {
                    let status_probe = Arc::clone(&self.status_probe);
                    let status_endpoint = endpoint.clone();
                    probes.spawn(async move {
                        ProbeResult::Status {
                            group: group_index,
                            node: node_index,
                            endpoint: endpoint_index,
                            status: status_probe.probe(&status_endpoint).await,
                        }
                    });

                    let latency_probe = Arc::clone(&self.latency_probe);
                    let (target_host, target_port) = node.latency_target(endpoint);
                    probes.spawn(async move {
                        ProbeResult::Latency {
                            group: group_index,
                            node: node_index,
                            endpoint: endpoint_index,
                            latency_ms: latency_probe.probe(&target_host, target_port).await,
                        }
                    });
                }
            }
        }

        let total = probes.len();
        let mut completed = 0usize;
        self.store.report_progress(CycleProgress {
            generation,
            completed,
            total,
        });

        loop {
            let joined = tokio::select! {
                _ = token.cancelled() => {
                    probes.abort_all();
                    return false;
                }
                joined = probes.join_next() => joined,
            };

            let Some(joined) = joined else {
                break;
            };

            match joined {
                Ok(ProbeResult::Status {
                    group,
                    node,
                    endpoint,
                    status,
                }) => {
                    snapshot.groups[group].nodes[node].endpoints[endpoint]
                        .apply_status(&status);
                }
                Ok(ProbeResult::Latency {
                    group,
                    node,
                    endpoint,
                    latency_ms,
                }) => {
                    snapshot.groups[group].nodes[node].endpoints[endpoint]
                        .apply_latency(latency_ms);
                }
                // A panicked probe task still counts as settled; its
                // measurement keeps the sentinel values.
                Err(join_err) => {
                    tracing::warn!(generation, error = %join_err, "probe task failed");
                }
            }

            completed += 1;
            self.store.report_progress(CycleProgress {
                generation,
                completed,
                total,
            });
        }

        for group in &mut snapshot.groups {
            group.finalise();
        }
        snapshot.completed_at = Some(now_rfc3339());

        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        self.store.publish(snapshot).await
    }
}

/// Drives the recurring refresh. Exactly one countdown exists at a time: it
/// is armed only after a cycle finishes, and a manual refresh request
/// replaces it instead of stacking a second one.
pub async fn run_scheduler(
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
    mut refresh_rx: mpsc::Receiver<()>,
    shutdown: CancellationToken,
) {
    let mut cycle = orchestrator.run_cycle(true);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                orchestrator.cancel_active();
                return;
            }
            joined = &mut cycle => {
                if let Err(err) = joined {
                    tracing::error!(error = %err, "polling cycle task panicked");
                }
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        orchestrator.cancel_active();
                        return;
                    }
                    _ = sleep(interval) => {
                        cycle = orchestrator.run_cycle(false);
                    }
                    request = refresh_rx.recv() => match request {
                        Some(()) => {
                            cycle = orchestrator.run_cycle(false);
                        }
                        None => return,
                    }
                }
            }
            request = refresh_rx.recv() => match request {
                // Refresh while a cycle is running supersedes it.
                Some(()) => {
                    cycle = orchestrator.run_cycle(false);
                }
                None => return,
            }
        }
    }
}
