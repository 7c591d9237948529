use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

use crate::domain::Snapshot;

/// Completion ratio of the in-flight polling cycle. Published over a watch
/// channel, which coalesces bursts so readers only ever observe the latest
/// value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CycleProgress {
    pub generation: u64,
    pub completed: usize,
    pub total: usize,
}

impl CycleProgress {
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

/// Process-wide holder of the latest published snapshot plus the derived UI
/// flags. Snapshots are replaced wholesale; readers see either the old or
/// the new one, never a torn intermediate.
#[derive(Clone)]
pub struct StatusStore {
    snapshot: Arc<RwLock<Arc<Snapshot>>>,
    refreshing: Arc<AtomicBool>,
    progress: Arc<watch::Sender<CycleProgress>>,
}

impl StatusStore {
    pub fn new(initial: Snapshot) -> Self {
        let (progress_tx, _progress_rx) = watch::channel(CycleProgress::default());
        Self {
            snapshot: Arc::new(RwLock::new(Arc::new(initial))),
            refreshing: Arc::new(AtomicBool::new(false)),
            progress: Arc::new(progress_tx),
        }
    }

    pub async fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&*self.snapshot.read().await)
    }

    /// Atomically replaces the snapshot. Rejects publications from cycles
    /// that have been superseded by a newer generation.
    ///
    /// Expansion flags are carried over from the snapshot being replaced: a
    /// flag flipped while the publishing cycle was in flight would otherwise
    /// be reverted to what the cycle captured when it started.
    pub async fn publish(&self, mut snapshot: Snapshot) -> bool {
        let mut guard = self.snapshot.write().await;
        if snapshot.generation < guard.generation {
            return false;
        }
        for group in &mut snapshot.groups {
            let Some(current_group) = guard.groups.iter().find(|g| g.name == group.name) else {
                continue;
            };
            for node in &mut group.nodes {
                if let Some(current_node) =
                    current_group.nodes.iter().find(|n| n.name == node.name)
                {
                    node.is_expanded = current_node.is_expanded;
                }
            }
        }
        *guard = Arc::new(snapshot);
        true
    }

    pub fn set_refreshing(&self, refreshing: bool) {
        self.refreshing.store(refreshing, Ordering::SeqCst);
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::SeqCst)
    }

    pub fn report_progress(&self, progress: CycleProgress) {
        self.progress.send_replace(progress);
    }

    pub fn progress(&self) -> CycleProgress {
        *self.progress.borrow()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<CycleProgress> {
        self.progress.subscribe()
    }

    /// Flips a node's expansion flag. UI-only state: the replacement keeps
    /// the same generation and measurements.
    pub async fn set_expanded(&self, group: &str, node: &str, expanded: bool) -> bool {
        let mut guard = self.snapshot.write().await;
        let mut next = (**guard).clone();
        let mut found = false;
        for group_status in &mut next.groups {
            if group_status.name != group {
                continue;
            }
            for node_status in &mut group_status.nodes {
                if node_status.name == node {
                    node_status.is_expanded = expanded;
                    found = true;
                }
            }
        }
        if found {
            *guard = Arc::new(next);
        }
        found
    }
}
