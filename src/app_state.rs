use std::sync::Arc;
use tokio::sync::mpsc;

use crate::catalog::Catalog;
use crate::query::QueryBackend;
use crate::store::StatusStore;

/// Shared handles the HTTP layer needs. Cheap to clone; everything inside is
/// reference-counted.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub store: StatusStore,
    pub refresh: mpsc::Sender<()>,
    pub query: Arc<dyn QueryBackend>,
}
