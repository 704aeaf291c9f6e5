use std::sync::Arc;

use crate::session::queue::AnalysisQueue;
use crate::session::runner::AnalysisPipeline;
use crate::session::store::SessionStore;
use crate::storage::ObjectStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SessionStore>,
    pub objects: Arc<dyn ObjectStore>,
    /// Also owns the published semantic indexes, evicted on reset/delete.
    pub pipeline: AnalysisPipeline,
    pub queue: AnalysisQueue,
}
