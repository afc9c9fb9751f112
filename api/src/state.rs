//! Shared state behind every route.

use std::sync::Arc;

use estimation_asset_cache::AssetRegistry;
use estimation_pipeline::PipelineOrchestrator;
use estimation_remote::ServerMonitor;

/// Components built once at startup and shared by all requests.
pub struct AppState {
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub monitor: ServerMonitor,
}

impl AppState {
    pub fn new(orchestrator: Arc<PipelineOrchestrator>, monitor: ServerMonitor) -> Self {
        Self { orchestrator, monitor }
    }

    pub fn registry(&self) -> &Arc<AssetRegistry> {
        self.orchestrator.registry()
    }
}
