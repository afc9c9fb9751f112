//! Builds the shared application state from a [`ServerConfig`].

use std::sync::Arc;

use estimation_api::AppState;
use estimation_asset_cache::{AssetRegistry, PreloadReport};
use estimation_pipeline::PipelineOrchestrator;
use estimation_remote::{HttpInferenceClient, ServerMonitor};

use crate::config::ServerConfig;

/// Wires the HTTP clients, asset caches, orchestrator and health monitor.
pub fn build_state(config: &ServerConfig) -> Arc<AppState> {
    let endpoints = config.endpoints();
    let timeouts = config.stage_timeouts();
    let monitor = ServerMonitor::new(&endpoints, timeouts.health);
    let services = Arc::new(HttpInferenceClient::new(endpoints, timeouts));
    let registry = Arc::new(AssetRegistry::new(config.cache.template_capacity, config.cache.cad_capacity));
    let orchestrator = Arc::new(PipelineOrchestrator::new(services, registry, config.pipeline_config()));

    tracing::info!(
        template_capacity = config.cache.template_capacity,
        cad_capacity = config.cache.cad_capacity,
        "Pipeline orchestrator ready"
    );
    Arc::new(AppState::new(orchestrator, monitor))
}

/// Fills the caches from the templates root when preload is enabled.
pub async fn preload_assets(state: &AppState, config: &ServerConfig) -> Option<PreloadReport> {
    if !config.cache.preload {
        return None;
    }
    let paths = config.static_paths();
    let report = state
        .registry()
        .preload(&paths.templates_root, &paths.meshes_root, &config.cache.preload_classes)
        .await;
    tracing::info!(
        templates = report.templates_loaded,
        cads = report.cads_loaded,
        skipped = report.skipped,
        failed = report.failed,
        stopped_full = report.stopped_full,
        "Asset preload finished"
    );
    Some(report)
}
