//! HTTP API for the pose-estimation pipeline.
//!
//! # Routes
//!
//! | method | path                                       |
//! |--------|--------------------------------------------|
//! | GET    | `/health`                                  |
//! | POST   | `/api/v1/workflow/full-pipeline`           |
//! | POST   | `/api/v1/workflow/full-pipeline-from-rss`  |
//! | POST   | `/api/v1/workflow/render-templates`        |
//! | GET    | `/api/v1/servers/status`                   |
//! | GET    | `/api/v1/servers/status/{name}`            |
//! | GET    | `/api/v1/cache/stats`                      |

#![deny(unsafe_code)]

mod config;
mod error;
mod middleware;
mod router;
pub mod route_trait;
pub mod routes;
mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use router::configure_routes;
pub use routes::workflow::{RenderTemplatesRequest, WorkflowResponse};
pub use state::AppState;

use std::sync::Arc;

/// Binds `config.host:config.port` and serves until the process is stopped.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn run_server(state: Arc<AppState>, config: ApiConfig) -> anyhow::Result<()> {
    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Estimation API server listening on http://{}", listener.local_addr()?);

    let app = router::configure_routes(state, &config);
    axum::serve(listener, app).await?;
    Ok(())
}
