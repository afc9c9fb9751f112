//! Health of the remote render, segmentation and pose services.

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::Method;
use axum::Json;
use estimation_remote::{ServerStatus, ServersReport};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::route_trait::{RouteHandler, RouteMetadata, SharedState};
use crate::state::AppState;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServersStatusRequest {}

/// Probes every configured service concurrently.
pub struct ServersStatusRoute;

#[async_trait]
impl RouteHandler for ServersStatusRoute {
    type Request = ServersStatusRequest;
    type Response = ServersReport;

    fn metadata() -> RouteMetadata {
        RouteMetadata {
            path: "/api/v1/servers/status",
            method: Method::GET,
            tags: &["Servers"],
            description: "Health of all remote services with an overall verdict",
            idempotent: true,
        }
    }

    async fn validate_request(_req: &Self::Request) -> ApiResult<()> {
        Ok(())
    }

    async fn handle(_req: Self::Request, state: &AppState) -> ApiResult<Self::Response> {
        let request_id = uuid::Uuid::new_v4();
        tracing::info!(request_id = %request_id, "Checking all servers");

        let report = state.monitor.check_all().await;

        tracing::info!(
            request_id = %request_id,
            healthy = report.healthy_servers,
            total = report.total_servers,
            "Server check finished"
        );
        Ok(report)
    }
}

/// `GET /api/v1/servers/status/{name}`; the name is a path segment, so this
/// one is registered by hand.
pub async fn server_status(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> ApiResult<Json<ServerStatus>> {
    let request_id = uuid::Uuid::new_v4();
    tracing::info!(request_id = %request_id, server = %name, "Checking server");

    match state.monitor.check_server(&name).await {
        Some(status) => Ok(Json(status)),
        None => {
            tracing::warn!(request_id = %request_id, server = %name, "Unknown server requested");
            Err(ApiError::NotFound(format!(
                "Server '{}' not found. Known servers: {}",
                name,
                state.monitor.server_names().join(", ")
            )))
        }
    }
}
