//! Liveness endpoint.

use async_trait::async_trait;
use axum::http::Method;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::route_trait::{RouteHandler, RouteMetadata};
use crate::state::AppState;

/// No parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthRequest {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Answers as long as the process is serving requests. Says nothing about
/// the remote services; see `/api/v1/servers/status` for those.
pub struct HealthRoute;

#[async_trait]
impl RouteHandler for HealthRoute {
    type Request = HealthRequest;
    type Response = HealthResponse;

    fn metadata() -> RouteMetadata {
        RouteMetadata {
            path: "/health",
            method: Method::GET,
            tags: &["System"],
            description: "Health check endpoint for service monitoring and load balancer probes",
            idempotent: true,
        }
    }

    async fn validate_request(_req: &Self::Request) -> ApiResult<()> {
        Ok(())
    }

    async fn handle(_req: Self::Request, _state: &AppState) -> ApiResult<Self::Response> {
        let request_id = uuid::Uuid::new_v4();
        tracing::debug!(request_id = %request_id, "Health check request received");

        Ok(HealthResponse {
            status: "ok".to_string(),
            service: "estimation-server".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }
}
