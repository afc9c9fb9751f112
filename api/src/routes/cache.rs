//! Asset cache statistics.

use async_trait::async_trait;
use axum::http::Method;
use estimation_asset_cache::RegistryStats;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::route_trait::{RouteHandler, RouteMetadata};
use crate::state::AppState;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStatsRequest {}

/// Size, capacity and hit/miss counters of the template and CAD caches.
pub struct CacheStatsRoute;

#[async_trait]
impl RouteHandler for CacheStatsRoute {
    type Request = CacheStatsRequest;
    type Response = RegistryStats;

    fn metadata() -> RouteMetadata {
        RouteMetadata {
            path: "/api/v1/cache/stats",
            method: Method::GET,
            tags: &["Cache"],
            description: "Template and CAD cache occupancy and hit rates",
            idempotent: true,
        }
    }

    async fn validate_request(_req: &Self::Request) -> ApiResult<()> {
        Ok(())
    }

    async fn handle(_req: Self::Request, state: &AppState) -> ApiResult<Self::Response> {
        let request_id = uuid::Uuid::new_v4();
        let stats = state.registry().stats();
        tracing::info!(
            request_id = %request_id,
            templates = stats.templates.size,
            cads = stats.cads.size,
            "Cache stats requested"
        );
        Ok(stats)
    }
}
