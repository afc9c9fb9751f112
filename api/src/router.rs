//! Router configuration and setup.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};

use crate::config::ApiConfig;
use crate::route_trait::{RegisterableRoute, SharedState};
use crate::state::AppState;
use crate::{middleware, routes};

/// Builds the full router with middleware and state applied.
pub fn configure_routes(state: Arc<AppState>, config: &ApiConfig) -> Router {
    let mut router: Router<SharedState> = Router::new();

    router = routes::health::HealthRoute::register(router);
    router = routes::workflow::FullPipelineRoute::register(router);
    router = routes::workflow::FullPipelineFromCameraRoute::register(router);
    router = routes::workflow::RenderTemplatesRoute::register(router);
    router = routes::servers::ServersStatusRoute::register(router);
    router = routes::cache::CacheStatsRoute::register(router);

    // path parameter, not a JSON body
    router = router.route("/api/v1/servers/status/{name}", get(routes::servers::server_status));

    router
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new())
                .on_response(DefaultOnResponse::new()),
        )
        .layer(middleware::cors_layer(config))
        .with_state(state)
}
