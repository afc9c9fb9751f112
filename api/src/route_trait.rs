//! Route handler traits.
//!
//! Every JSON route implements [`RouteHandler`]: metadata, request validation
//! that runs before the handler, and a handler that logs under its own
//! `request_id`. [`RegisterableRoute::register`] wires it into the router,
//! taking the request from the query string for GET and from the JSON body
//! for POST.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::http::Method;
use axum::{Json, Router};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Router state shared by every route.
pub type SharedState = Arc<AppState>;

/// Route metadata.
#[derive(Debug, Clone)]
pub struct RouteMetadata {
    /// HTTP path (e.g., "/api/v1/workflow/full-pipeline")
    pub path: &'static str,
    pub method: Method,
    /// Grouping tags
    pub tags: &'static [&'static str],
    pub description: &'static str,
    /// GET routes are, workflow POSTs are not
    pub idempotent: bool,
}

#[async_trait]
pub trait RouteHandler: Send + Sync + 'static {
    type Request: DeserializeOwned + Debug + Send + Sync + 'static;

    type Response: Serialize + Debug + Send + Sync + 'static;

    fn metadata() -> RouteMetadata;

    /// Called before [`handle`](Self::handle). Field problems are
    /// [`ApiError::ValidationError`]s.
    async fn validate_request(req: &Self::Request) -> ApiResult<()>;

    async fn handle(req: Self::Request, state: &AppState) -> ApiResult<Self::Response>;
}

pub trait RegisterableRoute: RouteHandler {
    /// Adds this route to `router` under its metadata path and method.
    fn register(router: Router<SharedState>) -> Router<SharedState> {
        let metadata = Self::metadata();
        match metadata.method {
            Method::GET => router.route(
                metadata.path,
                axum::routing::get(
                    |State(state): State<SharedState>, Query(req): Query<Self::Request>| async move {
                        Self::validate_request(&req).await?;
                        let response = Self::handle(req, &state).await?;
                        Ok::<_, ApiError>(Json(response))
                    },
                ),
            ),
            Method::POST => router.route(
                metadata.path,
                axum::routing::post(
                    |State(state): State<SharedState>, Json(req): Json<Self::Request>| async move {
                        Self::validate_request(&req).await?;
                        let response = Self::handle(req, &state).await?;
                        Ok::<_, ApiError>(Json(response))
                    },
                ),
            ),
            other => {
                tracing::error!(path = metadata.path, method = %other, "Unsupported method, route not registered");
                router
            }
        }
    }
}

impl<T: RouteHandler> RegisterableRoute for T {}

/// Reusable field checks.
pub trait ValidationRule: Send + Sync {
    type Target: ?Sized;

    fn validate(&self, target: &Self::Target) -> ApiResult<()>;

    /// Like [`validate`](Self::validate), reporting failures against `field_name`.
    fn validate_field(&self, field_name: &str, target: &Self::Target) -> ApiResult<()> {
        self.validate(target).map_err(|e| match e {
            ApiError::BadRequest(msg) => ApiError::ValidationError {
                field: field_name.to_string(),
                message: msg,
                request_id: Some(uuid::Uuid::new_v4().to_string()),
            },
            other => other,
        })
    }
}

pub mod validators {
    use super::*;

    /// Rejects empty or whitespace-only strings.
    pub struct NotEmpty;

    impl ValidationRule for NotEmpty {
        type Target = str;

        fn validate(&self, target: &str) -> ApiResult<()> {
            if target.trim().is_empty() {
                Err(ApiError::BadRequest("cannot be empty".into()))
            } else {
                Ok(())
            }
        }
    }

    /// Rejects empty lists.
    pub struct VecNotEmpty<T>(std::marker::PhantomData<T>);

    impl<T> VecNotEmpty<T> {
        pub const fn new() -> Self {
            Self(std::marker::PhantomData)
        }
    }

    impl<T> Default for VecNotEmpty<T> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<T: Send + Sync> ValidationRule for VecNotEmpty<T> {
        type Target = [T];

        fn validate(&self, target: &[T]) -> ApiResult<()> {
            if target.is_empty() {
                Err(ApiError::BadRequest("Array cannot be empty".into()))
            } else {
                Ok(())
            }
        }
    }
}
