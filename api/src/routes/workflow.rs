//! Pipeline workflows: full run, run from the capture service, batch template rendering.
//!
//! All three answer `200` with `{success, message, results}` once the request
//! is well formed, whatever happened in the stages. `results` carries the
//! pipeline result (or render report) as JSON.

use async_trait::async_trait;
use axum::http::Method;
use estimation_pipeline::{CaptureRequest, PipelineRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ApiError, ApiResult};
use crate::route_trait::validators::{NotEmpty, VecNotEmpty};
use crate::route_trait::{RouteHandler, RouteMetadata, ValidationRule};
use crate::state::AppState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResponse {
    pub success: bool,
    pub message: String,
    pub results: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderTemplatesRequest {
    #[serde(alias = "className")]
    pub class_name: String,

    #[serde(alias = "objectNames")]
    pub object_names: Vec<String>,

    #[serde(default, alias = "forceRegenerate", alias = "force_render")]
    pub force_regenerate: bool,
}

fn pipeline_message(success: bool) -> String {
    if success {
        "Pipeline execution completed".to_string()
    } else {
        "Pipeline execution failed".to_string()
    }
}

fn validate_object(class_name: &str, object_name: &str) -> ApiResult<()> {
    NotEmpty.validate_field("class_name", class_name)?;
    NotEmpty.validate_field("object_name", object_name)
}

/// Runs render → segment → estimate on caller-supplied images.
pub struct FullPipelineRoute;

#[async_trait]
impl RouteHandler for FullPipelineRoute {
    type Request = PipelineRequest;
    type Response = WorkflowResponse;

    fn metadata() -> RouteMetadata {
        RouteMetadata {
            path: "/api/v1/workflow/full-pipeline",
            method: Method::POST,
            tags: &["Workflow"],
            description: "Full pose-estimation pipeline over an uploaded RGB-D frame",
            idempotent: false,
        }
    }

    async fn validate_request(req: &Self::Request) -> ApiResult<()> {
        validate_object(&req.class_name, &req.object_name)?;
        NotEmpty.validate_field("rgb_image", &req.rgb_image)?;
        NotEmpty.validate_field("depth_image", &req.depth_image)?;
        if req.cam_params.intrinsics().is_none() {
            return Err(ApiError::invalid(
                "cam_params",
                "cam_K must be a 3x3 intrinsic matrix with positive focal lengths",
            ));
        }
        Ok(())
    }

    async fn handle(req: Self::Request, state: &AppState) -> ApiResult<Self::Response> {
        let request_id = uuid::Uuid::new_v4();
        tracing::info!(
            request_id = %request_id,
            class_name = %req.class_name,
            object_name = %req.object_name,
            "Full pipeline request"
        );

        let result = state.orchestrator.run(req).await;

        tracing::info!(
            request_id = %request_id,
            success = result.success,
            num_poses = result.num_poses,
            "Full pipeline request finished"
        );
        Ok(WorkflowResponse {
            success: result.success,
            message: pipeline_message(result.success),
            results: serde_json::to_value(&result)?,
        })
    }
}

/// Captures a frame from the capture service, then runs the full pipeline on it.
pub struct FullPipelineFromCameraRoute;

#[async_trait]
impl RouteHandler for FullPipelineFromCameraRoute {
    type Request = CaptureRequest;
    type Response = WorkflowResponse;

    fn metadata() -> RouteMetadata {
        RouteMetadata {
            path: "/api/v1/workflow/full-pipeline-from-rss",
            method: Method::POST,
            tags: &["Workflow"],
            description: "Full pose-estimation pipeline over a frame captured from the camera service",
            idempotent: false,
        }
    }

    async fn validate_request(req: &Self::Request) -> ApiResult<()> {
        validate_object(&req.class_name, &req.object_name)?;
        if req.port == Some(0) {
            return Err(ApiError::invalid("port", "must be between 1 and 65535"));
        }
        Ok(())
    }

    async fn handle(req: Self::Request, state: &AppState) -> ApiResult<Self::Response> {
        let request_id = uuid::Uuid::new_v4();
        tracing::info!(
            request_id = %request_id,
            class_name = %req.class_name,
            object_name = %req.object_name,
            align_color = req.align_color,
            "Camera pipeline request"
        );

        let result = state.orchestrator.run_from_camera(req).await;

        if let Some(error) = &result.error {
            tracing::error!(request_id = %request_id, error = %error, "Camera pipeline request failed");
        } else {
            tracing::info!(request_id = %request_id, num_poses = result.num_poses, "Camera pipeline request finished");
        }
        Ok(WorkflowResponse {
            success: result.success,
            message: pipeline_message(result.success),
            results: serde_json::to_value(&result)?,
        })
    }
}

/// Renders templates for a list of objects of one class.
pub struct RenderTemplatesRoute;

#[async_trait]
impl RouteHandler for RenderTemplatesRoute {
    type Request = RenderTemplatesRequest;
    type Response = WorkflowResponse;

    fn metadata() -> RouteMetadata {
        RouteMetadata {
            path: "/api/v1/workflow/render-templates",
            method: Method::POST,
            tags: &["Workflow"],
            description: "Render templates for several objects, skipping those already rendered",
            idempotent: false,
        }
    }

    async fn validate_request(req: &Self::Request) -> ApiResult<()> {
        NotEmpty.validate_field("class_name", &req.class_name)?;
        VecNotEmpty::<String>::new().validate_field("object_names", req.object_names.as_slice())?;
        for name in &req.object_names {
            NotEmpty.validate_field("object_names", name)?;
        }
        Ok(())
    }

    async fn handle(req: Self::Request, state: &AppState) -> ApiResult<Self::Response> {
        let request_id = uuid::Uuid::new_v4();
        tracing::info!(
            request_id = %request_id,
            class_name = %req.class_name,
            objects = req.object_names.len(),
            force = req.force_regenerate,
            "Render templates request"
        );

        let report = state
            .orchestrator
            .render_templates(&req.class_name, &req.object_names, req.force_regenerate)
            .await;

        Ok(WorkflowResponse {
            success: report.success,
            message: format!("Processed {}/{} objects", report.successful, report.total),
            results: serde_json::to_value(&report)?,
        })
    }
}
