//! Client behaviour against in-process mock services.

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::Query;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use common::{CameraIntrinsics, CameraParams, StageKind};
use estimation_remote::{
    CameraClient, HealthState, HttpInferenceClient, InferenceServices, OverallStatus, RemoteError, RenderRequest,
    SegmentRequest, ServerMonitor, ServiceEndpoints, StageTimeouts,
};
use serde_json::{json, Value};

async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn dead_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

fn client_for(url: &str, timeouts: StageTimeouts) -> HttpInferenceClient {
    let endpoints = ServiceEndpoints {
        render_url: url.to_string(),
        segment_url: url.to_string(),
        estimate_url: url.to_string(),
    };
    HttpInferenceClient::new(endpoints, timeouts)
}

fn segment_request() -> SegmentRequest {
    SegmentRequest {
        rgb_image: "cmdi".into(),
        depth_image: "ZGVwdGg=".into(),
        cam_params: CameraParams::new(&CameraIntrinsics::new(600.0, 600.0, 320.0, 240.0), 1.0),
        template_dir: "/workspace/templates/ycb/mug".into(),
        cad_path: "/workspace/meshes/ycb/mug.ply".into(),
        output_dir: None,
    }
}

#[tokio::test]
async fn test_segment_success() {
    println!("\n🔍 TEST: segment call decodes a successful response");
    let router = Router::new().route(
        "/api/v1/inference",
        post(|Json(body): Json<Value>| async move {
            assert_eq!(body["cam_params"]["cam_K"][0], 600.0);
            assert!(body.get("output_dir").is_none());
            Json(json!({
                "success": true,
                "detections": {"masks": [], "boxes": [[0, 0, 4, 4]], "scores": [0.8], "object_ids": [1]},
                "inference_time": 0.25
            }))
        }),
    );
    let url = spawn(router).await;

    let resp = client_for(&url, StageTimeouts::default()).segment(&segment_request()).await.unwrap();
    assert!(resp.success);
    assert_eq!(resp.inference_time, Some(0.25));
    assert_eq!(resp.raw_detection_count(), 1);
    println!("   ✅ PASS");
}

#[tokio::test]
async fn test_non_2xx_is_protocol_error_with_truncated_body() {
    let router = Router::new().route(
        "/api/v1/inference",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "e".repeat(2000)) }),
    );
    let url = spawn(router).await;

    let err = client_for(&url, StageTimeouts::default()).segment(&segment_request()).await.unwrap_err();
    match err {
        RemoteError::Protocol { status, body, .. } => {
            assert_eq!(status, 500);
            assert_eq!(body.len(), 500);
        }
        other => panic!("expected protocol error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_success_false_is_service_error() {
    let router = Router::new().route(
        "/api/v1/inference",
        post(|| async { Json(json!({"success": false, "error_message": "no templates"})) }),
    );
    let url = spawn(router).await;

    let err = client_for(&url, StageTimeouts::default()).segment(&segment_request()).await.unwrap_err();
    assert_eq!(err.kind(), "service");
    assert!(err.to_string().contains("no templates"));
}

#[tokio::test]
async fn test_invalid_json_is_decode_error() {
    let router = Router::new().route("/api/v1/inference", post(|| async { "definitely not json" }));
    let url = spawn(router).await;

    let err = client_for(&url, StageTimeouts::default()).segment(&segment_request()).await.unwrap_err();
    assert_eq!(err.kind(), "decode");
}

#[tokio::test]
async fn test_slow_service_times_out() {
    println!("\n⏱️  TEST: a slow segment call fails with a timeout");
    let router = Router::new().route(
        "/api/v1/inference",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(json!({"success": true}))
        }),
    );
    let url = spawn(router).await;
    let timeouts = StageTimeouts {
        segment: Duration::from_millis(200),
        ..StageTimeouts::default()
    };

    let err = client_for(&url, timeouts)
        .with_progress_interval(Duration::from_millis(50))
        .segment(&segment_request())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Timeout { .. }), "got {:?}", err);
    println!("   ✅ PASS: {}", err);
}

#[tokio::test]
async fn test_unreachable_is_connect_error() {
    let url = dead_url().await;
    let err = client_for(&url, StageTimeouts::default()).segment(&segment_request()).await.unwrap_err();
    assert_eq!(err.kind(), "connect");
}

#[tokio::test]
async fn test_render_sends_wait_query() {
    let router = Router::new().route(
        "/render/templates",
        post(|Query(q): Query<HashMap<String, String>>, Json(body): Json<Value>| async move {
            Json(json!({
                "success": q.get("wait").map(String::as_str) == Some("true"),
                "templates_generated": 42,
                "echo_wait": q.get("wait_timeout_sec"),
                "echo_cad": body["cad_path"]
            }))
        }),
    );
    let url = spawn(router).await;

    let resp = client_for(&url, StageTimeouts::default())
        .render(&RenderRequest {
            cad_path: "/m/a.ply".into(),
            output_dir: "/t/a".into(),
        })
        .await
        .unwrap();
    assert_eq!(resp.templates_generated, Some(42));
    assert_eq!(resp.extra["echo_wait"], "3600");
    assert_eq!(resp.extra["echo_cad"], "/m/a.ply");
}

#[tokio::test]
async fn test_health_paths_per_stage() {
    let router = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/v1/health", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));
    let url = spawn(router).await;
    let client = client_for(&url, StageTimeouts::default());

    assert!(client.health(StageKind::Segment).await.is_ok());
    let err = client.health(StageKind::Estimate).await.unwrap_err();
    assert!(matches!(err, RemoteError::Protocol { status: 503, .. }));
}

#[tokio::test]
async fn test_server_monitor_degraded() {
    println!("\n🩺 TEST: one healthy, one failing, one unreachable server");
    let ism = spawn(Router::new().route("/health", get(|| async { "ok" }))).await;
    let pem = spawn(Router::new().route("/api/v1/health", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))).await;
    let render = dead_url().await;

    let endpoints = ServiceEndpoints {
        render_url: render,
        segment_url: ism.clone(),
        estimate_url: pem,
    };
    let monitor = ServerMonitor::new(&endpoints, Duration::from_secs(2));
    let report = monitor.check_all().await;

    assert_eq!(report.total_servers, 3);
    assert_eq!(report.healthy_servers, 1);
    assert_eq!(report.overall_status, OverallStatus::Degraded);
    assert_eq!(report.servers["ism"].status, HealthState::Healthy);
    assert_eq!(report.servers["ism"].url, ism);
    assert!(report.servers["ism"].response_time_ms.is_some());
    assert_eq!(report.servers["pem"].error_message.as_deref(), Some("HTTP 500"));
    assert_eq!(report.servers["render"].status, HealthState::Unhealthy);

    assert!(monitor.check_server("segment").await.is_some());
    assert!(monitor.check_server("unknown").await.is_none());
    println!("   ✅ PASS: overall {:?}", report.overall_status);
}

#[tokio::test]
async fn test_camera_client_fetches() {
    let router = Router::new()
        .route("/streams/color_raw", get(|| async { vec![1u8, 2, 3] }))
        .route("/camera/calibration", get(|| async { Json(json!({"depth_scale": 1.0})) }))
        .route("/camera/status", get(|| async { (StatusCode::NOT_FOUND, "nope") }));
    let url = spawn(router).await;

    let camera = CameraClient::new(format!("{}/", url), Duration::from_secs(2));
    assert_eq!(camera.base_url(), url);
    assert_eq!(camera.color_raw().await.unwrap(), vec![1, 2, 3]);
    assert_eq!(camera.calibration().await.unwrap()["depth_scale"], 1.0);
    assert_eq!(camera.status().await.unwrap_err().kind(), "protocol");
}
