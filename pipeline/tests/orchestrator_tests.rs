//! End-to-end runs against in-process services.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::routing::get;
use axum::{Json, Router};
use common::{CameraIntrinsics, CameraParams, StageKind};
use estimation_asset_cache::AssetRegistry;
use estimation_pipeline::{CaptureRequest, PipelineConfig, PipelineOrchestrator, PipelineRequest, StaticPaths};
use estimation_remote::{
    EstimateRequest, EstimateResponse, InferenceServices, RemoteError, RenderRequest, RenderResponse, SegmentRequest,
    SegmentResponse,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tempfile::TempDir;

#[derive(Default)]
struct MockServices {
    calls: Mutex<Vec<String>>,
    detections: Value,
    segment_times_out: bool,
    renders: Mutex<Vec<RenderRequest>>,
    segments: Mutex<Vec<SegmentRequest>>,
    estimates: Mutex<Vec<EstimateRequest>>,
}

impl MockServices {
    fn with_detections(detections: Value) -> Self {
        Self {
            detections,
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn called(&self, name: &str) -> bool {
        self.calls().iter().any(|c| c == name)
    }
}

#[async_trait]
impl InferenceServices for MockServices {
    async fn render(&self, request: &RenderRequest) -> estimation_remote::Result<RenderResponse> {
        self.calls.lock().push("render".into());
        self.renders.lock().push(request.clone());
        std::fs::create_dir_all(&request.output_dir).unwrap();
        std::fs::write(Path::new(&request.output_dir).join("rgb_0.png"), b"r").unwrap();
        Ok(RenderResponse {
            success: true,
            templates_generated: Some(42),
            ..Default::default()
        })
    }

    async fn segment(&self, request: &SegmentRequest) -> estimation_remote::Result<SegmentResponse> {
        self.calls.lock().push("segment".into());
        self.segments.lock().push(request.clone());
        if self.segment_times_out {
            return Err(RemoteError::Timeout {
                service: "segment".into(),
                timeout_secs: 600,
            });
        }
        Ok(SegmentResponse {
            success: true,
            detections: self.detections.clone(),
            inference_time: Some(1.5),
            ..Default::default()
        })
    }

    async fn estimate(&self, request: &EstimateRequest) -> estimation_remote::Result<EstimateResponse> {
        self.calls.lock().push("estimate".into());
        self.estimates.lock().push(request.clone());
        let n = request.seg_data.len();
        Ok(EstimateResponse {
            success: true,
            pose_scores: request.seg_data.iter().map(|d| d.score).collect(),
            pred_rot: vec![vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]]; n],
            pred_trans: vec![vec![0.0, 0.0, 500.0]; n],
            inference_time: Some(2.0),
            ..Default::default()
        })
    }

    async fn health(&self, stage: StageKind) -> estimation_remote::Result<()> {
        self.calls.lock().push(format!("health:{}", stage));
        Err(RemoteError::Connect {
            service: stage.to_string(),
            message: "refused".into(),
        })
    }
}

struct Fixture {
    root: TempDir,
    services: Arc<MockServices>,
    orchestrator: PipelineOrchestrator,
}

fn fixture(services: MockServices) -> Fixture {
    let root = TempDir::new().unwrap();
    let mesh_dir = root.path().join("meshes/ycb");
    std::fs::create_dir_all(&mesh_dir).unwrap();
    for object in ["mug", "bowl"] {
        std::fs::write(mesh_dir.join(format!("{}.obj", object)), "v 0 0 0\nv 10 10 10\n").unwrap();
    }

    let config = PipelineConfig {
        paths: StaticPaths::under(root.path()),
        top_k: 2,
        ..Default::default()
    };
    let services = Arc::new(services);
    let orchestrator = PipelineOrchestrator::new(services.clone(), Arc::new(AssetRegistry::new(4, 4)), config);
    Fixture {
        root,
        services,
        orchestrator,
    }
}

fn existing_templates(root: &Path, object: &str) {
    let dir = root.join("templates/ycb").join(object);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("mask_0.png"), b"m").unwrap();
}

fn request(object: &str, mode: &str, output_dir: Option<String>) -> PipelineRequest {
    let mut cam_params = CameraParams::new(&CameraIntrinsics::new(600.0, 600.0, 32.0, 24.0), 1.0);
    cam_params.width = Some(64);
    cam_params.height = Some(48);
    PipelineRequest {
        class_name: "ycb".into(),
        object_name: object.into(),
        rgb_image: "cmdi".into(),
        depth_image: "ZA==".into(),
        cam_params,
        output_dir,
        frame_guess: false,
        save_outputs: None,
        output_mode: Some(mode.into()),
        request_tag: Some("Unit Test".into()),
        force_render: false,
    }
}

fn three_detections() -> Value {
    json!([
        {"bbox": [1, 1, 10, 10], "score": 0.1, "category_id": 1},
        {"bbox": [2, 2, 20, 20], "score": 0.9, "category_id": 1},
        {"bbox": [3, 3, 30, 30], "score": 0.4, "category_id": 1}
    ])
}

#[tokio::test]
async fn test_full_run_renders_then_sends_top_k_in_score_order() {
    println!("\n🚀 TEST: full run with missing templates");
    let f = fixture(MockServices::with_detections(three_detections()));
    let out = f.root.path().join("out/run1");

    let result = f
        .orchestrator
        .run(request("mug", "full", Some(out.to_string_lossy().into_owned())))
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.request_tag, "unit-test");
    assert_eq!(result.output_dir.as_deref(), Some(out.to_string_lossy().as_ref()));

    let calls: Vec<String> = f.services.calls().into_iter().filter(|c| !c.starts_with("health")).collect();
    assert_eq!(calls, vec!["render", "segment", "estimate"]);

    let render = result.stage(StageKind::Render).unwrap();
    assert!(render.success && !render.skipped);

    let estimates = f.services.estimates.lock();
    let scores: Vec<f64> = estimates[0].seg_data.iter().map(|d| d.score).collect();
    assert_eq!(scores, vec![0.9, 0.4]);
    assert_eq!(estimates[0].frame_guess, None);
    assert_eq!(estimates[0].det_score_thresh, 0.2);
    assert!(estimates[0].output_dir.as_deref().unwrap().ends_with("pem"));

    assert_eq!(result.num_poses, 2);
    assert_eq!(result.pose_results[0].score, 0.9);
    assert!(out.join("pipeline_metadata.json").is_file());
    assert!(out.join("pose_results.json").is_file());
    assert!(out.join("ism").is_dir());
    assert!(out.join("pem").is_dir());
    assert!(!out.join("ism_server_response.json").exists());

    let metadata: Value = serde_json::from_slice(&std::fs::read(out.join("pipeline_metadata.json")).unwrap()).unwrap();
    assert_eq!(metadata["request_info"]["template_existed"], json!(false));
    assert_eq!(metadata["pipeline_steps"]["ism"]["num_detections"], json!(3));
    println!("   ✅ PASS: {} poses, top-K order kept", result.num_poses);
}

#[tokio::test]
async fn test_existing_templates_skip_render() {
    let f = fixture(MockServices::with_detections(three_detections()));
    existing_templates(f.root.path(), "mug");

    let result = f.orchestrator.run(request("mug", "none", None)).await;

    assert!(result.success);
    assert!(!f.services.called("render"));
    assert!(result.stage(StageKind::Render).unwrap().skipped);
}

#[tokio::test]
async fn test_forced_render_runs_despite_templates() {
    let f = fixture(MockServices::with_detections(three_detections()));
    existing_templates(f.root.path(), "mug");

    let mut req = request("mug", "none", None);
    req.force_render = true;
    f.orchestrator.run(req).await;

    assert_eq!(f.services.renders.lock().len(), 1);
}

#[tokio::test]
async fn test_mode_none_writes_nothing() {
    let f = fixture(MockServices::with_detections(three_detections()));
    let out = f.root.path().join("out/ignored");

    let result = f
        .orchestrator
        .run(request("mug", "none", Some(out.to_string_lossy().into_owned())))
        .await;

    assert!(result.success);
    assert!(result.output_dir.is_none());
    assert!(!out.exists());
    assert!(!f.root.path().join("output").exists());
    assert!(f.services.segments.lock()[0].output_dir.is_none());
    assert_eq!(result.num_poses, 2);
}

#[tokio::test]
async fn test_results_only_writes_pose_summary_only() {
    let f = fixture(MockServices::with_detections(three_detections()));
    existing_templates(f.root.path(), "mug");

    let result = f.orchestrator.run(request("mug", "results_only", None)).await;

    let dir = Path::new(result.output_dir.as_deref().unwrap()).to_path_buf();
    assert!(dir.starts_with(f.root.path().join("output")));
    assert!(dir.file_name().unwrap().to_string_lossy().ends_with("_unit-test"));

    let mut names: Vec<String> = std::fs::read_dir(&dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["pose_results.json"]);

    let summary: Value = serde_json::from_slice(&std::fs::read(dir.join("pose_results.json")).unwrap()).unwrap();
    assert_eq!(summary["num_poses"], json!(2));
}

#[tokio::test]
async fn test_segment_timeout_skips_estimate() {
    println!("\n⏱️ TEST: segmentation timeout");
    let f = fixture(MockServices {
        segment_times_out: true,
        ..Default::default()
    });
    existing_templates(f.root.path(), "mug");

    let result = f.orchestrator.run(request("mug", "none", None)).await;

    assert!(result.success);
    assert!(!f.services.called("estimate"));
    assert!(result.pose_results.is_empty());
    let segment = result.stage(StageKind::Segment).unwrap();
    assert!(!segment.success);
    assert_eq!(segment.error_kind.as_deref(), Some("timeout"));
    assert!(result.stage(StageKind::Estimate).is_none());
    println!("   ✅ PASS: estimate never called");
}

#[tokio::test]
async fn test_no_usable_detections_is_data_shape_failure() {
    let f = fixture(MockServices::with_detections(json!([
        {"bbox": [5, 5, 5, 5], "score": 0.8},
        {"bbox": [1, 1, 4, 4], "score": 0.0}
    ])));
    existing_templates(f.root.path(), "mug");

    let result = f.orchestrator.run(request("mug", "none", None)).await;

    assert!(!f.services.called("estimate"));
    let estimate = result.stage(StageKind::Estimate).unwrap();
    assert_eq!(estimate.error_kind.as_deref(), Some("data_shape"));
    assert_eq!(result.num_poses, 0);
}

#[tokio::test]
async fn test_missing_cad_fails_before_any_call() {
    let f = fixture(MockServices::default());

    let result = f.orchestrator.run(request("teapot", "full", None)).await;

    assert!(!result.success);
    assert!(result.error.unwrap().contains("CAD file not found: teapot"));
    assert!(f.services.calls().is_empty());
    assert!(result.output_dir.is_none());
}

#[tokio::test]
async fn test_path_like_names_rejected() {
    let f = fixture(MockServices::default());

    let result = f.orchestrator.run(request("../mug", "none", None)).await;

    assert!(!result.success);
    assert!(f.services.calls().is_empty());
}

#[tokio::test]
async fn test_render_templates_batch() {
    println!("\n🎨 TEST: batch template rendering");
    let f = fixture(MockServices::default());
    existing_templates(f.root.path(), "bowl");

    let objects = vec!["mug".to_string(), "ghost".to_string(), "bowl".to_string()];
    let report = f.orchestrator.render_templates("ycb", &objects, false).await;

    assert!(report.success);
    assert_eq!(report.total, 3);
    assert_eq!(report.successful, 2);
    assert_eq!(report.results[0].templates_generated, Some(42));
    assert!(report.results[1].error.as_deref().unwrap().starts_with("CAD file not found"));
    assert!(report.results[2].skipped);
    assert_eq!(f.services.renders.lock().len(), 1);
    println!("   ✅ PASS: {}/{} objects ready", report.successful, report.total);
}

async fn spawn_camera() -> String {
    let router = Router::new()
        .route(
            "/camera/calibration",
            get(|| async {
                Json(json!({
                    "K": [4.0, 0.0, 2.0, 0.0, 4.0, 1.5, 0.0, 0.0, 1.0],
                    "width": 4,
                    "height": 3,
                    "depth_scale": 1.0
                }))
            }),
        )
        .route("/streams/color_raw", get(|| async { vec![10u8; 4 * 3 * 3] }))
        .route("/streams/depth_raw", get(|| async { vec![1u8; 4 * 3 * 2] }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_run_from_camera_feeds_captured_frame() {
    println!("\n📷 TEST: run from the capture service");
    let f = fixture(MockServices::with_detections(three_detections()));
    existing_templates(f.root.path(), "mug");
    let base = spawn_camera().await;

    let result = f
        .orchestrator
        .run_from_camera(CaptureRequest {
            class_name: "ycb".into(),
            object_name: "mug".into(),
            base: Some(base),
            output_mode: Some("none".into()),
            ..Default::default()
        })
        .await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.request_tag, "full-pipeline-from-rss");
    let segments = f.services.segments.lock();
    assert_eq!(segments[0].cam_params.width, Some(4));
    assert_eq!(segments[0].cam_params.height, Some(3));
    assert_eq!(segments[0].cam_params.cam_k[0], 4.0);
    assert!(!segments[0].rgb_image.is_empty());
    println!("   ✅ PASS: captured frame reached segmentation");
}

#[tokio::test]
async fn test_run_from_camera_unreachable() {
    let f = fixture(MockServices::default());

    let result = f
        .orchestrator
        .run_from_camera(CaptureRequest {
            class_name: "ycb".into(),
            object_name: "mug".into(),
            base: Some("http://127.0.0.1:1".into()),
            ..Default::default()
        })
        .await;

    assert!(!result.success);
    assert!(result.error.unwrap().starts_with("Camera capture failed"));
    assert!(f.services.calls().is_empty());
}
