//! The render → segment → estimate state machine.
//!
//! A run never fails because a stage failed: every stage outcome becomes a
//! [`StageRecord`] and the run proceeds to FINALIZE. Only a request that
//! cannot start (unknown CAD, bad names, failed capture) or a failed write
//! during FINALIZE yields `success == false` with an `error`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use common::{summarize_poses, OutputMode, PipelineResult, PoseEntry, StageKind, StageRecord};
use estimation_asset_cache::{find_cad_file, AssetRegistry};
use estimation_remote::{
    resolve_base_url, CameraClient, EstimateRequest, InferenceServices, RemoteError, RenderRequest, RenderResponse,
    SegmentRequest, SegmentResponse,
};
use estimation_vision::{image_io, parse_raw_detections, DetectionAdapter, FrameAligner, ImageDims};
use tracing::Instrument;
use uuid::Uuid;

use crate::artifacts::{
    ArtifactWriter, AssetInfo, CameraInfo, PipelineInfo, PipelineSteps, RequestInfo, RunMetadata,
    ESTIMATE_RESPONSE_FILE, SEGMENT_RESPONSE_FILE,
};
use crate::capture::capture_frame;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::output::{normalize_tag, plan_output_dir, DEFAULT_CAPTURE_TAG, DEFAULT_TAG};
use crate::request::{CaptureRequest, PipelineRequest, RenderOutcome, RenderTemplatesReport};

const SEGMENT_DIR: &str = "ism";
const ESTIMATE_DIR: &str = "pem";

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn validate_name(what: &str, name: &str) -> Result<()> {
    let bad = name.trim().is_empty() || name.contains(['/', '\\']) || name == "." || name == "..";
    if bad {
        return Err(PipelineError::Validation(format!("invalid {}: {:?}", what, name)));
    }
    Ok(())
}

enum RenderStatus {
    Skipped,
    Rendered(RenderResponse),
    Failed(RemoteError),
}

/// Resolved locations of one object's assets.
struct ObjectPaths {
    cad_path: PathBuf,
    template_dir: PathBuf,
}

/// Everything a run carries between stages.
struct RunState<'a> {
    request: &'a PipelineRequest,
    paths: ObjectPaths,
    writer: Option<ArtifactWriter>,
    mode: OutputMode,
}

impl RunState<'_> {
    /// The writer, only when the mode persists per-stage artifacts.
    fn full_writer(&self) -> Option<&ArtifactWriter> {
        self.writer.as_ref().filter(|_| self.mode.persists_all())
    }
}

pub struct PipelineOrchestrator {
    services: Arc<dyn InferenceServices>,
    registry: Arc<AssetRegistry>,
    config: PipelineConfig,
    adapter: DetectionAdapter,
    aligner: FrameAligner,
}

impl PipelineOrchestrator {
    pub fn new(services: Arc<dyn InferenceServices>, registry: Arc<AssetRegistry>, config: PipelineConfig) -> Self {
        let adapter = DetectionAdapter::new(config.top_k);
        let aligner = FrameAligner::new(config.units_per_meter);
        Self {
            services,
            registry,
            config,
            adapter,
            aligner,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<AssetRegistry> {
        &self.registry
    }

    fn resolve_object(&self, class_name: &str, object_name: &str) -> Result<ObjectPaths> {
        validate_name("class name", class_name)?;
        validate_name("object name", object_name)?;
        let cad_path = find_cad_file(&self.config.paths.meshes_root, class_name, object_name).ok_or_else(|| {
            PipelineError::Validation(format!(
                "CAD file not found: {} (looking for .ply, .obj, or .stl)",
                object_name
            ))
        })?;
        Ok(ObjectPaths {
            cad_path,
            template_dir: self.config.paths.template_dir(class_name, object_name),
        })
    }

    /// Runs the pipeline over caller-supplied images.
    pub async fn run(&self, request: PipelineRequest) -> PipelineResult {
        self.run_with_default_tag(request, DEFAULT_TAG).await
    }

    async fn run_with_default_tag(&self, request: PipelineRequest, default_tag: &str) -> PipelineResult {
        let run_id = Uuid::new_v4();
        let tag = normalize_tag(request.request_tag.as_deref(), default_tag);
        let span = tracing::info_span!("pipeline_run", run_id = %run_id, tag = %tag);
        self.execute(run_id, tag, &request).instrument(span).await
    }

    async fn execute(&self, run_id: Uuid, tag: String, request: &PipelineRequest) -> PipelineResult {
        let mode = OutputMode::resolve(request.output_mode.as_deref(), request.save_outputs);
        tracing::info!(
            class_name = %request.class_name,
            object_name = %request.object_name,
            mode = %mode,
            "Pipeline run started"
        );

        let paths = match self.resolve_object(&request.class_name, &request.object_name) {
            Ok(paths) => paths,
            Err(e) => {
                tracing::warn!(error = %e, "Rejecting run before any remote call");
                return PipelineResult::failed(tag, e.to_string());
            }
        };

        let writer = match plan_output_dir(mode, request.output_dir.as_deref(), &self.config.paths.output_root, &tag) {
            Some(dir) => match ArtifactWriter::create(dir, self.config.persistence).await {
                Ok(writer) => Some(writer),
                Err(e) => {
                    tracing::error!(error = %e, "Cannot create output directory");
                    return PipelineResult::failed(tag, e.to_string());
                }
            },
            None => None,
        };

        let state = RunState {
            request,
            paths,
            writer,
            mode,
        };
        let started_at = Local::now();
        let started = Instant::now();

        if let Some(writer) = state.full_writer() {
            if let Err(e) = writer
                .save_inputs(&request.rgb_image, &request.depth_image, &request.cam_params)
                .await
            {
                tracing::warn!(error = %e, "Failed to save input data");
            }
        }

        let mut stages = Vec::with_capacity(3);

        // RENDER
        let template_existed = template_dir_exists(&state.paths.template_dir).await;
        stages.push(self.render_stage(&state.paths, template_existed, request.force_render).await);
        let assets = self.lookup_assets(&state.paths).await;

        // SEGMENT
        let (segment_record, segmentation) = self.segment_stage(&state).await;
        stages.push(segment_record);

        // ESTIMATE
        let mut poses = Vec::new();
        match segmentation {
            Some(segmentation) => {
                let (record, found) = self.estimate_stage(&state, &segmentation).await;
                stages.push(record);
                poses = found;
            }
            None => tracing::warn!("Segmentation failed, skipping pose estimation"),
        }

        // FINALIZE
        let error = self
            .finalize(&state, &tag, &stages, &poses, template_existed, assets, started_at, run_id)
            .await
            .err()
            .map(|e| e.to_string());

        tracing::info!(
            elapsed_ms = elapsed_ms(started),
            num_poses = poses.len(),
            success = error.is_none(),
            "Pipeline run finished"
        );

        PipelineResult {
            success: error.is_none(),
            output_dir: state.writer.as_ref().map(|w| w.dir().to_string_lossy().into_owned()),
            request_tag: tag,
            num_poses: poses.len(),
            pose_results: poses,
            stages,
            error,
        }
    }

    async fn render_object(&self, paths: &ObjectPaths, template_existed: bool, force: bool) -> RenderStatus {
        if template_existed && !force {
            tracing::info!(template_dir = %paths.template_dir.display(), "Templates already exist, skipping render");
            return RenderStatus::Skipped;
        }
        let request = RenderRequest {
            cad_path: self.config.remote_path(&paths.cad_path),
            output_dir: self.config.remote_path(&paths.template_dir),
        };
        match self.services.render(&request).await {
            Ok(response) => RenderStatus::Rendered(response),
            Err(e) => RenderStatus::Failed(e),
        }
    }

    async fn render_stage(&self, paths: &ObjectPaths, template_existed: bool, force: bool) -> StageRecord {
        let started = Instant::now();
        match self.render_object(paths, template_existed, force).await {
            RenderStatus::Skipped => StageRecord::skipped(StageKind::Render),
            RenderStatus::Rendered(_) => StageRecord::succeeded(StageKind::Render, elapsed_ms(started)),
            RenderStatus::Failed(e) => {
                tracing::warn!(error = %e, "Render failed, continuing with segmentation");
                StageRecord::failed(StageKind::Render, elapsed_ms(started), e.kind(), e.to_string())
            }
        }
    }

    /// Summaries of the template bundle and CAD asset, through the shared caches.
    async fn lookup_assets(&self, paths: &ObjectPaths) -> AssetInfo {
        let template = match self.registry.template(&paths.template_dir).await {
            Ok(bundle) => Some((*bundle).clone()),
            Err(e) => {
                tracing::warn!(error = %e, "Template bundle unavailable");
                None
            }
        };
        let cad = match self.registry.cad(&paths.cad_path).await {
            Ok(asset) => Some((*asset).clone()),
            Err(e) => {
                tracing::warn!(error = %e, "CAD asset unavailable");
                None
            }
        };
        AssetInfo { template, cad }
    }

    async fn probe(&self, stage: StageKind) {
        if let Err(e) = self.services.health(stage).await {
            tracing::warn!(stage = %stage, error = %e, "Health probe failed, sending request anyway");
        }
    }

    /// `<output>/<name>` as the remote service sees it, only for `full` runs.
    async fn remote_stage_dir(&self, state: &RunState<'_>, name: &str) -> Option<String> {
        let writer = state.full_writer()?;
        match writer.stage_dir(name).await {
            Ok(dir) => Some(self.config.remote_path(&dir)),
            Err(e) => {
                tracing::warn!(error = %e, "Cannot create stage output directory");
                None
            }
        }
    }

    async fn segment_stage(&self, state: &RunState<'_>) -> (StageRecord, Option<SegmentResponse>) {
        let started = Instant::now();
        let request = SegmentRequest {
            rgb_image: state.request.rgb_image.clone(),
            depth_image: state.request.depth_image.clone(),
            cam_params: state.request.cam_params.clone(),
            template_dir: self.config.remote_path(&state.paths.template_dir),
            cad_path: self.config.remote_path(&state.paths.cad_path),
            output_dir: self.remote_stage_dir(state, SEGMENT_DIR).await,
        };

        self.probe(StageKind::Segment).await;
        match self.services.segment(&request).await {
            Ok(response) => {
                let count = response.raw_detection_count();
                tracing::info!(num_detections = count, "Segmentation finished");
                if let Some(writer) = state.full_writer() {
                    if let Err(e) = writer.save_response(SEGMENT_RESPONSE_FILE, &response).await {
                        tracing::warn!(error = %e, "Failed to save segmentation response");
                    }
                }
                let record = StageRecord::succeeded(StageKind::Segment, elapsed_ms(started))
                    .with_detections(count)
                    .with_inference_time(response.inference_time);
                (record, Some(response))
            }
            Err(e) => {
                tracing::error!(error = %e, kind = e.kind(), "Segmentation failed");
                (
                    StageRecord::failed(StageKind::Segment, elapsed_ms(started), e.kind(), e.to_string()),
                    None,
                )
            }
        }
    }

    /// Image size for bbox masks: the RGB header first, then the camera parameters.
    fn image_dims(&self, request: &PipelineRequest) -> Option<ImageDims> {
        let from_header = image_io::decode_base64(&request.rgb_image)
            .and_then(|bytes| image_io::image_dimensions(&bytes))
            .map_err(|e| tracing::warn!(error = %e, "Failed to infer image shape from RGB payload"))
            .ok();
        from_header
            .or_else(|| request.cam_params.dimensions())
            .map(|(w, h)| ImageDims::new(w, h))
    }

    async fn estimate_stage(&self, state: &RunState<'_>, segmentation: &SegmentResponse) -> (StageRecord, Vec<PoseEntry>) {
        let started = Instant::now();
        let raw = parse_raw_detections(&segmentation.detections);
        let detections = self.adapter.adapt(raw, self.image_dims(state.request));
        if detections.is_empty() {
            tracing::warn!("No usable detections, pose estimation not called");
            let record = StageRecord::failed(
                StageKind::Estimate,
                elapsed_ms(started),
                "data_shape",
                "No usable detections in segmentation result",
            );
            return (record, Vec::new());
        }

        let num_detections = detections.len();
        let request = EstimateRequest {
            rgb_image: state.request.rgb_image.clone(),
            depth_image: state.request.depth_image.clone(),
            cam_params: state.request.cam_params.clone(),
            cad_path: self.config.remote_path(&state.paths.cad_path),
            template_dir: self.config.remote_path(&state.paths.template_dir),
            seg_data: detections,
            det_score_thresh: self.config.det_score_thresh,
            frame_guess: state.request.frame_guess.then_some(true),
            output_dir: self.remote_stage_dir(state, ESTIMATE_DIR).await,
        };

        self.probe(StageKind::Estimate).await;
        match self.services.estimate(&request).await {
            Ok(response) => {
                if let Some(writer) = state.full_writer() {
                    if let Err(e) = writer.save_response(ESTIMATE_RESPONSE_FILE, &response).await {
                        tracing::warn!(error = %e, "Failed to save pose response");
                    }
                }
                let poses = summarize_poses(&response.pose_scores, &response.pred_rot, &response.pred_trans);
                tracing::info!(num_detections, num_poses = poses.len(), "Pose estimation finished");
                let record = StageRecord::succeeded(StageKind::Estimate, elapsed_ms(started))
                    .with_detections(num_detections)
                    .with_inference_time(response.inference_time);
                (record, poses)
            }
            Err(e) => {
                tracing::error!(error = %e, kind = e.kind(), "Pose estimation failed");
                (
                    StageRecord::failed(StageKind::Estimate, elapsed_ms(started), e.kind(), e.to_string())
                        .with_detections(num_detections),
                    Vec::new(),
                )
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn finalize(
        &self,
        state: &RunState<'_>,
        tag: &str,
        stages: &[StageRecord],
        poses: &[PoseEntry],
        template_existed: bool,
        assets: AssetInfo,
        started_at: chrono::DateTime<Local>,
        run_id: Uuid,
    ) -> Result<()> {
        let Some(writer) = &state.writer else {
            return Ok(());
        };

        if state.mode.persists_all() {
            let end_time = Local::now();
            let duration = (end_time - started_at).num_milliseconds() as f64 / 1000.0;
            let metadata = RunMetadata {
                run_id: run_id.to_string(),
                pipeline_info: PipelineInfo {
                    start_time: started_at,
                    end_time,
                    duration_seconds: duration,
                    success: true,
                    error: None,
                },
                request_info: RequestInfo {
                    class_name: state.request.class_name.clone(),
                    object_name: state.request.object_name.clone(),
                    cad_path: state.paths.cad_path.to_string_lossy().into_owned(),
                    template_dir: state.paths.template_dir.to_string_lossy().into_owned(),
                    template_existed,
                    request_tag: tag.to_string(),
                    output_mode: state.mode.to_string(),
                },
                camera_info: CameraInfo::from_params(&state.request.cam_params),
                assets,
                pipeline_steps: PipelineSteps::from_records(stages),
            };
            writer.save_metadata(&metadata).await?;
        }

        writer.save_pose_results(true, poses, None).await?;
        Ok(())
    }

    /// Captures one frame from the capture service and runs the pipeline on it.
    pub async fn run_from_camera(&self, request: CaptureRequest) -> PipelineResult {
        let tag = normalize_tag(request.request_tag.as_deref(), DEFAULT_CAPTURE_TAG);
        if let Err(e) = self.resolve_object(&request.class_name, &request.object_name) {
            return PipelineResult::failed(tag, e.to_string());
        }

        let base_url = resolve_base_url(
            request.base.as_deref(),
            request.host.as_deref(),
            request.port,
            &self.config.camera.host,
            self.config.camera.port,
        );
        tracing::info!(base_url = %base_url, align_color = request.align_color, "Capturing from camera");
        let camera = CameraClient::new(base_url, self.config.camera.timeout);

        let frame = match capture_frame(&camera, request.align_color, &self.aligner).await {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!(error = %e, "Camera capture failed");
                return PipelineResult::failed(tag, format!("Camera capture failed: {}", e));
            }
        };

        let mode = OutputMode::resolve(request.output_mode.as_deref(), request.save_outputs);
        let output_dir = plan_output_dir(mode, request.output_dir.as_deref(), &self.config.paths.output_root, &tag)
            .map(|dir| dir.to_string_lossy().into_owned());

        let run = PipelineRequest {
            class_name: request.class_name,
            object_name: request.object_name,
            rgb_image: frame.rgb_image,
            depth_image: frame.depth_image,
            cam_params: frame.cam_params,
            output_dir,
            frame_guess: request.frame_guess,
            save_outputs: None,
            output_mode: Some(mode.as_str().to_string()),
            request_tag: Some(tag),
            force_render: request.force_render,
        };
        self.run_with_default_tag(run, DEFAULT_CAPTURE_TAG).await
    }

    /// Renders templates for several objects of one class, one after another.
    pub async fn render_templates(&self, class_name: &str, object_names: &[String], force: bool) -> RenderTemplatesReport {
        let mut results = Vec::with_capacity(object_names.len());
        for object_name in object_names {
            results.push(self.render_one(class_name, object_name, force).await);
        }
        let report = RenderTemplatesReport::from_outcomes(results);
        tracing::info!(
            class_name,
            total = report.total,
            successful = report.successful,
            "Batch template rendering finished"
        );
        report
    }

    async fn render_one(&self, class_name: &str, object_name: &str, force: bool) -> RenderOutcome {
        let failed = |error: String| RenderOutcome {
            object_name: object_name.to_string(),
            success: false,
            skipped: false,
            templates_generated: None,
            error: Some(error),
        };

        let paths = match self.resolve_object(class_name, object_name) {
            Ok(paths) => paths,
            Err(PipelineError::Validation(msg)) => return failed(msg),
            Err(e) => return failed(e.to_string()),
        };
        let template_existed = template_dir_exists(&paths.template_dir).await;

        match self.render_object(&paths, template_existed, force).await {
            RenderStatus::Skipped => RenderOutcome {
                object_name: object_name.to_string(),
                success: true,
                skipped: true,
                templates_generated: None,
                error: None,
            },
            RenderStatus::Rendered(response) => RenderOutcome {
                object_name: object_name.to_string(),
                success: true,
                skipped: false,
                templates_generated: response.templates_generated,
                error: None,
            },
            RenderStatus::Failed(e) => {
                tracing::warn!(object_name, error = %e, "Template rendering failed");
                failed(e.to_string())
            }
        }
    }
}

async fn template_dir_exists(dir: &Path) -> bool {
    tokio::fs::metadata(dir).await.map(|m| m.is_dir()).unwrap_or(false)
}
