//! The render, segmentation and pose services behind one async trait.

use std::time::Duration;

use async_trait::async_trait;
use common::StageKind;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{RemoteError, Result};
use crate::progress::ProgressMonitor;
use crate::types::{
    EstimateRequest, EstimateResponse, RenderRequest, RenderResponse, SegmentRequest, SegmentResponse, ServiceReply,
};

/// The three remote stages as seen by the orchestrator. Tests substitute an
/// in-process implementation.
#[async_trait]
pub trait InferenceServices: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<RenderResponse>;

    async fn segment(&self, request: &SegmentRequest) -> Result<SegmentResponse>;

    async fn estimate(&self, request: &EstimateRequest) -> Result<EstimateResponse>;

    /// Liveness probe for a stage's service.
    async fn health(&self, stage: StageKind) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoints {
    pub render_url: String,
    pub segment_url: String,
    pub estimate_url: String,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            render_url: "http://localhost:8004".to_string(),
            segment_url: "http://localhost:8002".to_string(),
            estimate_url: "http://localhost:8003".to_string(),
        }
    }
}

impl ServiceEndpoints {
    pub fn base_url(&self, stage: StageKind) -> &str {
        match stage {
            StageKind::Render => &self.render_url,
            StageKind::Segment => &self.segment_url,
            StageKind::Estimate => &self.estimate_url,
        }
    }

    pub fn health_url(&self, stage: StageKind) -> String {
        let path = match stage {
            StageKind::Estimate => "/api/v1/health",
            StageKind::Render | StageKind::Segment => "/health",
        };
        format!("{}{}", self.base_url(stage).trim_end_matches('/'), path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub render: Duration,
    /// How long the render service itself is asked to wait for completion.
    pub render_wait: Duration,
    pub segment: Duration,
    pub estimate: Duration,
    pub health: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            render: Duration::from_secs(3720),
            render_wait: Duration::from_secs(3600),
            segment: Duration::from_secs(600),
            estimate: Duration::from_secs(900),
            health: Duration::from_secs(5),
        }
    }
}

impl StageTimeouts {
    pub fn for_stage(&self, stage: StageKind) -> Duration {
        match stage {
            StageKind::Render => self.render,
            StageKind::Segment => self.segment,
            StageKind::Estimate => self.estimate,
        }
    }
}

/// reqwest-backed [`InferenceServices`].
#[derive(Debug, Clone)]
pub struct HttpInferenceClient {
    http: reqwest::Client,
    endpoints: ServiceEndpoints,
    timeouts: StageTimeouts,
    progress_interval: Duration,
}

impl HttpInferenceClient {
    pub fn new(endpoints: ServiceEndpoints, timeouts: StageTimeouts) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoints,
            timeouts,
            progress_interval: crate::progress::DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn endpoints(&self) -> &ServiceEndpoints {
        &self.endpoints
    }

    pub fn timeouts(&self) -> &StageTimeouts {
        &self.timeouts
    }

    /// POSTs `body` as JSON and decodes a [`ServiceReply`].
    ///
    /// # Errors
    /// - [`RemoteError::Timeout`] / [`RemoteError::Connect`] for transport failures
    /// - [`RemoteError::Protocol`] for a non-2xx status (body truncated)
    /// - [`RemoteError::Decode`] when the body is not the expected JSON
    /// - [`RemoteError::Service`] for a 2xx answer with `success: false`
    async fn post_json<B, R>(&self, stage: StageKind, url: &str, body: &B, timeout: Duration) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned + ServiceReply,
    {
        let service = stage.as_str();
        tracing::info!(service, url, timeout_secs = timeout.as_secs(), "Sending request");

        let monitor = ProgressMonitor::with_interval(service, timeout, self.progress_interval);
        let started = std::time::Instant::now();
        let outcome = self.send(service, url, body, timeout).await;
        monitor.stop().await;

        let text = match outcome {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(service, elapsed_ms = started.elapsed().as_millis() as u64, error = %e, "Request failed");
                return Err(e);
            }
        };
        tracing::info!(service, elapsed_ms = started.elapsed().as_millis() as u64, "Response received");

        let reply: R = serde_json::from_str(&text).map_err(|e| RemoteError::Decode {
            service: service.to_string(),
            message: e.to_string(),
        })?;
        if !reply.succeeded() {
            return Err(RemoteError::Service {
                service: service.to_string(),
                message: reply
                    .failure_message()
                    .unwrap_or("service reported failure without a message")
                    .to_string(),
            });
        }
        Ok(reply)
    }

    async fn send<B: Serialize + Sync>(&self, service: &str, url: &str, body: &B, timeout: Duration) -> Result<String> {
        let response = self
            .http
            .post(url)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| RemoteError::from_reqwest(service, timeout, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RemoteError::from_reqwest(service, timeout, e))?;
        if !status.is_success() {
            return Err(RemoteError::protocol(service, status, &text));
        }
        Ok(text)
    }
}

#[async_trait]
impl InferenceServices for HttpInferenceClient {
    async fn render(&self, request: &RenderRequest) -> Result<RenderResponse> {
        let url = format!(
            "{}/render/templates?wait=true&wait_timeout_sec={}",
            self.endpoints.render_url.trim_end_matches('/'),
            self.timeouts.render_wait.as_secs()
        );
        self.post_json(StageKind::Render, &url, request, self.timeouts.render).await
    }

    async fn segment(&self, request: &SegmentRequest) -> Result<SegmentResponse> {
        let url = format!("{}/api/v1/inference", self.endpoints.segment_url.trim_end_matches('/'));
        self.post_json(StageKind::Segment, &url, request, self.timeouts.segment).await
    }

    async fn estimate(&self, request: &EstimateRequest) -> Result<EstimateResponse> {
        let url = format!("{}/api/v1/pose-estimation", self.endpoints.estimate_url.trim_end_matches('/'));
        self.post_json(StageKind::Estimate, &url, request, self.timeouts.estimate).await
    }

    async fn health(&self, stage: StageKind) -> Result<()> {
        let url = self.endpoints.health_url(stage);
        let service = stage.as_str();
        let response = self
            .http
            .get(&url)
            .timeout(self.timeouts.health)
            .send()
            .await
            .map_err(|e| RemoteError::from_reqwest(service, self.timeouts.health, e))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(RemoteError::protocol(service, status, &body))
        }
    }
}
