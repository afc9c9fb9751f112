//! Pipeline stage bookkeeping and the result returned to callers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::pose::PoseEntry;

/// Which artifacts a run persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Inputs, per-stage responses, metadata and pose summary.
    #[default]
    Full,
    /// Only `pose_results.json`.
    ResultsOnly,
    /// Nothing is written.
    None,
}

impl OutputMode {
    /// Resolves the requested mode.
    ///
    /// Unknown strings fall back to `Full`. Without an explicit mode the legacy
    /// `save_outputs` flag decides between `Full` (true or absent) and `None`.
    pub fn resolve(mode: Option<&str>, save_outputs: Option<bool>) -> Self {
        match mode.map(|m| m.trim().to_ascii_lowercase()) {
            Some(m) => match m.as_str() {
                "results_only" | "results-only" | "resultsonly" => Self::ResultsOnly,
                "none" => Self::None,
                _ => Self::Full,
            },
            None if save_outputs == Some(false) => Self::None,
            None => Self::Full,
        }
    }

    pub fn persists_all(self) -> bool {
        self == Self::Full
    }

    pub fn persists_summary(self) -> bool {
        matches!(self, Self::Full | Self::ResultsOnly)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::ResultsOnly => "results_only",
            Self::None => "none",
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three remote stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Render,
    Segment,
    Estimate,
}

impl StageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Render => "render",
            Self::Segment => "segment",
            Self::Estimate => "estimate",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one stage of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageKind,
    pub success: bool,
    #[serde(default)]
    pub skipped: bool,
    pub elapsed_ms: u64,
    /// Error class (`timeout`, `connect`, `protocol`, `decode`, `service`, `data_shape`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_detections: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference_time: Option<f64>,
}

impl StageRecord {
    pub fn succeeded(stage: StageKind, elapsed_ms: u64) -> Self {
        Self {
            stage,
            success: true,
            skipped: false,
            elapsed_ms,
            error_kind: None,
            error: None,
            num_detections: None,
            inference_time: None,
        }
    }

    pub fn skipped(stage: StageKind) -> Self {
        Self {
            skipped: true,
            ..Self::succeeded(stage, 0)
        }
    }

    pub fn failed(stage: StageKind, elapsed_ms: u64, kind: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            error_kind: Some(kind.to_string()),
            error: Some(error.into()),
            ..Self::succeeded(stage, elapsed_ms)
        }
    }

    pub fn with_detections(mut self, n: usize) -> Self {
        self.num_detections = Some(n);
        self
    }

    pub fn with_inference_time(mut self, seconds: Option<f64>) -> Self {
        self.inference_time = seconds;
        self
    }
}

/// Structured result of one pipeline run. Always returned, even when stages fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub success: bool,
    pub output_dir: Option<String>,
    pub request_tag: String,
    pub pose_results: Vec<PoseEntry>,
    pub num_poses: usize,
    pub stages: Vec<StageRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineResult {
    /// A run that could not start (or could not be finalized).
    pub fn failed(request_tag: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output_dir: None,
            request_tag: request_tag.into(),
            pose_results: Vec::new(),
            num_poses: 0,
            stages: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn stage(&self, kind: StageKind) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.stage == kind)
    }
}
