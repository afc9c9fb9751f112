//! Configuration for the estimation server.
//!
//! Sources, lowest priority first:
//! - built-in defaults
//! - TOML config file
//! - legacy `MAIN_SERVER_SAVE_*` environment switches
//! - CLI arguments and their `ESTIMATION_*` environment variables

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::builder::BoolishValueParser;
use clap::Parser;
use estimation_api::ApiConfig;
use estimation_pipeline::{
    CameraDefaults, PathMapping, PersistenceSwitches, PipelineConfig, StaticPaths, DEFAULT_DET_SCORE_THRESH,
};
use estimation_remote::{ServiceEndpoints, StageTimeouts, DEFAULT_CAMERA_HOST, DEFAULT_CAMERA_PORT};
use serde::{Deserialize, Serialize};

/// Command-line arguments. Every option can also come from its environment variable.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "estimation-server")]
#[command(about = "Pose-estimation pipeline server: render, segment and estimate over HTTP")]
#[command(version)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(long, short = 'c', default_value = "estimation.toml", env = "ESTIMATION_CONFIG")]
    pub config: PathBuf,

    #[arg(long, env = "ESTIMATION_HOST")]
    pub host: Option<String>,

    #[arg(long, short = 'p', env = "ESTIMATION_PORT")]
    pub port: Option<u16>,

    /// Root holding `meshes/`, `templates/` and `output/`
    #[arg(long, env = "ESTIMATION_STATIC_ROOT")]
    pub static_root: Option<PathBuf>,

    #[arg(long, env = "ESTIMATION_RENDER_URL")]
    pub render_url: Option<String>,

    #[arg(long, env = "ESTIMATION_SEGMENT_URL")]
    pub segment_url: Option<String>,

    #[arg(long, env = "ESTIMATION_ESTIMATE_URL")]
    pub estimate_url: Option<String>,

    /// Detections forwarded to pose estimation
    #[arg(long, env = "ESTIMATION_TOP_K")]
    pub top_k: Option<usize>,

    #[arg(long, env = "ESTIMATION_DET_SCORE_THRESH")]
    pub det_score_thresh: Option<f64>,

    /// Fill the asset caches at startup
    #[arg(long, env = "ESTIMATION_PRELOAD", num_args = 0..=1, default_missing_value = "true", value_parser = BoolishValueParser::new())]
    pub preload: Option<bool>,

    /// Restrict preload to these classes (comma separated)
    #[arg(long, env = "ESTIMATION_PRELOAD_CLASSES", value_delimiter = ',')]
    pub preload_classes: Vec<String>,

    #[arg(long, env = "ESTIMATION_SAVE_INPUT_IMAGES", value_parser = BoolishValueParser::new())]
    pub save_input_images: Option<bool>,

    #[arg(long, env = "ESTIMATION_SAVE_SERVER_RESPONSES", value_parser = BoolishValueParser::new())]
    pub save_server_responses: Option<bool>,

    #[arg(long, env = "ESTIMATION_SAVE_CAMERA_PARAMS", value_parser = BoolishValueParser::new())]
    pub save_camera_params: Option<bool>,

    #[arg(long, env = "ESTIMATION_CAMERA_HOST")]
    pub camera_host: Option<String>,

    #[arg(long, env = "ESTIMATION_CAMERA_PORT")]
    pub camera_port: Option<u16>,
}

/// Full server configuration (merged from all sources).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub http: HttpConfig,
    pub paths: PathsConfig,
    pub services: ServicesConfig,
    pub timeouts: TimeoutsConfig,
    pub cache: CacheConfig,
    pub detection: DetectionConfig,
    pub persistence: PersistenceConfig,
    pub camera: CameraConfig,
    pub path_mapping: Option<PathMappingConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub static_root: PathBuf,
    /// Overrides `<static_root>/meshes`
    pub meshes: Option<PathBuf>,
    /// Overrides `<static_root>/templates`
    pub templates: Option<PathBuf>,
    /// Overrides `<static_root>/output`
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServicesConfig {
    pub render_url: String,
    pub segment_url: String,
    pub estimate_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub render_secs: u64,
    pub render_wait_secs: u64,
    pub segment_secs: u64,
    pub estimate_secs: u64,
    pub health_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub template_capacity: usize,
    pub cad_capacity: usize,
    pub preload: bool,
    /// Empty means every class under the templates root.
    pub preload_classes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub top_k: usize,
    pub det_score_thresh: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub save_input_images: bool,
    pub save_server_responses: bool,
    pub save_camera_params: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub host: String,
    pub port: u16,
    pub timeout_secs: u64,
}

/// Paths under `host_root` are sent to the services under `remote_root`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathMappingConfig {
    pub host_root: PathBuf,
    pub remote_root: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let endpoints = ServiceEndpoints::default();
        let timeouts = StageTimeouts::default();
        let persistence = PersistenceSwitches::default();
        Self {
            http: HttpConfig {
                host: "0.0.0.0".to_string(),
                port: 8001,
                cors_origins: vec!["*".to_string()],
            },
            paths: PathsConfig {
                static_root: PathBuf::from("static"),
                meshes: None,
                templates: None,
                output: None,
            },
            services: ServicesConfig {
                render_url: endpoints.render_url,
                segment_url: endpoints.segment_url,
                estimate_url: endpoints.estimate_url,
            },
            timeouts: TimeoutsConfig {
                render_secs: timeouts.render.as_secs(),
                render_wait_secs: timeouts.render_wait.as_secs(),
                segment_secs: timeouts.segment.as_secs(),
                estimate_secs: timeouts.estimate.as_secs(),
                health_secs: timeouts.health.as_secs(),
            },
            cache: CacheConfig {
                template_capacity: 32,
                cad_capacity: 64,
                preload: false,
                preload_classes: Vec::new(),
            },
            detection: DetectionConfig {
                top_k: PipelineConfig::default().top_k,
                det_score_thresh: DEFAULT_DET_SCORE_THRESH,
            },
            persistence: PersistenceConfig {
                save_input_images: persistence.save_input_images,
                save_server_responses: persistence.save_server_responses,
                save_camera_params: persistence.save_camera_params,
            },
            camera: CameraConfig {
                host: DEFAULT_CAMERA_HOST.to_string(),
                port: DEFAULT_CAMERA_PORT,
                timeout_secs: 10,
            },
            path_mapping: None,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        ServerConfig::default().http
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        ServerConfig::default().paths
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        ServerConfig::default().services
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        ServerConfig::default().timeouts
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        ServerConfig::default().cache
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        ServerConfig::default().detection
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        ServerConfig::default().persistence
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        ServerConfig::default().camera
    }
}

/// `1/true/yes/on` and `0/false/no/off`, case-insensitive.
pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl ServerConfig {
    /// Load configuration from CLI args, the process environment and the config file.
    ///
    /// A missing config file is not an error; an unreadable or invalid one is.
    pub fn load(args: &CliArgs) -> Result<Self> {
        let mut config = if args.config.exists() {
            Self::from_file(&args.config)?
        } else {
            Self::default()
        };
        config.apply_legacy_env(|name| std::env::var(name).ok());
        config.apply_args(args);
        Ok(config)
    }

    /// Load configuration from a TOML file; absent keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&contents).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Honours the `MAIN_SERVER_SAVE_*` switches. Unparseable values are ignored.
    pub fn apply_legacy_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let flag = |name: &str| lookup(name).as_deref().and_then(parse_bool_flag);
        if let Some(v) = flag("MAIN_SERVER_SAVE_INPUT_IMAGES") {
            self.persistence.save_input_images = v;
        }
        if let Some(v) = flag("MAIN_SERVER_SAVE_SERVER_RESPONSES") {
            self.persistence.save_server_responses = v;
        }
        if let Some(v) = flag("MAIN_SERVER_SAVE_CAMERA_PARAMS") {
            self.persistence.save_camera_params = v;
        }
    }

    /// CLI args (highest priority).
    pub fn apply_args(&mut self, args: &CliArgs) {
        if let Some(host) = &args.host {
            self.http.host = host.clone();
        }
        if let Some(port) = args.port {
            self.http.port = port;
        }
        if let Some(root) = &args.static_root {
            self.paths.static_root = root.clone();
        }
        if let Some(url) = &args.render_url {
            self.services.render_url = url.clone();
        }
        if let Some(url) = &args.segment_url {
            self.services.segment_url = url.clone();
        }
        if let Some(url) = &args.estimate_url {
            self.services.estimate_url = url.clone();
        }
        if let Some(k) = args.top_k {
            self.detection.top_k = k;
        }
        if let Some(thresh) = args.det_score_thresh {
            self.detection.det_score_thresh = thresh;
        }
        if let Some(preload) = args.preload {
            self.cache.preload = preload;
        }
        if !args.preload_classes.is_empty() {
            self.cache.preload_classes = args.preload_classes.clone();
        }
        if let Some(v) = args.save_input_images {
            self.persistence.save_input_images = v;
        }
        if let Some(v) = args.save_server_responses {
            self.persistence.save_server_responses = v;
        }
        if let Some(v) = args.save_camera_params {
            self.persistence.save_camera_params = v;
        }
        if let Some(host) = &args.camera_host {
            self.camera.host = host.clone();
        }
        if let Some(port) = args.camera_port {
            self.camera.port = port;
        }
    }

    pub fn static_paths(&self) -> StaticPaths {
        let defaults = StaticPaths::under(&self.paths.static_root);
        StaticPaths {
            meshes_root: self.paths.meshes.clone().unwrap_or(defaults.meshes_root),
            templates_root: self.paths.templates.clone().unwrap_or(defaults.templates_root),
            output_root: self.paths.output.clone().unwrap_or(defaults.output_root),
        }
    }

    pub fn endpoints(&self) -> ServiceEndpoints {
        ServiceEndpoints {
            render_url: self.services.render_url.clone(),
            segment_url: self.services.segment_url.clone(),
            estimate_url: self.services.estimate_url.clone(),
        }
    }

    pub fn stage_timeouts(&self) -> StageTimeouts {
        StageTimeouts {
            render: Duration::from_secs(self.timeouts.render_secs),
            render_wait: Duration::from_secs(self.timeouts.render_wait_secs),
            segment: Duration::from_secs(self.timeouts.segment_secs),
            estimate: Duration::from_secs(self.timeouts.estimate_secs),
            health: Duration::from_secs(self.timeouts.health_secs),
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            paths: self.static_paths(),
            path_mapping: self
                .path_mapping
                .as_ref()
                .map(|m| PathMapping::new(m.host_root.clone(), m.remote_root.clone())),
            top_k: self.detection.top_k,
            det_score_thresh: self.detection.det_score_thresh,
            persistence: PersistenceSwitches {
                save_input_images: self.persistence.save_input_images,
                save_server_responses: self.persistence.save_server_responses,
                save_camera_params: self.persistence.save_camera_params,
            },
            camera: CameraDefaults {
                host: self.camera.host.clone(),
                port: self.camera.port,
                timeout: Duration::from_secs(self.camera.timeout_secs),
            },
            ..Default::default()
        }
    }

    pub fn api_config(&self) -> ApiConfig {
        ApiConfig {
            host: self.http.host.clone(),
            port: self.http.port,
            enable_cors: !self.http.cors_origins.is_empty(),
            cors_origins: self.http.cors_origins.clone(),
        }
    }
}
