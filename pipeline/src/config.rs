//! Orchestrator configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use estimation_remote::{DEFAULT_CAMERA_HOST, DEFAULT_CAMERA_PORT, DEFAULT_CAMERA_TIMEOUT};
use estimation_vision::{DEFAULT_TOP_K, DEFAULT_UNITS_PER_METER};

/// Score threshold forwarded to the pose service.
pub const DEFAULT_DET_SCORE_THRESH: f64 = 0.2;

/// Where meshes, rendered templates and run outputs live on this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticPaths {
    pub meshes_root: PathBuf,
    pub templates_root: PathBuf,
    pub output_root: PathBuf,
}

impl StaticPaths {
    /// `<root>/meshes`, `<root>/templates`, `<root>/output`.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            meshes_root: root.join("meshes"),
            templates_root: root.join("templates"),
            output_root: root.join("output"),
        }
    }

    pub fn template_dir(&self, class_name: &str, object_name: &str) -> PathBuf {
        self.templates_root.join(class_name).join(object_name)
    }
}

impl Default for StaticPaths {
    fn default() -> Self {
        Self::under("static")
    }
}

/// Rewrites host paths into the mount namespace of the remote services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapping {
    pub host_root: PathBuf,
    pub remote_root: PathBuf,
}

impl PathMapping {
    pub fn new(host_root: impl Into<PathBuf>, remote_root: impl Into<PathBuf>) -> Self {
        Self {
            host_root: host_root.into(),
            remote_root: remote_root.into(),
        }
    }

    /// Relative paths and roots are resolved against the working directory
    /// first. Paths outside `host_root` are passed through unchanged. Output
    /// always uses `/`.
    pub fn map(&self, path: &Path) -> String {
        let absolute = |p: &Path| std::path::absolute(p).unwrap_or_else(|_| p.to_path_buf());
        let mapped = match absolute(path).strip_prefix(absolute(&self.host_root)) {
            Ok(rel) => self.remote_root.join(rel),
            Err(_) => path.to_path_buf(),
        };
        mapped.to_string_lossy().replace('\\', "/")
    }
}

/// Which artifacts a `full` run writes besides the metadata and pose summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceSwitches {
    pub save_input_images: bool,
    pub save_server_responses: bool,
    pub save_camera_params: bool,
}

impl Default for PersistenceSwitches {
    fn default() -> Self {
        Self {
            save_input_images: true,
            save_server_responses: false,
            save_camera_params: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDefaults {
    pub host: String,
    pub port: u16,
    pub timeout: Duration,
}

impl Default for CameraDefaults {
    fn default() -> Self {
        Self {
            host: DEFAULT_CAMERA_HOST.to_string(),
            port: DEFAULT_CAMERA_PORT,
            timeout: DEFAULT_CAMERA_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub paths: StaticPaths,
    pub path_mapping: Option<PathMapping>,
    pub top_k: usize,
    pub det_score_thresh: f64,
    pub units_per_meter: f64,
    pub persistence: PersistenceSwitches,
    pub camera: CameraDefaults,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            paths: StaticPaths::default(),
            path_mapping: None,
            top_k: DEFAULT_TOP_K,
            det_score_thresh: DEFAULT_DET_SCORE_THRESH,
            units_per_meter: DEFAULT_UNITS_PER_METER,
            persistence: PersistenceSwitches::default(),
            camera: CameraDefaults::default(),
        }
    }
}

impl PipelineConfig {
    /// A path as the remote services should see it.
    pub fn remote_path(&self, path: &Path) -> String {
        match &self.path_mapping {
            Some(mapping) => mapping.map(path),
            None => path.to_string_lossy().replace('\\', "/"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_mapping() {
        let mapping = PathMapping::new("/srv/estimation", "/workspace/Estimation_Server");
        assert_eq!(
            mapping.map(Path::new("/srv/estimation/static/meshes/ycb/mug.ply")),
            "/workspace/Estimation_Server/static/meshes/ycb/mug.ply"
        );
        assert_eq!(mapping.map(Path::new("/elsewhere/x")), "/elsewhere/x");
    }

    #[test]
    fn test_path_mapping_resolves_relative_static_root() {
        let cwd = std::env::current_dir().unwrap();
        let config = PipelineConfig {
            path_mapping: Some(PathMapping::new(&cwd, "/workspace/Estimation_Server")),
            ..Default::default()
        };
        let template_dir = config.paths.template_dir("ycb", "mug");
        assert!(template_dir.is_relative());
        assert_eq!(
            config.remote_path(&template_dir),
            "/workspace/Estimation_Server/static/templates/ycb/mug"
        );
    }

    #[test]
    fn test_path_mapping_relative_host_root() {
        let mapping = PathMapping::new("static", "/data");
        assert_eq!(mapping.map(Path::new("static/meshes/ycb/mug.ply")), "/data/meshes/ycb/mug.ply");
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.top_k, 10);
        assert_eq!(config.det_score_thresh, 0.2);
        assert!(config.persistence.save_input_images);
        assert!(!config.persistence.save_server_responses);
        assert_eq!(config.paths.template_dir("ycb", "mug"), PathBuf::from("static/templates/ycb/mug"));
        assert_eq!(config.remote_path(Path::new("a/b")), "a/b");
    }
}
