//! Filesystem loaders for rendered template bundles and CAD meshes.

use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::error::{AssetError, Result};

/// CAD extensions in lookup order.
pub const CAD_EXTENSIONS: [&str; 3] = ["ply", "obj", "stl"];

/// Loads one asset from disk. Implementations must not touch any cache.
#[async_trait]
pub trait AssetLoader: Send + Sync {
    type Asset: Send + Sync + 'static;

    async fn load(&self, path: &Path) -> Result<Self::Asset>;
}

/// Summary of a rendered template directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateBundle {
    pub dir: PathBuf,
    pub mask_count: usize,
    pub rgb_count: usize,
    pub xyz_count: usize,
    pub total_files: usize,
    pub files: Vec<String>,
}

impl TemplateBundle {
    pub fn is_empty(&self) -> bool {
        self.total_files == 0
    }
}

/// Counts `mask_*.png`, `rgb_*.png` and `xyz_*.npy` files in a template directory.
#[derive(Debug, Default, Clone)]
pub struct TemplateDirLoader;

#[async_trait]
impl AssetLoader for TemplateDirLoader {
    type Asset = TemplateBundle;

    async fn load(&self, path: &Path) -> Result<TemplateBundle> {
        let mut entries = tokio::fs::read_dir(path)
            .await
            .map_err(|e| AssetError::io(path, e))?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| AssetError::io(path, e))? {
            let is_file = entry
                .file_type()
                .await
                .map(|t| t.is_file())
                .unwrap_or(false);
            if is_file {
                files.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        files.sort();

        let count = |prefix: &str, suffix: &str| {
            files
                .iter()
                .filter(|f| f.starts_with(prefix) && f.ends_with(suffix))
                .count()
        };

        Ok(TemplateBundle {
            dir: path.to_path_buf(),
            mask_count: count("mask_", ".png"),
            rgb_count: count("rgb_", ".png"),
            xyz_count: count("xyz_", ".npy"),
            total_files: files.len(),
            files,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CadFormat {
    Ply,
    Obj,
    Stl,
}

impl CadFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "ply" => Some(Self::Ply),
            "obj" => Some(Self::Obj),
            "stl" => Some(Self::Stl),
            _ => None,
        }
    }
}

/// A CAD mesh reduced to its vertex count, bounds and a strided point sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CadAsset {
    pub path: PathBuf,
    pub format: CadFormat,
    pub byte_size: u64,
    pub vertex_count: usize,
    pub bounds: Option<([f32; 3], [f32; 3])>,
    #[serde(skip)]
    pub sample_points: Vec<[f32; 3]>,
}

/// Parses PLY (ascii header + ascii or binary body), OBJ and STL meshes.
#[derive(Debug, Clone)]
pub struct CadFileLoader {
    max_samples: usize,
}

impl Default for CadFileLoader {
    fn default() -> Self {
        Self { max_samples: 2048 }
    }
}

impl CadFileLoader {
    pub fn new(max_samples: usize) -> Self {
        Self {
            max_samples: max_samples.max(1),
        }
    }
}

#[async_trait]
impl AssetLoader for CadFileLoader {
    type Asset = CadAsset;

    async fn load(&self, path: &Path) -> Result<CadAsset> {
        let format = CadFormat::from_path(path)
            .ok_or_else(|| AssetError::UnsupportedFormat(path.display().to_string()))?;
        let bytes = tokio::fs::read(path).await.map_err(|e| AssetError::io(path, e))?;

        let owned = path.to_path_buf();
        let max_samples = self.max_samples;
        tokio::task::spawn_blocking(move || parse_mesh(owned, format, &bytes, max_samples))
            .await
            .map_err(|e| AssetError::Task(e.to_string()))?
    }
}

fn parse_mesh(path: PathBuf, format: CadFormat, bytes: &[u8], max_samples: usize) -> Result<CadAsset> {
    let (vertex_count, points) = match format {
        CadFormat::Ply => parse_ply(&path, bytes)?,
        CadFormat::Obj => {
            let points = parse_text_vertices(bytes, "v");
            (points.len(), points)
        }
        CadFormat::Stl => parse_stl(&path, bytes)?,
    };

    Ok(CadAsset {
        byte_size: bytes.len() as u64,
        bounds: bounds(&points),
        sample_points: stride_sample(points, max_samples),
        vertex_count,
        format,
        path,
    })
}

fn malformed(path: &Path, reason: impl Into<String>) -> AssetError {
    AssetError::Malformed {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

fn parse_ply(path: &Path, bytes: &[u8]) -> Result<(usize, Vec<[f32; 3]>)> {
    const END: &[u8] = b"end_header";
    let header_end = bytes
        .windows(END.len())
        .position(|w| w == END)
        .ok_or_else(|| malformed(path, "missing end_header"))?;
    let header = String::from_utf8_lossy(&bytes[..header_end]);
    if !header.starts_with("ply") {
        return Err(malformed(path, "missing ply magic"));
    }

    let mut format = "";
    let mut vertex_count = None;
    for line in header.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            ["format", f, ..] => format = *f,
            ["element", "vertex", n] => vertex_count = n.parse::<usize>().ok(),
            _ => {}
        }
    }
    let vertex_count = vertex_count.ok_or_else(|| malformed(path, "missing vertex element"))?;

    // Binary bodies are not decoded; the header count is enough for metadata.
    if format != "ascii" {
        return Ok((vertex_count, Vec::new()));
    }

    let body_start = bytes[header_end..]
        .iter()
        .position(|&b| b == b'\n')
        .map(|p| header_end + p + 1)
        .unwrap_or(bytes.len());
    let body = String::from_utf8_lossy(&bytes[body_start..]);
    let points = body
        .lines()
        .take(vertex_count)
        .filter_map(parse_xyz)
        .collect();
    Ok((vertex_count, points))
}

fn parse_stl(path: &Path, bytes: &[u8]) -> Result<(usize, Vec<[f32; 3]>)> {
    let looks_ascii = bytes.starts_with(b"solid")
        && bytes.windows(5).take(4096).any(|w| w == b"facet");
    if looks_ascii {
        let points = parse_text_vertices(bytes, "vertex");
        return Ok((points.len(), points));
    }

    if bytes.len() < 84 {
        return Err(malformed(path, "binary STL shorter than header"));
    }
    let triangles = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]) as usize;
    let expected = 84 + triangles * 50;
    if bytes.len() < expected {
        return Err(malformed(
            path,
            format!("binary STL truncated: {} triangles need {} bytes, got {}", triangles, expected, bytes.len()),
        ));
    }

    let read_f32 = |at: usize| f32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
    let mut points = Vec::with_capacity(triangles * 3);
    for t in 0..triangles {
        // 12 bytes of normal precede the three vertices
        let base = 84 + t * 50 + 12;
        for v in 0..3 {
            let at = base + v * 12;
            points.push([read_f32(at), read_f32(at + 4), read_f32(at + 8)]);
        }
    }
    Ok((points.len(), points))
}

fn parse_text_vertices(bytes: &[u8], keyword: &str) -> Vec<[f32; 3]> {
    String::from_utf8_lossy(bytes)
        .lines()
        .filter_map(|line| {
            let line = line.trim_start();
            let rest = line.strip_prefix(keyword)?;
            rest.starts_with(char::is_whitespace).then(|| parse_xyz(rest)).flatten()
        })
        .collect()
}

fn parse_xyz(line: &str) -> Option<[f32; 3]> {
    let mut it = line.split_whitespace().map(|t| t.parse::<f32>());
    match (it.next(), it.next(), it.next()) {
        (Some(Ok(x)), Some(Ok(y)), Some(Ok(z))) => Some([x, y, z]),
        _ => None,
    }
}

fn bounds(points: &[[f32; 3]]) -> Option<([f32; 3], [f32; 3])> {
    let first = *points.first()?;
    Some(points.iter().fold((first, first), |(mut lo, mut hi), p| {
        for i in 0..3 {
            lo[i] = lo[i].min(p[i]);
            hi[i] = hi[i].max(p[i]);
        }
        (lo, hi)
    }))
}

fn stride_sample(points: Vec<[f32; 3]>, max_samples: usize) -> Vec<[f32; 3]> {
    if points.len() <= max_samples {
        return points;
    }
    let step = points.len().div_ceil(max_samples);
    points.into_iter().step_by(step).collect()
}

/// Finds `<meshes_root>/<class>/<object>.{ply,obj,stl}`, first existing wins.
pub fn find_cad_file(meshes_root: &Path, class_name: &str, object_name: &str) -> Option<PathBuf> {
    let dir = meshes_root.join(class_name);
    CAD_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", object_name, ext)))
        .find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_dir() -> TempDir {
        TempDir::new().unwrap()
    }

    #[tokio::test]
    async fn test_template_counts() {
        let dir = create_test_dir();
        for name in ["mask_0.png", "mask_1.png", "rgb_0.png", "xyz_0.npy", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let bundle = TemplateDirLoader.load(dir.path()).await.unwrap();
        assert_eq!(bundle.mask_count, 2);
        assert_eq!(bundle.rgb_count, 1);
        assert_eq!(bundle.xyz_count, 1);
        assert_eq!(bundle.total_files, 5);
        assert_eq!(bundle.files[0], "mask_0.png");
    }

    #[tokio::test]
    async fn test_template_missing_dir() {
        let dir = create_test_dir();
        let err = TemplateDirLoader.load(&dir.path().join("nope")).await.unwrap_err();
        assert!(matches!(err, AssetError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_ascii_ply() {
        let dir = create_test_dir();
        let path = dir.path().join("obj.ply");
        std::fs::write(
            &path,
            "ply\nformat ascii 1.0\nelement vertex 3\nproperty float x\nproperty float y\nproperty float z\nend_header\n0 0 0\n1 2 3\n-1 0 5\n",
        )
        .unwrap();

        let asset = CadFileLoader::default().load(&path).await.unwrap();
        assert_eq!(asset.format, CadFormat::Ply);
        assert_eq!(asset.vertex_count, 3);
        assert_eq!(asset.bounds, Some(([-1.0, 0.0, 0.0], [1.0, 2.0, 5.0])));
    }

    #[tokio::test]
    async fn test_obj_and_sampling() {
        let dir = create_test_dir();
        let path = dir.path().join("obj.obj");
        let mut text = String::from("# mesh\nvn 0 0 1\n");
        for i in 0..10 {
            text.push_str(&format!("v {} 0 0\n", i));
        }
        std::fs::write(&path, text).unwrap();

        let asset = CadFileLoader::new(4).load(&path).await.unwrap();
        assert_eq!(asset.vertex_count, 10);
        assert!(asset.sample_points.len() <= 4);
        assert_eq!(asset.sample_points[0], [0.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_binary_stl() {
        let dir = create_test_dir();
        let path = dir.path().join("obj.stl");
        let mut bytes = vec![0u8; 80];
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 12]);
        for v in [[0.0f32, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]] {
            for c in v {
                bytes.extend_from_slice(&c.to_le_bytes());
            }
        }
        bytes.extend_from_slice(&[0u8; 2]);
        std::fs::write(&path, bytes).unwrap();

        let asset = CadFileLoader::default().load(&path).await.unwrap();
        assert_eq!(asset.format, CadFormat::Stl);
        assert_eq!(asset.vertex_count, 3);
    }

    #[tokio::test]
    async fn test_unsupported_extension() {
        let dir = create_test_dir();
        let path = dir.path().join("obj.fbx");
        std::fs::write(&path, b"x").unwrap();
        let err = CadFileLoader::default().load(&path).await.unwrap_err();
        assert!(matches!(err, AssetError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_find_cad_file_order() {
        let dir = create_test_dir();
        let class_dir = dir.path().join("ycb");
        std::fs::create_dir(&class_dir).unwrap();
        std::fs::write(class_dir.join("mug.stl"), b"x").unwrap();
        std::fs::write(class_dir.join("mug.obj"), b"x").unwrap();

        let found = find_cad_file(dir.path(), "ycb", "mug").unwrap();
        assert_eq!(found.extension().unwrap(), "obj");
        assert!(find_cad_file(dir.path(), "ycb", "bowl").is_none());
    }
}
