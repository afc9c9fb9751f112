//! The process-wide pair of asset caches plus their loaders.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cache::{AssetCache, CacheStats};
use crate::error::{AssetError, Result};
use crate::loader::{find_cad_file, AssetLoader, CadAsset, CadFileLoader, TemplateBundle, TemplateDirLoader};

pub type TemplateCache = AssetCache<PathBuf, Arc<TemplateBundle>>;
pub type CadCache = AssetCache<PathBuf, Arc<CadAsset>>;

/// Canonical cache key for a path: the resolved absolute path when it exists,
/// otherwise the path made absolute against the working directory.
pub fn canonical_key(path: &Path) -> PathBuf {
    std::fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Outcome of a preload walk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreloadReport {
    pub templates_loaded: usize,
    pub cads_loaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub stopped_full: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub templates: CacheStats,
    pub cads: CacheStats,
}

/// Template and CAD caches with independent capacities.
pub struct AssetRegistry {
    templates: TemplateCache,
    cads: CadCache,
    template_loader: Arc<dyn AssetLoader<Asset = TemplateBundle>>,
    cad_loader: Arc<dyn AssetLoader<Asset = CadAsset>>,
}

impl AssetRegistry {
    pub fn new(template_capacity: usize, cad_capacity: usize) -> Self {
        Self::with_loaders(
            template_capacity,
            cad_capacity,
            Arc::new(TemplateDirLoader),
            Arc::new(CadFileLoader::default()),
        )
    }

    pub fn with_loaders(
        template_capacity: usize,
        cad_capacity: usize,
        template_loader: Arc<dyn AssetLoader<Asset = TemplateBundle>>,
        cad_loader: Arc<dyn AssetLoader<Asset = CadAsset>>,
    ) -> Self {
        Self {
            templates: AssetCache::new("templates", template_capacity),
            cads: AssetCache::new("cad", cad_capacity),
            template_loader,
            cad_loader,
        }
    }

    pub fn templates(&self) -> &TemplateCache {
        &self.templates
    }

    pub fn cads(&self) -> &CadCache {
        &self.cads
    }

    /// Returns the cached template bundle, loading it on a miss.
    pub async fn template(&self, dir: &Path) -> Result<Arc<TemplateBundle>> {
        get_or_load(&self.templates, self.template_loader.as_ref(), dir).await
    }

    /// Returns the cached CAD asset, loading it on a miss.
    pub async fn cad(&self, path: &Path) -> Result<Arc<CadAsset>> {
        get_or_load(&self.cads, self.cad_loader.as_ref(), path).await
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            templates: self.templates.stats(),
            cads: self.cads.stats(),
        }
    }

    fn either_full(&self) -> bool {
        self.templates.is_full() || self.cads.is_full()
    }

    /// Walks `templates_root/<class>/<object>` and warms both caches with each
    /// template directory and its `meshes_root/<class>/<object>.{ply,obj,stl}`.
    ///
    /// Stops as soon as either cache is full. `classes` restricts the walk;
    /// empty means every class. Per-item failures are logged and skipped.
    pub async fn preload(&self, templates_root: &Path, meshes_root: &Path, classes: &[String]) -> PreloadReport {
        let mut report = PreloadReport::default();

        let class_dirs = match sorted_subdirs(templates_root).await {
            Ok(dirs) => dirs,
            Err(e) => {
                tracing::warn!(root = ?templates_root, error = %e, "Template root not readable, skipping preload");
                return report;
            }
        };

        'classes: for class_dir in class_dirs {
            let class_name = file_name(&class_dir);
            if !classes.is_empty() && !classes.iter().any(|c| c == &class_name) {
                continue;
            }

            let object_dirs = match sorted_subdirs(&class_dir).await {
                Ok(dirs) => dirs,
                Err(e) => {
                    tracing::warn!(class = %class_name, error = %e, "Class directory not readable");
                    report.failed += 1;
                    continue;
                }
            };

            for template_dir in object_dirs {
                if self.either_full() {
                    report.stopped_full = true;
                    break 'classes;
                }

                let object_name = file_name(&template_dir);
                let Some(cad_path) = find_cad_file(meshes_root, &class_name, &object_name) else {
                    tracing::warn!(class = %class_name, object = %object_name, "No CAD file for template, skipping");
                    report.skipped += 1;
                    continue;
                };

                match self.template(&template_dir).await {
                    Ok(_) => report.templates_loaded += 1,
                    Err(e) => {
                        tracing::warn!(class = %class_name, object = %object_name, error = %e, "Template preload failed");
                        report.failed += 1;
                        continue;
                    }
                }
                match self.cad(&cad_path).await {
                    Ok(_) => report.cads_loaded += 1,
                    Err(e) => {
                        tracing::warn!(class = %class_name, object = %object_name, error = %e, "CAD preload failed");
                        report.failed += 1;
                    }
                }
            }
        }

        if self.either_full() {
            report.stopped_full = true;
        }

        tracing::info!(
            templates = report.templates_loaded,
            cads = report.cads_loaded,
            skipped = report.skipped,
            failed = report.failed,
            "Asset preload finished"
        );
        report
    }
}

async fn get_or_load<A>(
    cache: &AssetCache<PathBuf, Arc<A>>,
    loader: &dyn AssetLoader<Asset = A>,
    path: &Path,
) -> Result<Arc<A>>
where
    A: Send + Sync + 'static,
{
    let key = canonical_key(path);
    if let Some(hit) = cache.get(&key) {
        tracing::debug!(cache = %cache.name(), key = ?key, "Cache hit");
        return Ok(hit);
    }

    // Loaded outside the lock; a concurrent miss on the same key may load too.
    let asset = Arc::new(loader.load(&key).await?);
    cache.put(key.clone(), Arc::clone(&asset));
    tracing::debug!(cache = %cache.name(), key = ?key, size = cache.size(), "Cached new asset");
    Ok(asset)
}

async fn sorted_subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| AssetError::io(dir, e))?;
    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| AssetError::io(dir, e))? {
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
