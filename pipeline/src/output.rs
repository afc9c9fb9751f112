//! Output directory policy.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use common::OutputMode;

pub const DEFAULT_TAG: &str = "full-pipeline";
pub const DEFAULT_CAPTURE_TAG: &str = "full-pipeline-from-rss";

/// Lowercases `tag`, replaces every char outside `[a-z0-9-_]` with `-` and trims
/// leading/trailing `-`/`_`. Empty results fall back to `default`.
pub fn normalize_tag(tag: Option<&str>, default: &str) -> String {
    let sanitized: String = tag
        .unwrap_or(default)
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '-' | '_' => c,
            _ => '-',
        })
        .collect();
    let trimmed = sanitized.trim_matches(|c| c == '-' || c == '_');
    if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    }
}

/// `<output_root>/<YYYYmmdd_HHMMSS>_<tag>`.
pub fn run_directory(output_root: &Path, tag: &str, now: DateTime<Local>) -> PathBuf {
    output_root.join(format!("{}_{}", now.format("%Y%m%d_%H%M%S"), tag))
}

/// Where (and whether) a run writes its artifacts.
pub fn plan_output_dir(
    mode: OutputMode,
    requested: Option<&str>,
    output_root: &Path,
    tag: &str,
) -> Option<PathBuf> {
    if !mode.persists_summary() {
        return None;
    }
    match requested.map(str::trim).filter(|d| !d.is_empty()) {
        Some(dir) => Some(PathBuf::from(dir)),
        None => Some(run_directory(output_root, tag, Local::now())),
    }
}
