//! Pose summaries built from the estimation service's parallel output arrays.

use serde::{Deserialize, Serialize};

/// One estimated object pose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseEntry {
    pub index: usize,
    pub score: f64,
    pub rotation: [[f64; 3]; 3],
    pub translation: [f64; 3],
}

fn as_rotation(rows: &[Vec<f64>]) -> Option<[[f64; 3]; 3]> {
    if rows.len() != 3 {
        return None;
    }
    let mut r = [[0.0; 3]; 3];
    for (dst, src) in r.iter_mut().zip(rows) {
        if src.len() != 3 {
            return None;
        }
        dst.copy_from_slice(src);
    }
    Some(r)
}

fn as_translation(values: &[f64]) -> Option<[f64; 3]> {
    match values {
        [x, y, z] => Some([*x, *y, *z]),
        _ => None,
    }
}

/// Zips scores, rotations and translations by index.
///
/// Indices whose rotation or translation is missing or malformed are dropped;
/// the surviving entries keep their original index.
pub fn summarize_poses(
    scores: &[f64],
    rotations: &[Vec<Vec<f64>>],
    translations: &[Vec<f64>],
) -> Vec<PoseEntry> {
    scores
        .iter()
        .enumerate()
        .filter_map(|(index, &score)| {
            let rotation = rotations.get(index).and_then(|r| as_rotation(r))?;
            let translation = translations.get(index).and_then(|t| as_translation(t))?;
            Some(PoseEntry {
                index,
                score,
                rotation,
                translation,
            })
        })
        .collect()
}
