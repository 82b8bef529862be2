//! The detector seam between the HTTP layer and the model runtime.

use image::RgbImage;

use crate::error::ObbkitError;
use crate::geom::{BBoxXYXY, Pixel};

/// One detected object in source-image pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BBoxXYXY<Pixel>,
    pub score: f32,
    pub class_id: usize,
}

/// Inference settings shared by detector implementations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectorParams {
    /// Side of the square model input.
    pub image_size: u32,
    pub confidence: f32,
    /// IoU above which a lower-scored box of the same class is dropped.
    pub iou: f32,
    pub max_detections: usize,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            image_size: 1024,
            confidence: 0.25,
            iou: 0.7,
            max_detections: 300,
        }
    }
}

/// Runs object detection on a decoded image.
///
/// Implementations are shared across request handlers and called from
/// tokio's blocking pool.
pub trait Detector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, ObbkitError>;
}

/// Greedy per-class non-maximum suppression.
///
/// Returns at most `max_detections` boxes sorted by descending score.
pub fn non_max_suppression(
    mut detections: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    detections.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Detection> = Vec::new();
    for candidate in detections {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id
                && k.bbox.iou(&candidate.bbox) > f64::from(iou_threshold)
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}
