//! YOLO detector backed by ONNX Runtime.
//!
//! Expects an Ultralytics detection export: one `[1, 3, S, S]` float input
//! and one `[1, 4 + classes, N]` output of `cx cy w h` plus per-class
//! scores in letterboxed input pixels.

use std::path::Path;
use std::sync::Mutex;

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::{s, Array4, ArrayViewD, Axis, IxDyn};
use ort::inputs;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use tracing::debug;

use super::detector::{non_max_suppression, Detection, Detector, DetectorParams};
use crate::error::ObbkitError;
use crate::geom::{BBoxXYXY, Pixel};

const PAD_VALUE: u8 = 114;
const BOX_FIELDS: usize = 4;

/// Where the source image sits inside the square model input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    pub fn new(width: u32, height: u32, size: u32) -> Self {
        let scale = (size as f32 / width as f32).min(size as f32 / height as f32);
        let (new_w, new_h) = scaled_dims(width, height, scale, size);
        Self {
            scale,
            pad_x: (size - new_w) / 2,
            pad_y: (size - new_h) / 2,
        }
    }

    /// Maps a `cx cy w h` box from model input pixels back to the source.
    pub fn unmap(&self, cx: f32, cy: f32, w: f32, h: f32) -> BBoxXYXY<Pixel> {
        let cx = (cx - self.pad_x as f32) / self.scale;
        let cy = (cy - self.pad_y as f32) / self.scale;
        BBoxXYXY::from_cxcywh(
            f64::from(cx),
            f64::from(cy),
            f64::from(w / self.scale),
            f64::from(h / self.scale),
        )
    }
}

fn scaled_dims(width: u32, height: u32, scale: f32, size: u32) -> (u32, u32) {
    let w = ((width as f32 * scale).round() as u32).clamp(1, size);
    let h = ((height as f32 * scale).round() as u32).clamp(1, size);
    (w, h)
}

/// Resizes `image` into a `size` x `size` canvas padded with gray.
pub fn letterbox(image: &RgbImage, size: u32) -> (RgbImage, Letterbox) {
    let lb = Letterbox::new(image.width(), image.height(), size);
    let (new_w, new_h) = scaled_dims(image.width(), image.height(), lb.scale, size);
    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
    imageops::overlay(&mut canvas, &resized, i64::from(lb.pad_x), i64::from(lb.pad_y));
    (canvas, lb)
}

fn inference_error(err: impl std::fmt::Display) -> ObbkitError {
    ObbkitError::Inference {
        message: err.to_string(),
    }
}

/// ONNX Runtime session loaded once and shared between requests.
pub struct OnnxDetector {
    session: Mutex<Session>,
    params: DetectorParams,
}

impl OnnxDetector {
    pub fn load(path: &Path, params: DetectorParams) -> Result<Self, ObbkitError> {
        if params.image_size == 0 {
            return Err(ObbkitError::ModelLoad {
                path: path.to_path_buf(),
                message: "image size must be positive".to_string(),
            });
        }
        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(4))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|err| ObbkitError::ModelLoad {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;

        Ok(Self {
            session: Mutex::new(session),
            params,
        })
    }

    fn input_tensor(canvas: &RgbImage) -> Result<Tensor<f32>, ObbkitError> {
        let size = canvas.width() as usize;
        let mut input = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in canvas.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, y as usize, x as usize]] = f32::from(pixel[c]) / 255.0;
            }
        }
        let (data, _offset) = input.into_raw_vec_and_offset();
        Tensor::from_array(([1usize, 3, size, size], data)).map_err(inference_error)
    }
}

impl Detector for OnnxDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>, ObbkitError> {
        let (canvas, lb) = letterbox(image, self.params.image_size);
        let tensor = Self::input_tensor(&canvas)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| inference_error("model session lock poisoned"))?;
        let outputs = session.run(inputs![tensor]).map_err(inference_error)?;
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(inference_error)?;

        let dims: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
        if dims.len() != 3 || dims[0] != 1 || dims[1] <= BOX_FIELDS {
            return Err(inference_error(format!(
                "unexpected output shape {dims:?}, expected [1, 4 + classes, N]"
            )));
        }
        let output = ArrayViewD::from_shape(IxDyn(&dims), data).map_err(inference_error)?;
        let view = output.index_axis(Axis(0), 0);

        let mut candidates = Vec::new();
        for i in 0..dims[2] {
            let scores = view.slice(s![BOX_FIELDS.., i]);
            let mut best = (0usize, f32::MIN);
            for (class_id, &score) in scores.iter().enumerate() {
                if score > best.1 {
                    best = (class_id, score);
                }
            }
            if best.1 <= self.params.confidence {
                continue;
            }

            let bbox = lb
                .unmap(view[[0, i]], view[[1, i]], view[[2, i]], view[[3, i]])
                .clamp(f64::from(image.width()), f64::from(image.height()));
            candidates.push(Detection {
                bbox,
                score: best.1,
                class_id: best.0,
            });
        }
        debug!(candidates = candidates.len(), "decoded model output");

        Ok(non_max_suppression(
            candidates,
            self.params.iou,
            self.params.max_detections,
        ))
    }
}
