//! Draws detections onto the uploaded image and encodes the result.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use raqote::{DrawOptions, DrawTarget, LineJoin, PathBuilder, SolidSource, Source, StrokeStyle};

use super::detector::Detection;
use crate::error::ObbkitError;

/// JPEG quality of `/predict` responses.
pub const JPEG_QUALITY: u8 = 90;

const PALETTE: [(u8, u8, u8); 6] = [
    (0x04, 0x2a, 0xff),
    (0x0b, 0xdb, 0xeb),
    (0xf3, 0xf3, 0xf3),
    (0x00, 0xdf, 0xb7),
    (0x11, 0x1f, 0x68),
    (0xff, 0x6f, 0xdd),
];

fn class_color(class_id: usize) -> SolidSource {
    let (r, g, b) = PALETTE[class_id % PALETTE.len()];
    SolidSource { r, g, b, a: 0xff }
}

/// Line width scaled to the image, never thinner than 2px.
fn line_width(width: u32, height: u32) -> f32 {
    ((width + height) as f32 / 2.0 * 0.003).round().max(2.0)
}

/// Returns a copy of `image` with every detection outlined.
pub fn draw_detections(image: &RgbImage, detections: &[Detection]) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut dt = DrawTarget::new(width as i32, height as i32);

    let pixels: Vec<u32> = image
        .pixels()
        .map(|Rgb([r, g, b])| u32::from_le_bytes([*b, *g, *r, 0xff]))
        .collect();
    dt.get_data_mut().copy_from_slice(&pixels);

    let style = StrokeStyle {
        join: LineJoin::Round,
        width: line_width(width, height),
        ..StrokeStyle::default()
    };
    for detection in detections {
        let bbox = &detection.bbox;
        let mut pb = PathBuilder::new();
        pb.rect(
            bbox.xmin() as f32,
            bbox.ymin() as f32,
            bbox.width() as f32,
            bbox.height() as f32,
        );
        dt.stroke(
            &pb.finish(),
            &Source::Solid(class_color(detection.class_id)),
            &style,
            &DrawOptions::default(),
        );
    }

    let data = dt.get_data();
    RgbImage::from_fn(width, height, |x, y| {
        let [b, g, r, _] = data[(y * width + x) as usize].to_le_bytes();
        Rgb([r, g, b])
    })
}

/// Encodes `image` as JPEG at the given quality.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, ObbkitError> {
    let mut buffer = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode_image(image)
        .map_err(|err| ObbkitError::ImageEncode {
            message: err.to_string(),
        })?;
    Ok(buffer.into_inner())
}
