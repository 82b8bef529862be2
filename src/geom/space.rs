//! Coordinate space marker types.
//!
//! Zero-sized types used as type parameters so that label geometry (stored
//! normalized to the image size) and detector output (in image pixels) can
//! never be mixed up at compile time.

use std::fmt;

/// Marker type for pixel coordinates of a decoded image.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pixel {}

/// Marker type for coordinates normalized to `[0, 1]` by the image size, as
/// stored in YOLO label files.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Normalized {}

impl fmt::Debug for Pixel {
    fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {}
    }
}

impl fmt::Debug for Normalized {
    fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {}
    }
}
