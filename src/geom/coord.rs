//! Typed 2D points.

use std::marker::PhantomData;

/// A 2D point tagged with the coordinate space it lives in.
///
/// `TSpace` is [`Pixel`](super::Pixel) or [`Normalized`](super::Normalized).
#[derive(Clone, Copy, PartialEq)]
pub struct Coord<TSpace> {
    pub x: f64,
    pub y: f64,
    _space: PhantomData<TSpace>,
}

impl<TSpace> Coord<TSpace> {
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            _space: PhantomData,
        }
    }

    /// Returns true if both components are finite (not NaN or infinite).
    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Euclidean distance to `other`.
    #[inline]
    pub fn distance(&self, other: &Self) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// Rotates the offset `(dx, dy)` by `angle` radians and adds it to this
    /// point.
    #[inline]
    pub fn offset_rotated(&self, dx: f64, dy: f64, angle: f64) -> Self {
        let (sin_a, cos_a) = angle.sin_cos();
        Self::new(
            self.x + dx * cos_a - dy * sin_a,
            self.y + dx * sin_a + dy * cos_a,
        )
    }
}

impl<TSpace> std::fmt::Debug for Coord<TSpace> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coord")
            .field("x", &self.x)
            .field("y", &self.y)
            .finish()
    }
}

impl<TSpace> Default for Coord<TSpace> {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::Normalized;

    #[test]
    fn test_coord_is_finite() {
        let finite: Coord<Normalized> = Coord::new(0.1, 0.2);
        assert!(finite.is_finite());

        let nan: Coord<Normalized> = Coord::new(f64::NAN, 0.2);
        assert!(!nan.is_finite());

        let inf: Coord<Normalized> = Coord::new(0.1, f64::INFINITY);
        assert!(!inf.is_finite());
    }

    #[test]
    fn test_offset_rotated_quarter_turn() {
        let center: Coord<Normalized> = Coord::new(0.5, 0.5);
        let moved = center.offset_rotated(0.1, 0.0, std::f64::consts::FRAC_PI_2);
        assert!((moved.x - 0.5).abs() < 1e-12);
        assert!((moved.y - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_distance() {
        let a: Coord<Normalized> = Coord::new(0.0, 0.0);
        let b: Coord<Normalized> = Coord::new(0.3, 0.4);
        assert!((a.distance(&b) - 0.5).abs() < 1e-12);
    }
}
