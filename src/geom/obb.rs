//! Oriented boxes and their four-corner polygon form.

use clap::ValueEnum;

use super::coord::Coord;
use super::Normalized;

/// Unit in which angles are stored in label files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum AngleUnit {
    #[default]
    Radians,
    Degrees,
}

impl AngleUnit {
    /// Converts a stored angle value to radians.
    pub fn to_radians(self, value: f64) -> f64 {
        match self {
            AngleUnit::Radians => value,
            AngleUnit::Degrees => value.to_radians(),
        }
    }
}

/// Layout of the eight corner values on a polygon label line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum CornerOrder {
    /// `x1 x2 x3 x4 y1 y2 y3 y4`
    #[default]
    Grouped,
    /// `x1 y1 x2 y2 x3 y3 x4 y4`
    Interleaved,
}

impl CornerOrder {
    /// Flattens four corners into eight values in this order.
    pub fn flatten(self, corners: &[Coord<Normalized>; 4]) -> [f64; 8] {
        let mut out = [0.0; 8];
        for (i, corner) in corners.iter().enumerate() {
            match self {
                CornerOrder::Grouped => {
                    out[i] = corner.x;
                    out[i + 4] = corner.y;
                }
                CornerOrder::Interleaved => {
                    out[2 * i] = corner.x;
                    out[2 * i + 1] = corner.y;
                }
            }
        }
        out
    }

    /// Inverse of [`flatten`](Self::flatten).
    pub fn unflatten(self, values: &[f64; 8]) -> [Coord<Normalized>; 4] {
        std::array::from_fn(|i| match self {
            CornerOrder::Grouped => Coord::new(values[i], values[i + 4]),
            CornerOrder::Interleaved => Coord::new(values[2 * i], values[2 * i + 1]),
        })
    }
}

/// A rectangle of size `w` x `h` centered on `(cx, cy)` and rotated by
/// `angle` radians.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrientedBox {
    pub cx: f64,
    pub cy: f64,
    pub w: f64,
    pub h: f64,
    pub angle: f64,
}

impl OrientedBox {
    pub fn new(cx: f64, cy: f64, w: f64, h: f64, angle: f64) -> Self {
        Self { cx, cy, w, h, angle }
    }

    /// Corners in clockwise order starting at the unrotated top-left:
    /// `(-w/2,-h/2) (w/2,-h/2) (w/2,h/2) (-w/2,h/2)`, each rotated about the
    /// center.
    pub fn corners(&self) -> [Coord<Normalized>; 4] {
        let center: Coord<Normalized> = Coord::new(self.cx, self.cy);
        let (half_w, half_h) = (self.w / 2.0, self.h / 2.0);
        [
            (-half_w, -half_h),
            (half_w, -half_h),
            (half_w, half_h),
            (-half_w, half_h),
        ]
        .map(|(dx, dy)| center.offset_rotated(dx, dy, self.angle))
    }

    /// Recovers the box from corners produced by [`corners`](Self::corners).
    ///
    /// The angle comes back in `(-pi, pi]`.
    pub fn from_corners(corners: &[Coord<Normalized>; 4]) -> Self {
        let cx = corners.iter().map(|c| c.x).sum::<f64>() / 4.0;
        let cy = corners.iter().map(|c| c.y).sum::<f64>() / 4.0;
        let w = corners[0].distance(&corners[1]);
        let h = corners[1].distance(&corners[2]);
        let angle = (corners[1].y - corners[0].y).atan2(corners[1].x - corners[0].x);
        Self { cx, cy, w, h, angle }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrotated_corners_match_axis_aligned_box() {
        let obb = OrientedBox::new(0.5, 0.5, 0.2, 0.4, 0.0);
        let corners = obb.corners();
        let flat = CornerOrder::Grouped.flatten(&corners);
        let expected = [0.4, 0.6, 0.6, 0.4, 0.3, 0.3, 0.7, 0.7];
        for (got, want) in flat.iter().zip(expected) {
            assert!((got - want).abs() < 1e-12, "{got} != {want}");
        }
    }

    #[test]
    fn flatten_orders_differ_only_in_layout() {
        let corners = OrientedBox::new(0.5, 0.5, 0.2, 0.1, 0.3).corners();
        let grouped = CornerOrder::Grouped.flatten(&corners);
        let interleaved = CornerOrder::Interleaved.flatten(&corners);
        assert_eq!(grouped[0], interleaved[0]);
        assert_eq!(grouped[4], interleaved[1]);
        assert_eq!(grouped[3], interleaved[6]);
        assert_eq!(grouped[7], interleaved[7]);
        assert_eq!(CornerOrder::Interleaved.unflatten(&interleaved), corners);
        assert_eq!(CornerOrder::Grouped.unflatten(&grouped), corners);
    }

    #[test]
    fn from_corners_recovers_rotated_box() {
        let obb = OrientedBox::new(0.4, 0.6, 0.3, 0.1, -1.2);
        let restored = OrientedBox::from_corners(&obb.corners());
        assert!((restored.cx - obb.cx).abs() < 1e-12);
        assert!((restored.cy - obb.cy).abs() < 1e-12);
        assert!((restored.w - obb.w).abs() < 1e-12);
        assert!((restored.h - obb.h).abs() < 1e-12);
        assert!((restored.angle - obb.angle).abs() < 1e-12);
    }

    #[test]
    fn degrees_convert_to_radians() {
        assert_eq!(AngleUnit::Radians.to_radians(1.5), 1.5);
        assert!((AngleUnit::Degrees.to_radians(180.0) - std::f64::consts::PI).abs() < 1e-12);
    }
}
