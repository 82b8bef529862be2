//! Geometry shared by the label converters and the detection server.
//!
//! Points and boxes carry a type-level coordinate space so normalized label
//! geometry and pixel-space detector output cannot be mixed:
//!
//! ```
//! use obbkit::geom::{CornerOrder, OrientedBox};
//!
//! let obb = OrientedBox::new(0.5, 0.5, 0.2, 0.4, 0.0);
//! let values = CornerOrder::Grouped.flatten(&obb.corners());
//! assert!((values[0] - 0.4).abs() < 1e-12);
//! ```

mod bbox;
mod coord;
mod obb;
mod space;

pub use bbox::BBoxXYXY;
pub use coord::Coord;
pub use obb::{AngleUnit, CornerOrder, OrientedBox};
pub use space::{Normalized, Pixel};
