//! Geographic primitives for Agora.
//!
//! Validated coordinate pairs and the great-circle distance/formatting
//! used on listing cards ("how far is this seller from me").

pub mod coords;
pub mod distance;

pub use coords::{Coordinates, InvalidCoordinates};
pub use distance::{distance_meters, format_distance, EARTH_RADIUS_METERS};
