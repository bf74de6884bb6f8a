//! Validated geographic coordinate pair.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::distance::distance_meters;

/// A latitude/longitude pair in decimal degrees (WGS84).
///
/// Construction through [`Coordinates::new`] guarantees both components are
/// in range, so downstream distance math can skip validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    latitude: f64,
    longitude: f64,
}

/// Error for out-of-range coordinate components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid coordinates: latitude must be in [-90, 90], longitude in [-180, 180]")]
pub struct InvalidCoordinates;

impl Coordinates {
    /// Create a coordinate pair, checking ranges.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCoordinates`] if latitude is outside [-90, 90] or
    /// longitude is outside [-180, 180].
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, InvalidCoordinates> {
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(InvalidCoordinates);
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Create a coordinate pair without validation, for values from trusted
    /// sources (platform fixes, compiled-in defaults).
    #[must_use]
    pub const fn new_unchecked(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Latitude in decimal degrees.
    #[must_use]
    pub const fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in decimal degrees.
    #[must_use]
    pub const fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Great-circle distance to another pair, in meters.
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        distance_meters(
            self.latitude,
            self.longitude,
            other.latitude,
            other.longitude,
        )
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}
