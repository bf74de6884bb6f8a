//! Great-circle distance between two coordinate pairs.

/// Mean Earth radius in meters (spherical model).
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Haversine distance in meters between two (latitude, longitude) pairs
/// given in decimal degrees.
///
/// Inputs are assumed to be validated already (see `Coordinates::new`);
/// this function performs no range checks and has no error path.
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Format a distance for display: meters with two decimals below one
/// kilometer, kilometers with two decimals from there on.
///
/// This is a presentation rule, not a unit conversion; callers that need a
/// machine-readable distance must keep the raw meters value.
pub fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{:.2} 米", meters)
    } else {
        format!("{:.2} 公里", meters / 1000.0)
    }
}
