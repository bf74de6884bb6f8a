//! Location-specific error types.

use thiserror::Error;

/// Errors from a platform location source subscription.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("location source unavailable: {0}")]
    Unavailable(String),
}

/// Errors from a reverse geocoding backend.
#[derive(Error, Debug)]
pub enum GeocodeError {
    #[error("reverse geocoding unavailable")]
    Unavailable,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid geocoder response: {0}")]
    InvalidResponse(String),
}

/// Errors from the IP geolocation endpoint.
///
/// Exactly one of `Ok`/`Err` comes back per lookup; nothing throws past
/// this boundary.
#[derive(Error, Debug)]
pub enum IpLocationError {
    /// The connectivity probe reported offline. No request was issued.
    #[error("network unavailable")]
    NetworkUnavailable,

    /// Connection-level failure talking to the endpoint.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered with a non-success HTTP status.
    #[error("unexpected status {0}")]
    Status(u16),

    /// The endpoint answered but rejected the query; carries its message.
    #[error("{0}")]
    Rejected(String),

    /// Malformed JSON or a missing required field.
    #[error("parse error: {0}")]
    Parse(String),
}

/// Errors from the resolver's request lifecycle, distinct from terminal
/// location outcomes: when one of these comes back, no request ran.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    #[error("a location request is already in flight")]
    Busy,

    #[error("resolver has been released")]
    Released,
}

impl ResolveError {
    /// User-friendly message for UI display.
    pub fn user_message(&self) -> String {
        match self {
            Self::Busy => "A location request is already running. Try again shortly.".to_string(),
            Self::Released => "Location service has shut down.".to_string(),
        }
    }
}
