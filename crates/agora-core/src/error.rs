//! Centralized error types for the Agora application.
//!
//! One typed hierarchy that keeps full context for logging while
//! offering user-friendly messages for the UI via `user_message()`.

use thiserror::Error;

use agora_geo::InvalidCoordinates;
use agora_location::{FailureReason, ResolveError};

/// Top-level application error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Location request error: {0}")]
    Location(#[from] ResolveError),

    #[error("Location failed: {0}")]
    LocationFailed(#[from] FailureReason),

    #[error("Invalid coordinates: {0}")]
    Geo(#[from] InvalidCoordinates),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Returns a user-friendly message suitable for display in the UI.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Location(e) => e.user_message(),
            AppError::LocationFailed(e) => e.user_message(),
            AppError::Geo(_) => "Coordinates are out of range.".to_string(),
            AppError::Io(_) => "A file operation failed. Please try again.".to_string(),
            AppError::Other(_) => "An unexpected error occurred. Please try again.".to_string(),
        }
    }
}
