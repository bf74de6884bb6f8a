pub mod config;
pub mod error;

pub use config::{Config, LocationConfig, ValidationResult};
pub use error::AppError;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use agora_location::{IpGeolocator, LocationResolver, LocationSource, NominatimGeocoder};

/// Initialize the core application
pub fn init() -> Result<()> {
    // Initialize tracing/logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Agora core initialized");
    Ok(())
}

/// Build a location resolver wired from configuration.
///
/// The platform source stays caller-supplied; the geocoder and IP
/// fallback come from config.
pub fn resolver_from_config(
    config: &Config,
    source: Arc<dyn LocationSource>,
) -> Result<LocationResolver> {
    let mut geocoder = NominatimGeocoder::with_base_url(&config.location.geocoder_url)?;
    if !config.location.language.trim().is_empty() {
        geocoder = geocoder.with_language(&config.location.language);
    }

    let ip_geolocator = IpGeolocator::with_endpoint(&config.location.ip_endpoint);

    Ok(
        LocationResolver::new(source, Arc::new(geocoder), ip_geolocator)
            .with_fix_timeout(Duration::from_secs(config.location.fix_timeout_secs)),
    )
}
