//! Platform location capability seam.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

use agora_geo::Coordinates;

use crate::error::SourceError;
use crate::types::{Fix, Provider, ProviderEvent};

/// Access to the platform positioning subsystem.
///
/// A subscription lives exactly as long as its receiver: dropping the
/// receiver unregisters the listener, so a provider reporting after the
/// other side tore down is a no-op rather than an error.
#[async_trait]
pub trait LocationSource: Send + Sync {
    /// True if at least one of the platform's location permissions is
    /// granted.
    fn has_permission(&self) -> bool;

    /// Available providers, in cached-fix tie-break order.
    fn providers(&self) -> Vec<Provider>;

    /// True if the provider is switched on at the platform level.
    fn is_enabled(&self, provider: Provider) -> bool;

    /// Last cached fix from the provider, if any.
    ///
    /// Implementations absorb their own I/O and permission errors and
    /// answer `None`.
    async fn last_known_fix(&self, provider: Provider) -> Option<Fix>;

    /// Register for fix and status updates from the provider.
    async fn subscribe(
        &self,
        provider: Provider,
    ) -> Result<mpsc::Receiver<ProviderEvent>, SourceError>;
}

/// A [`LocationSource`] pinned to fixed coordinates.
///
/// Development and desktop stand-in for real platform positioning.
/// Permission is always granted, only the network provider exists, and
/// the configured point is served both as the cached fix and as the
/// first (and only) live update.
#[derive(Debug, Clone)]
pub struct StaticLocationSource {
    coordinates: Coordinates,
    accuracy_meters: f64,
}

impl StaticLocationSource {
    /// Default accuracy reported for the fixed point, in meters.
    pub const DEFAULT_ACCURACY_METERS: f64 = 50.0;

    pub fn new(coordinates: Coordinates) -> Self {
        Self {
            coordinates,
            accuracy_meters: Self::DEFAULT_ACCURACY_METERS,
        }
    }

    /// Override the reported accuracy.
    pub fn with_accuracy(mut self, accuracy_meters: f64) -> Self {
        self.accuracy_meters = accuracy_meters;
        self
    }

    fn fix(&self) -> Fix {
        Fix {
            provider: Provider::Network,
            latitude: self.coordinates.latitude(),
            longitude: self.coordinates.longitude(),
            accuracy_meters: self.accuracy_meters,
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
impl LocationSource for StaticLocationSource {
    fn has_permission(&self) -> bool {
        true
    }

    fn providers(&self) -> Vec<Provider> {
        vec![Provider::Network]
    }

    fn is_enabled(&self, provider: Provider) -> bool {
        provider == Provider::Network
    }

    async fn last_known_fix(&self, provider: Provider) -> Option<Fix> {
        (provider == Provider::Network).then(|| self.fix())
    }

    async fn subscribe(
        &self,
        provider: Provider,
    ) -> Result<mpsc::Receiver<ProviderEvent>, SourceError> {
        if provider != Provider::Network {
            return Err(SourceError::Unavailable(format!(
                "provider not served: {provider}"
            )));
        }
        let (tx, rx) = mpsc::channel(1);
        // Capacity 1 and the receiver is still local, so this cannot fail.
        let _ = tx.send(ProviderEvent::Fix(self.fix())).await;
        Ok(rx)
    }
}
