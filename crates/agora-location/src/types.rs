use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Platform positioning providers, in scan order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gps,
    Network,
}

impl Provider {
    /// All known providers. Cached-fix selection breaks accuracy ties by
    /// this order.
    pub const ALL: [Provider; 2] = [Provider::Gps, Provider::Network];
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Gps => write!(f, "gps"),
            Provider::Network => write!(f, "network"),
        }
    }
}

/// Health of a positioning provider as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    Available,
    TemporarilyUnavailable,
    OutOfService,
}

impl ProviderStatus {
    /// True if the provider can still be expected to deliver a fix.
    pub fn is_usable(self) -> bool {
        matches!(self, ProviderStatus::Available)
    }
}

/// A position fix from a platform provider.
///
/// Immutable once captured; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fix {
    pub provider: Provider,
    pub latitude: f64,
    pub longitude: f64,
    /// Estimated accuracy radius in meters. Smaller is better.
    pub accuracy_meters: f64,
    pub timestamp: DateTime<Utc>,
}

/// Event delivered on a provider subscription.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    /// A new position fix arrived.
    Fix(Fix),
    /// The provider's health changed.
    StatusChanged {
        provider: Provider,
        status: ProviderStatus,
    },
}

/// Structured postal address with every field optional.
///
/// Created empty, filled in by reverse geocoding, and optionally amended
/// by the IP fallback (country/province/city only) before delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressInfo {
    pub country: Option<String>,
    pub province: Option<String>,
    pub city: Option<String>,
    pub district: Option<String>,
    pub street: Option<String>,
    pub detail_address: Option<String>,
}

/// How much of an [`AddressInfo`] is actually filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressCompleteness {
    /// Every field is present and non-blank.
    Complete,
    /// Some fields are present, some are not.
    Partial,
    /// No field carries a usable value.
    Empty,
}

fn present(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|s| !s.trim().is_empty())
}

impl AddressInfo {
    /// True if the city field carries a non-blank value.
    ///
    /// A blank or whitespace-only city counts as absent, matching the
    /// trigger condition for the IP fallback.
    pub fn has_city(&self) -> bool {
        present(&self.city)
    }

    /// Classify how filled-in this address is.
    pub fn completeness(&self) -> AddressCompleteness {
        let fields = [
            &self.country,
            &self.province,
            &self.city,
            &self.district,
            &self.street,
            &self.detail_address,
        ];
        let filled = fields.iter().filter(|f| present(f)).count();
        match filled {
            0 => AddressCompleteness::Empty,
            n if n == fields.len() => AddressCompleteness::Complete,
            _ => AddressCompleteness::Partial,
        }
    }

    /// Overwrite the region fields from an IP-derived location.
    ///
    /// Only country, province, and city change; district, street, and
    /// detail address keep whatever reverse geocoding produced.
    pub fn apply_region(&mut self, region: IpLocation) {
        self.country = Some(region.country);
        self.province = Some(region.province);
        self.city = Some(region.city);
    }
}

/// Coarse region derived from the caller's public IP address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpLocation {
    pub country: String,
    pub province: String,
    pub city: String,
}

/// Terminal outcome of one location resolution.
///
/// Every call to the resolver produces exactly one of these.
#[derive(Debug, Clone)]
pub enum LocationOutcome {
    /// A fix was acquired and (possibly partially) reverse geocoded.
    Success {
        latitude: f64,
        longitude: f64,
        address: AddressInfo,
    },
    /// Resolution failed after the permission check passed.
    Failure(FailureReason),
    /// The caller lacks location permission. Not retryable until the
    /// user grants permission.
    PermissionDenied,
}

/// Why a resolution failed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FailureReason {
    #[error("location service disabled")]
    ServiceDisabled,

    #[error("location timeout after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("location provider unavailable: {0}")]
    ProviderUnavailable(Provider),

    #[error("location source error: {0}")]
    Source(String),
}

impl FailureReason {
    /// User-friendly message for UI display.
    pub fn user_message(&self) -> String {
        match self {
            Self::ServiceDisabled => {
                "Location services are turned off. Enable them in system settings.".to_string()
            }
            Self::Timeout(d) => {
                format!("Could not get a position fix within {} seconds.", d.as_secs())
            }
            Self::ProviderUnavailable(_) => "Location provider is currently unavailable.".to_string(),
            Self::Source(_) => "Location request failed.".to_string(),
        }
    }
}
