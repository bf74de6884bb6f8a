//! Reverse geocoding: convert a fix into a structured postal address.
//! Nominatim (OpenStreetMap) backs the default implementation - free, no
//! API key required.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::GeocodeError;
use crate::types::AddressInfo;

const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/reverse";
const REQUEST_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = "Agora/0.1.0 (https://github.com/agora-market)";

/// One candidate from a reverse geocoding backend, pre-mapping.
///
/// Field names follow the usual geocoder vocabulary: `admin_area` is the
/// first-level division (province/state), `sub_admin_area` the second
/// (county/district).
#[derive(Debug, Clone, Default)]
pub struct AddressCandidate {
    pub country: Option<String>,
    pub admin_area: Option<String>,
    pub sub_admin_area: Option<String>,
    pub locality: Option<String>,
    pub sub_locality: Option<String>,
    pub thoroughfare: Option<String>,
    pub feature_name: Option<String>,
    pub address_lines: Vec<String>,
}

/// A reverse geocoding backend.
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// True if the backend can be queried at all on this platform.
    fn is_available(&self) -> bool;

    /// Look up candidates for a coordinate pair, best match first.
    async fn lookup(
        &self,
        latitude: f64,
        longitude: f64,
        max_results: usize,
    ) -> Result<Vec<AddressCandidate>, GeocodeError>;
}

/// Maps coordinates to an [`AddressInfo`], degrading silently.
///
/// Never fails: an unavailable backend, an empty candidate list, or a
/// query error all come back as an all-empty address. Callers decide what
/// a partial address means for them.
pub struct AddressResolver {
    geocoder: Arc<dyn ReverseGeocoder>,
}

impl AddressResolver {
    pub fn new(geocoder: Arc<dyn ReverseGeocoder>) -> Self {
        Self { geocoder }
    }

    /// Resolve coordinates to a structured address.
    pub async fn resolve(&self, latitude: f64, longitude: f64) -> AddressInfo {
        if !self.geocoder.is_available() {
            debug!("reverse geocoding unavailable, returning empty address");
            return AddressInfo::default();
        }

        let candidates = match self.geocoder.lookup(latitude, longitude, 1).await {
            Ok(c) => c,
            Err(e) => {
                warn!("reverse geocode failed: {}", e);
                return AddressInfo::default();
            }
        };

        match candidates.into_iter().next() {
            Some(candidate) => candidate_to_address(candidate),
            None => {
                debug!("reverse geocode returned no candidate");
                AddressInfo::default()
            }
        }
    }
}

fn non_blank(field: Option<String>) -> Option<String> {
    field.filter(|s| !s.trim().is_empty())
}

/// Map a raw candidate onto the address fields, applying the fallbacks:
/// province falls back to the second-level division, city to the
/// sub-locality, street to the feature name.
fn candidate_to_address(candidate: AddressCandidate) -> AddressInfo {
    let AddressCandidate {
        country,
        admin_area,
        sub_admin_area,
        locality,
        sub_locality,
        thoroughfare,
        feature_name,
        address_lines,
    } = candidate;

    let admin_area = non_blank(admin_area);
    let sub_admin_area = non_blank(sub_admin_area);

    AddressInfo {
        country: non_blank(country),
        province: admin_area.or_else(|| sub_admin_area.clone()),
        city: non_blank(locality).or_else(|| non_blank(sub_locality)),
        district: sub_admin_area,
        street: non_blank(thoroughfare).or_else(|| non_blank(feature_name)),
        detail_address: non_blank(address_lines.into_iter().next()),
    }
}

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    address: Option<NominatimAddress>,
    display_name: Option<String>,
    name: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    country: Option<String>,
    state: Option<String>,
    county: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    suburb: Option<String>,
    neighbourhood: Option<String>,
    road: Option<String>,
}

impl NominatimResponse {
    fn into_candidate(self) -> AddressCandidate {
        let addr = self.address.unwrap_or_default();
        AddressCandidate {
            country: addr.country,
            admin_area: addr.state,
            sub_admin_area: addr.county,
            locality: addr.city.or(addr.town).or(addr.village).or(addr.municipality),
            sub_locality: addr.suburb.or(addr.neighbourhood),
            thoroughfare: addr.road,
            feature_name: self.name,
            address_lines: self.display_name.into_iter().collect(),
        }
    }
}

/// [`ReverseGeocoder`] backed by the Nominatim reverse endpoint.
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
    language: Option<String>,
}

impl NominatimGeocoder {
    pub fn new() -> Result<Self, GeocodeError> {
        Self::with_base_url(NOMINATIM_URL)
    }

    /// Point at a different endpoint (self-hosted instance, tests).
    pub fn with_base_url(base_url: &str) -> Result<Self, GeocodeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            language: None,
        })
    }

    /// Request results in the given language (Accept-Language form).
    pub fn with_language(mut self, language: &str) -> Self {
        self.language = Some(language.to_string());
        self
    }
}

#[async_trait]
impl ReverseGeocoder for NominatimGeocoder {
    fn is_available(&self) -> bool {
        true
    }

    async fn lookup(
        &self,
        latitude: f64,
        longitude: f64,
        max_results: usize,
    ) -> Result<Vec<AddressCandidate>, GeocodeError> {
        let mut url = format!(
            "{}?lat={}&lon={}&format=jsonv2&addressdetails=1",
            self.base_url, latitude, longitude
        );
        if let Some(lang) = &self.language {
            url.push_str(&format!("&accept-language={}", lang));
        }

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(GeocodeError::InvalidResponse(format!(
                "status {}",
                response.status()
            )));
        }

        let body: NominatimResponse = response
            .json()
            .await
            .map_err(|e| GeocodeError::InvalidResponse(e.to_string()))?;

        // Nominatim answers 200 with an error body for un-geocodable
        // points (open ocean).
        if let Some(err) = body.error {
            debug!("nominatim could not geocode: {}", err);
            return Ok(Vec::new());
        }

        let mut candidates = vec![body.into_candidate()];
        candidates.truncate(max_results);
        Ok(candidates)
    }
}
