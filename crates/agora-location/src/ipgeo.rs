//! IP-based geolocation fallback.
//!
//! One HTTP round trip to a public geolocation endpoint, used when
//! reverse geocoding cannot name a city.

use std::net::UdpSocket;
use std::sync::Arc;

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::IpLocationError;
use crate::types::IpLocation;

const IP_API_URL: &str = "http://ip-api.com/json/?lang=zh-CN";

/// Network reachability check, queried before any request goes out.
pub trait Connectivity: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Routability probe against a public resolver.
///
/// Connecting a UDP socket only picks a route; no datagram is sent.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemConnectivity;

impl Connectivity for SystemConnectivity {
    fn is_online(&self) -> bool {
        UdpSocket::bind("0.0.0.0:0")
            .and_then(|socket| socket.connect("8.8.8.8:53"))
            .is_ok()
    }
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: Option<String>,
    message: Option<String>,
    country: Option<String>,
    #[serde(rename = "regionName")]
    region_name: Option<String>,
    city: Option<String>,
}

/// Client for the ip-api.com style geolocation endpoint.
///
/// No retry and no timeout of its own; the transport defaults apply.
pub struct IpGeolocator {
    client: Client,
    endpoint: String,
    connectivity: Arc<dyn Connectivity>,
}

impl IpGeolocator {
    pub fn new() -> Self {
        Self::with_endpoint(IP_API_URL)
    }

    /// Point at a different endpoint. The URL is used as-is, query
    /// string included.
    pub fn with_endpoint(endpoint: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.to_string(),
            connectivity: Arc::new(SystemConnectivity),
        }
    }

    /// Swap the reachability check.
    pub fn with_connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = connectivity;
        self
    }

    /// Locate the caller by public IP.
    ///
    /// If the reachability check reports offline, fails without issuing
    /// any request.
    #[instrument(skip(self), level = "debug")]
    pub async fn lookup(&self) -> Result<IpLocation, IpLocationError> {
        if !self.connectivity.is_online() {
            return Err(IpLocationError::NetworkUnavailable);
        }

        let response = self.client.get(&self.endpoint).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(IpLocationError::Status(status.as_u16()));
        }

        let text = response.text().await?;
        let body: IpApiResponse =
            serde_json::from_str(&text).map_err(|e| IpLocationError::Parse(e.to_string()))?;

        if body.status.as_deref() != Some("success") {
            let message = body
                .message
                .unwrap_or_else(|| "ip geolocation failed".to_string());
            return Err(IpLocationError::Rejected(message));
        }

        let country = body
            .country
            .ok_or_else(|| IpLocationError::Parse("missing field `country`".to_string()))?;
        let province = body
            .region_name
            .ok_or_else(|| IpLocationError::Parse("missing field `regionName`".to_string()))?;
        let city = body
            .city
            .ok_or_else(|| IpLocationError::Parse("missing field `city`".to_string()))?;

        debug!("ip geolocation answered: {} / {} / {}", country, province, city);
        Ok(IpLocation {
            country,
            province,
            city,
        })
    }
}

impl Default for IpGeolocator {
    fn default() -> Self {
        Self::new()
    }
}
