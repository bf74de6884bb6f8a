//! Location resolution for Agora
//!
//! Turns "where is this device" into coordinates plus a structured
//! address: cached or live platform fixes, reverse geocoding, and an
//! IP-based region fallback, behind one resolver with a single-request
//! lifecycle.

pub mod error;
pub mod geocode;
pub mod ipgeo;
pub mod resolver;
pub mod source;
pub mod types;

pub use error::{GeocodeError, IpLocationError, ResolveError, SourceError};
pub use geocode::{AddressCandidate, AddressResolver, NominatimGeocoder, ReverseGeocoder};
pub use ipgeo::{Connectivity, IpGeolocator, SystemConnectivity};
pub use resolver::{LocationResolver, DEFAULT_FIX_TIMEOUT};
pub use source::{LocationSource, StaticLocationSource};
pub use types::*;
