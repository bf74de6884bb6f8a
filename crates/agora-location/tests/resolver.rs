//! Integration tests for LocationResolver against scripted platform
//! fakes and a mock geolocation endpoint.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use agora_location::{
    AddressCandidate, Connectivity, FailureReason, Fix, GeocodeError, IpGeolocator,
    LocationOutcome, LocationResolver, LocationSource, Provider, ProviderEvent, ProviderStatus,
    ResolveError, ReverseGeocoder, SourceError,
};

/// Scripted platform source. Counts calls so tests can prove which
/// steps ran.
#[derive(Default)]
struct FakeSource {
    permission: bool,
    providers: Vec<Provider>,
    enabled: Vec<Provider>,
    cached: Vec<Fix>,
    events: Mutex<HashMap<Provider, Vec<ProviderEvent>>>,
    hold_open: bool,
    fail_subscribe: Option<&'static str>,
    deny_subscribe: bool,
    subscriptions: AtomicUsize,
    cache_queries: AtomicUsize,
    open_senders: Mutex<Vec<mpsc::Sender<ProviderEvent>>>,
}

impl FakeSource {
    /// Permission granted, both providers present and enabled, nothing
    /// cached, no events scripted.
    fn granted() -> Self {
        Self {
            permission: true,
            providers: Provider::ALL.to_vec(),
            enabled: Provider::ALL.to_vec(),
            ..Self::default()
        }
    }

    fn with_enabled(mut self, enabled: Vec<Provider>) -> Self {
        self.enabled = enabled;
        self
    }

    fn with_cached(mut self, fix: Fix) -> Self {
        self.cached.push(fix);
        self
    }

    fn with_event(self, provider: Provider, event: ProviderEvent) -> Self {
        self.events.lock().entry(provider).or_default().push(event);
        self
    }

    /// Keep subscription channels open so providers stay registered and
    /// silent until the other side drops.
    fn held_open(mut self) -> Self {
        self.hold_open = true;
        self
    }
}

#[async_trait]
impl LocationSource for FakeSource {
    fn has_permission(&self) -> bool {
        self.permission
    }

    fn providers(&self) -> Vec<Provider> {
        self.providers.clone()
    }

    fn is_enabled(&self, provider: Provider) -> bool {
        self.enabled.contains(&provider)
    }

    async fn last_known_fix(&self, provider: Provider) -> Option<Fix> {
        self.cache_queries.fetch_add(1, Ordering::SeqCst);
        self.cached.iter().find(|f| f.provider == provider).cloned()
    }

    async fn subscribe(
        &self,
        provider: Provider,
    ) -> Result<mpsc::Receiver<ProviderEvent>, SourceError> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        if self.deny_subscribe {
            return Err(SourceError::PermissionDenied);
        }
        if let Some(message) = self.fail_subscribe {
            return Err(SourceError::Unavailable(message.to_string()));
        }

        let events = self.events.lock().remove(&provider).unwrap_or_default();
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            let _ = tx.try_send(event);
        }
        if self.hold_open {
            self.open_senders.lock().push(tx);
        }
        Ok(rx)
    }
}

/// Geocoder that always answers with the same candidate (or none).
struct FixedGeocoder(Option<AddressCandidate>);

#[async_trait]
impl ReverseGeocoder for FixedGeocoder {
    fn is_available(&self) -> bool {
        true
    }

    async fn lookup(
        &self,
        _latitude: f64,
        _longitude: f64,
        _max_results: usize,
    ) -> Result<Vec<AddressCandidate>, GeocodeError> {
        Ok(self.0.clone().into_iter().collect())
    }
}

struct Online;

impl Connectivity for Online {
    fn is_online(&self) -> bool {
        true
    }
}

struct Offline;

impl Connectivity for Offline {
    fn is_online(&self) -> bool {
        false
    }
}

fn fix(provider: Provider, latitude: f64, longitude: f64, accuracy_meters: f64) -> Fix {
    Fix {
        provider,
        latitude,
        longitude,
        accuracy_meters,
        timestamp: Utc::now(),
    }
}

/// Candidate whose reverse geocode named a city.
fn city_candidate() -> AddressCandidate {
    AddressCandidate {
        country: Some("中国".to_string()),
        admin_area: Some("北京市".to_string()),
        sub_admin_area: Some("海淀区".to_string()),
        locality: Some("北京市".to_string()),
        thoroughfare: Some("中关村大街".to_string()),
        address_lines: vec!["中关村大街27号".to_string()],
        ..AddressCandidate::default()
    }
}

/// Candidate with street-level detail but no city, the IP-fallback
/// trigger.
fn city_less_candidate() -> AddressCandidate {
    AddressCandidate {
        sub_admin_area: Some("海淀区".to_string()),
        thoroughfare: Some("中关村大街".to_string()),
        address_lines: vec!["中关村大街27号".to_string()],
        ..AddressCandidate::default()
    }
}

/// IP geolocator that cannot reach anything; for flows that must never
/// take the fallback.
fn dead_ip() -> IpGeolocator {
    IpGeolocator::with_endpoint("http://127.0.0.1:9/json/").with_connectivity(Arc::new(Offline))
}

fn mock_ip(server: &MockServer) -> IpGeolocator {
    IpGeolocator::with_endpoint(&format!("{}/json/", server.uri()))
        .with_connectivity(Arc::new(Online))
}

#[tokio::test]
async fn denied_permission_registers_no_listener() {
    let source = Arc::new(FakeSource {
        providers: Provider::ALL.to_vec(),
        enabled: Provider::ALL.to_vec(),
        ..FakeSource::default()
    });
    let resolver = LocationResolver::new(
        source.clone(),
        Arc::new(FixedGeocoder(None)),
        dead_ip(),
    );

    let outcome = resolver.resolve().await.unwrap();
    assert!(matches!(outcome, LocationOutcome::PermissionDenied));
    assert_eq!(source.subscriptions.load(Ordering::SeqCst), 0);
    assert_eq!(source.cache_queries.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn disabled_providers_fail_before_any_acquisition() {
    let source = Arc::new(FakeSource::granted().with_enabled(vec![]));
    let resolver = LocationResolver::new(
        source.clone(),
        Arc::new(FixedGeocoder(None)),
        dead_ip(),
    );

    let outcome = resolver.resolve().await.unwrap();
    assert!(matches!(
        outcome,
        LocationOutcome::Failure(FailureReason::ServiceDisabled)
    ));
    assert_eq!(source.cache_queries.load(Ordering::SeqCst), 0);
    assert_eq!(source.subscriptions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn most_precise_cached_fix_wins() {
    let source = Arc::new(
        FakeSource::granted()
            .with_cached(fix(Provider::Gps, 39.90, 116.40, 20.0))
            .with_cached(fix(Provider::Network, 31.23, 121.47, 5.0)),
    );
    let resolver = LocationResolver::new(
        source.clone(),
        Arc::new(FixedGeocoder(Some(city_candidate()))),
        dead_ip(),
    );

    match resolver.resolve().await.unwrap() {
        LocationOutcome::Success {
            latitude,
            longitude,
            ..
        } => {
            assert_eq!(latitude, 31.23);
            assert_eq!(longitude, 121.47);
        }
        other => panic!("expected success, got {other:?}"),
    }
    // A cache hit skips live acquisition entirely.
    assert_eq!(source.subscriptions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn accuracy_tie_keeps_the_earlier_provider() {
    let source = Arc::new(
        FakeSource::granted()
            .with_cached(fix(Provider::Gps, 39.90, 116.40, 10.0))
            .with_cached(fix(Provider::Network, 31.23, 121.47, 10.0)),
    );
    let resolver = LocationResolver::new(
        source,
        Arc::new(FixedGeocoder(Some(city_candidate()))),
        dead_ip(),
    );

    match resolver.resolve().await.unwrap() {
        LocationOutcome::Success { latitude, .. } => assert_eq!(latitude, 39.90),
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn live_fix_resolves_when_cache_is_empty() {
    let source = Arc::new(
        FakeSource::granted()
            .held_open()
            .with_event(
                Provider::Network,
                ProviderEvent::Fix(fix(Provider::Network, 39.99, 116.32, 30.0)),
            ),
    );
    let resolver = LocationResolver::new(
        source.clone(),
        Arc::new(FixedGeocoder(Some(city_candidate()))),
        dead_ip(),
    )
    .with_fix_timeout(Duration::from_secs(5));

    match resolver.resolve().await.unwrap() {
        LocationOutcome::Success {
            latitude,
            longitude,
            ..
        } => {
            assert_eq!(latitude, 39.99);
            assert_eq!(longitude, 116.32);
        }
        other => panic!("expected success, got {other:?}"),
    }
    assert_eq!(source.subscriptions.load(Ordering::SeqCst), 2);
    // Both listeners were unregistered before the outcome came back.
    assert!(source.open_senders.lock().iter().all(|s| s.is_closed()));
}

#[tokio::test]
async fn timeout_fires_with_listeners_unregistered() {
    let source = Arc::new(FakeSource::granted().held_open());
    let resolver = LocationResolver::new(
        source.clone(),
        Arc::new(FixedGeocoder(None)),
        dead_ip(),
    )
    .with_fix_timeout(Duration::from_millis(100));

    match resolver.resolve().await.unwrap() {
        LocationOutcome::Failure(FailureReason::Timeout(window)) => {
            assert_eq!(window, Duration::from_millis(100));
        }
        other => panic!("expected timeout, got {other:?}"),
    }

    let senders = source.open_senders.lock();
    assert_eq!(senders.len(), 2);
    assert!(senders.iter().all(|s| s.is_closed()));
}

#[tokio::test]
async fn provider_going_out_of_service_preempts_the_timeout() {
    let source = Arc::new(FakeSource::granted().held_open().with_event(
        Provider::Gps,
        ProviderEvent::StatusChanged {
            provider: Provider::Gps,
            status: ProviderStatus::OutOfService,
        },
    ));
    let resolver = LocationResolver::new(
        source,
        Arc::new(FixedGeocoder(None)),
        dead_ip(),
    )
    .with_fix_timeout(Duration::from_secs(30));

    // Bounded wait: if the status event did not preempt, the 30s window
    // would blow through this.
    let outcome = tokio::time::timeout(Duration::from_secs(2), resolver.resolve())
        .await
        .expect("status change should preempt the timeout")
        .unwrap();
    assert!(matches!(
        outcome,
        LocationOutcome::Failure(FailureReason::ProviderUnavailable(Provider::Gps))
    ));
}

#[tokio::test]
async fn temporarily_unavailable_status_also_fails() {
    let source = Arc::new(FakeSource::granted().held_open().with_event(
        Provider::Network,
        ProviderEvent::StatusChanged {
            provider: Provider::Network,
            status: ProviderStatus::TemporarilyUnavailable,
        },
    ));
    let resolver = LocationResolver::new(
        source,
        Arc::new(FixedGeocoder(None)),
        dead_ip(),
    )
    .with_fix_timeout(Duration::from_secs(30));

    let outcome = tokio::time::timeout(Duration::from_secs(2), resolver.resolve())
        .await
        .expect("status change should preempt the timeout")
        .unwrap();
    assert!(matches!(
        outcome,
        LocationOutcome::Failure(FailureReason::ProviderUnavailable(Provider::Network))
    ));
}

#[tokio::test]
async fn subscribe_failure_surfaces_as_source_failure() {
    let source = Arc::new(FakeSource {
        fail_subscribe: Some("gps hardware fault"),
        ..FakeSource::granted()
    });
    let resolver = LocationResolver::new(
        source,
        Arc::new(FixedGeocoder(None)),
        dead_ip(),
    );

    match resolver.resolve().await.unwrap() {
        LocationOutcome::Failure(FailureReason::Source(message)) => {
            assert!(message.contains("gps hardware fault"));
        }
        other => panic!("expected source failure, got {other:?}"),
    }
}

#[tokio::test]
async fn permission_revoked_at_subscribe_is_permission_denied() {
    let source = Arc::new(FakeSource {
        deny_subscribe: true,
        ..FakeSource::granted()
    });
    let resolver = LocationResolver::new(
        source,
        Arc::new(FixedGeocoder(None)),
        dead_ip(),
    );

    let outcome = resolver.resolve().await.unwrap();
    assert!(matches!(outcome, LocationOutcome::PermissionDenied));
}

#[tokio::test]
async fn empty_city_triggers_ip_fallback_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "success",
            "country": "中国",
            "regionName": "上海市",
            "city": "上海市"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let source = Arc::new(FakeSource::granted().with_event(
        Provider::Network,
        ProviderEvent::Fix(fix(Provider::Network, 31.23, 121.47, 15.0)),
    ));
    let resolver = LocationResolver::new(
        source,
        Arc::new(FixedGeocoder(Some(city_less_candidate()))),
        mock_ip(&server),
    );

    match resolver.resolve().await.unwrap() {
        LocationOutcome::Success { address, .. } => {
            // Region fields come from the IP lookup...
            assert_eq!(address.country.as_deref(), Some("中国"));
            assert_eq!(address.province.as_deref(), Some("上海市"));
            assert_eq!(address.city.as_deref(), Some("上海市"));
            // ...street-level fields keep the reverse-geocode values.
            assert_eq!(address.district.as_deref(), Some("海淀区"));
            assert_eq!(address.street.as_deref(), Some("中关村大街"));
            assert_eq!(address.detail_address.as_deref(), Some("中关村大街27号"));
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn present_city_skips_the_ip_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let source = Arc::new(FakeSource::granted().with_cached(fix(
        Provider::Gps,
        39.90,
        116.40,
        8.0,
    )));
    let resolver = LocationResolver::new(
        source,
        Arc::new(FixedGeocoder(Some(city_candidate()))),
        mock_ip(&server),
    );

    match resolver.resolve().await.unwrap() {
        LocationOutcome::Success { address, .. } => {
            assert_eq!(address.city.as_deref(), Some("北京市"));
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_ip_fallback_still_delivers_the_partial_address() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/json/"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let source = Arc::new(FakeSource::granted().with_cached(fix(
        Provider::Network,
        31.23,
        121.47,
        15.0,
    )));
    let resolver = LocationResolver::new(
        source,
        Arc::new(FixedGeocoder(Some(city_less_candidate()))),
        mock_ip(&server),
    );

    match resolver.resolve().await.unwrap() {
        LocationOutcome::Success { address, .. } => {
            assert!(address.city.is_none());
            assert_eq!(address.district.as_deref(), Some("海淀区"));
            assert_eq!(address.street.as_deref(), Some("中关村大街"));
        }
        other => panic!("expected success, got {other:?}"),
    }
}

#[tokio::test]
async fn overlapping_resolve_is_rejected_busy() {
    let source = Arc::new(FakeSource::granted().held_open());
    let resolver = Arc::new(
        LocationResolver::new(source, Arc::new(FixedGeocoder(None)), dead_ip())
            .with_fix_timeout(Duration::from_millis(300)),
    );

    let first = tokio::spawn({
        let resolver = resolver.clone();
        async move { resolver.resolve().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(resolver.resolve().await.unwrap_err(), ResolveError::Busy);

    // The first request still runs to its own terminal outcome.
    let outcome = first.await.unwrap().unwrap();
    assert!(matches!(
        outcome,
        LocationOutcome::Failure(FailureReason::Timeout(_))
    ));
}

#[tokio::test]
async fn release_ends_an_in_flight_resolve() {
    let source = Arc::new(FakeSource::granted().held_open());
    let resolver = Arc::new(
        LocationResolver::new(source.clone(), Arc::new(FixedGeocoder(None)), dead_ip())
            .with_fix_timeout(Duration::from_secs(30)),
    );

    let task = tokio::spawn({
        let resolver = resolver.clone();
        async move { resolver.resolve().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    resolver.release();

    let result = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("release should end the request promptly")
        .unwrap();
    assert_eq!(result.unwrap_err(), ResolveError::Released);
    assert!(source.open_senders.lock().iter().all(|s| s.is_closed()));
}

#[tokio::test]
async fn release_is_idempotent_and_final() {
    let source = Arc::new(FakeSource::granted());
    let resolver = LocationResolver::new(source, Arc::new(FixedGeocoder(None)), dead_ip());

    resolver.release();
    resolver.release();

    assert_eq!(resolver.resolve().await.unwrap_err(), ResolveError::Released);
}
