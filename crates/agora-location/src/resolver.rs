//! Location resolution orchestrator.
//!
//! Drives one request through permission and provider checks, cached or
//! live fix acquisition, reverse geocoding, and the IP fallback, ending
//! in exactly one terminal outcome.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{ResolveError, SourceError};
use crate::geocode::{AddressResolver, ReverseGeocoder};
use crate::ipgeo::IpGeolocator;
use crate::source::LocationSource;
use crate::types::{FailureReason, Fix, LocationOutcome, Provider, ProviderEvent};

/// Default window for live fix acquisition.
pub const DEFAULT_FIX_TIMEOUT: Duration = Duration::from_secs(5);

/// Request lifecycle state for serializing resolutions.
///
/// One request per resolver instance at a time; `Released` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum RequestState {
    #[default]
    Idle,
    Busy,
    Released,
}

/// Restores `Idle` when a request ends, however it ends.
///
/// Runs on drop, so a caller abandoning the `resolve` future mid-flight
/// still frees the slot. `Released` stays put.
struct RequestGuard<'a> {
    state: &'a Mutex<RequestState>,
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if *state == RequestState::Busy {
            *state = RequestState::Idle;
        }
    }
}

/// Resolves the device position to coordinates plus a structured address.
///
/// All platform capabilities are injected at construction; the resolver
/// itself holds no global state.
pub struct LocationResolver {
    source: Arc<dyn LocationSource>,
    address_resolver: AddressResolver,
    ip_geolocator: IpGeolocator,
    fix_timeout: Duration,
    state: Mutex<RequestState>,
    cancel: CancellationToken,
}

impl LocationResolver {
    pub fn new(
        source: Arc<dyn LocationSource>,
        geocoder: Arc<dyn ReverseGeocoder>,
        ip_geolocator: IpGeolocator,
    ) -> Self {
        Self {
            source,
            address_resolver: AddressResolver::new(geocoder),
            ip_geolocator,
            fix_timeout: DEFAULT_FIX_TIMEOUT,
            state: Mutex::new(RequestState::default()),
            cancel: CancellationToken::new(),
        }
    }

    /// Override the live-acquisition window.
    pub fn with_fix_timeout(mut self, fix_timeout: Duration) -> Self {
        self.fix_timeout = fix_timeout;
        self
    }

    /// Resolve the current position.
    ///
    /// Runs the whole chain and returns exactly one terminal
    /// [`LocationOutcome`]. `Err(Busy)` and `Err(Released)` mean the
    /// request never started, so no outcome is owed for it.
    #[instrument(skip(self), level = "info")]
    pub async fn resolve(&self) -> Result<LocationOutcome, ResolveError> {
        let _guard = self.begin()?;
        tokio::select! {
            () = self.cancel.cancelled() => Err(ResolveError::Released),
            outcome = self.run() => Ok(outcome),
        }
    }

    /// Tear the resolver down.
    ///
    /// Any in-flight `resolve` returns `Err(Released)` and its listeners
    /// unregister as the future drops; later calls fail the same way.
    /// Safe to call more than once.
    pub fn release(&self) {
        {
            let mut state = self.state.lock();
            *state = RequestState::Released;
        }
        self.cancel.cancel();
    }

    fn begin(&self) -> Result<RequestGuard<'_>, ResolveError> {
        let mut state = self.state.lock();
        match *state {
            RequestState::Idle => {
                *state = RequestState::Busy;
                Ok(RequestGuard { state: &self.state })
            }
            RequestState::Busy => Err(ResolveError::Busy),
            RequestState::Released => Err(ResolveError::Released),
        }
    }

    async fn run(&self) -> LocationOutcome {
        if !self.source.has_permission() {
            info!("location permission not granted");
            return LocationOutcome::PermissionDenied;
        }

        let enabled: Vec<Provider> = Provider::ALL
            .iter()
            .copied()
            .filter(|p| self.source.is_enabled(*p))
            .collect();
        if enabled.is_empty() {
            info!("no positioning provider enabled");
            return LocationOutcome::Failure(FailureReason::ServiceDisabled);
        }

        let fix = match self.best_cached_fix().await {
            Some(fix) => fix,
            None => match self.live_fix(&enabled).await {
                Ok(fix) => fix,
                Err(outcome) => return outcome,
            },
        };

        self.finish(fix).await
    }

    /// Most precise cached fix across providers.
    ///
    /// Strictly smaller accuracy wins; ties keep the earlier provider.
    async fn best_cached_fix(&self) -> Option<Fix> {
        let mut best: Option<Fix> = None;
        for provider in self.source.providers() {
            if let Some(fix) = self.source.last_known_fix(provider).await {
                let better = match &best {
                    Some(current) => fix.accuracy_meters < current.accuracy_meters,
                    None => true,
                };
                if better {
                    best = Some(fix);
                }
            }
        }
        if let Some(fix) = &best {
            debug!(
                "using cached fix from {} ({}m accuracy)",
                fix.provider, fix.accuracy_meters
            );
        }
        best
    }

    /// Wait for the first event from any enabled provider, bounded by
    /// the fix timeout.
    ///
    /// The receivers are locals of this future, so every exit path drops
    /// them, which unregisters the platform listeners before the outcome
    /// escapes. A provider reporting after that is a no-op.
    async fn live_fix(&self, enabled: &[Provider]) -> Result<Fix, LocationOutcome> {
        let mut gps: Option<mpsc::Receiver<ProviderEvent>> = None;
        let mut network: Option<mpsc::Receiver<ProviderEvent>> = None;
        for provider in enabled {
            let rx = match self.source.subscribe(*provider).await {
                Ok(rx) => Some(rx),
                Err(SourceError::PermissionDenied) => {
                    return Err(LocationOutcome::PermissionDenied);
                }
                Err(SourceError::Unavailable(message)) => {
                    warn!("subscription to {} failed: {}", provider, message);
                    return Err(LocationOutcome::Failure(FailureReason::Source(message)));
                }
            };
            match provider {
                Provider::Gps => gps = rx,
                Provider::Network => network = rx,
            }
        }

        let deadline = tokio::time::sleep(self.fix_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                () = &mut deadline => {
                    warn!("no fix within {:?}", self.fix_timeout);
                    return Err(LocationOutcome::Failure(FailureReason::Timeout(
                        self.fix_timeout,
                    )));
                }
                event = next_event(&mut gps) => match event {
                    Some(event) => {
                        if let Some(fix) = handle_event(event)? {
                            return Ok(fix);
                        }
                    }
                    None => gps = None,
                },
                event = next_event(&mut network) => match event {
                    Some(event) => {
                        if let Some(fix) = handle_event(event)? {
                            return Ok(fix);
                        }
                    }
                    None => network = None,
                },
            }
        }
    }

    /// Reverse geocode the fix, backfill the region from the caller's
    /// public IP when no city came back, and wrap up as `Success`.
    async fn finish(&self, fix: Fix) -> LocationOutcome {
        let mut address = self
            .address_resolver
            .resolve(fix.latitude, fix.longitude)
            .await;

        if !address.has_city() {
            match self.ip_geolocator.lookup().await {
                Ok(region) => {
                    debug!("backfilled region from ip: {}", region.city);
                    address.apply_region(region);
                }
                Err(e) => warn!("ip fallback failed: {}", e),
            }
        }

        LocationOutcome::Success {
            latitude: fix.latitude,
            longitude: fix.longitude,
            address,
        }
    }
}

/// Poll an optional receiver. A missing receiver never resolves, so a
/// closed or never-opened channel silently drops out of the race while
/// the deadline keeps running.
async fn next_event(rx: &mut Option<mpsc::Receiver<ProviderEvent>>) -> Option<ProviderEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// One event step: a fix wins, an unusable status fails the request,
/// anything else keeps waiting.
fn handle_event(event: ProviderEvent) -> Result<Option<Fix>, LocationOutcome> {
    match event {
        ProviderEvent::Fix(fix) => {
            debug!(
                "live fix from {} ({}m accuracy)",
                fix.provider, fix.accuracy_meters
            );
            Ok(Some(fix))
        }
        ProviderEvent::StatusChanged { provider, status } if !status.is_usable() => {
            warn!("provider {} became unavailable ({:?})", provider, status);
            Err(LocationOutcome::Failure(FailureReason::ProviderUnavailable(
                provider,
            )))
        }
        ProviderEvent::StatusChanged { provider, status } => {
            debug!("provider {} status: {:?}", provider, status);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderStatus;

    #[test]
    fn guard_restores_idle_on_drop() {
        let state = Mutex::new(RequestState::Busy);
        drop(RequestGuard { state: &state });
        assert_eq!(*state.lock(), RequestState::Idle);
    }

    #[test]
    fn guard_leaves_released_alone() {
        let state = Mutex::new(RequestState::Released);
        drop(RequestGuard { state: &state });
        assert_eq!(*state.lock(), RequestState::Released);
    }

    #[test]
    fn fix_event_wins() {
        let fix = Fix {
            provider: Provider::Gps,
            latitude: 1.0,
            longitude: 2.0,
            accuracy_meters: 10.0,
            timestamp: chrono::Utc::now(),
        };
        let result = handle_event(ProviderEvent::Fix(fix));
        assert!(matches!(result, Ok(Some(_))));
    }

    #[test]
    fn unusable_status_fails_the_request() {
        let result = handle_event(ProviderEvent::StatusChanged {
            provider: Provider::Network,
            status: ProviderStatus::OutOfService,
        });
        match result {
            Err(LocationOutcome::Failure(FailureReason::ProviderUnavailable(p))) => {
                assert_eq!(p, Provider::Network);
            }
            other => panic!("expected provider-unavailable failure, got {other:?}"),
        }
    }

    #[test]
    fn usable_status_keeps_waiting() {
        let result = handle_event(ProviderEvent::StatusChanged {
            provider: Provider::Gps,
            status: ProviderStatus::Available,
        });
        assert!(matches!(result, Ok(None)));
    }
}
