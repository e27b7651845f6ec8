//! The routing oracle contract (spec §4.6) and its implementations:
//! `HttpOracle` against a real ORS-shaped service, `NullOracle` for tests
//! and the zero-configuration default, `FixtureOracle` for deterministic
//! integration tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use geo::Coord;
use rand::Rng;
use reqwest::{Client, StatusCode};
use sweep_common::Profile;
use sweep_geometry::{geodesic_length_m, haversine_distance_m};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cache::{Cache, DEFAULT_TTL};
use crate::wire::{
    decode_route_geometry, matrix_cache_key, route_cache_key, MatrixRequest, MatrixResponse, RouteRequest,
    RouteResponse,
};

/// Result of a single `Oracle::route` call. `used_fallback` is set whenever
/// the oracle gave up and returned an endpoints-only straight line instead
/// of a driveable polyline — transient failures never escape as `Err`
/// (spec §7's propagation rule); they show up here instead, so the caller
/// can bump `Diagnostics` counters.
#[derive(Debug, Clone)]
pub struct OracleResult {
    pub geometry: Vec<Coord<f64>>,
    pub length_m: f64,
    pub used_fallback: bool,
}

#[derive(Debug, Clone)]
pub struct MatrixResult {
    pub distances: Vec<Vec<f64>>,
    pub used_fallback: bool,
}

#[async_trait]
pub trait Oracle: Send + Sync {
    async fn route(
        &self,
        start: Coord<f64>,
        end: Coord<f64>,
        profile: Profile,
        cancel: &CancellationToken,
    ) -> OracleResult;

    async fn matrix(
        &self,
        locations: &[Coord<f64>],
        profile: Profile,
        cancel: &CancellationToken,
    ) -> MatrixResult;
}

fn straight_line(start: Coord<f64>, end: Coord<f64>) -> OracleResult {
    OracleResult {
        geometry: vec![start, end],
        length_m: haversine_distance_m(start, end),
        used_fallback: true,
    }
}

fn haversine_matrix(locations: &[Coord<f64>]) -> MatrixResult {
    let n = locations.len();
    let mut distances = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            if i != j {
                distances[i][j] = haversine_distance_m(locations[i], locations[j]);
            }
        }
    }
    MatrixResult {
        distances,
        used_fallback: true,
    }
}

/// Always returns the straight-line/haversine fallback. Legitimate as the
/// zero-configuration default and in unit tests that don't care about
/// actual routed geometry.
#[derive(Default)]
pub struct NullOracle;

#[async_trait]
impl Oracle for NullOracle {
    async fn route(
        &self,
        start: Coord<f64>,
        end: Coord<f64>,
        _profile: Profile,
        _cancel: &CancellationToken,
    ) -> OracleResult {
        straight_line(start, end)
    }

    async fn matrix(
        &self,
        locations: &[Coord<f64>],
        _profile: Profile,
        _cancel: &CancellationToken,
    ) -> MatrixResult {
        haversine_matrix(locations)
    }
}

/// Deterministic oracle wired to canned responses, keyed by rounded
/// (start, end) pairs. Used by integration tests that need a specific,
/// reproducible connector geometry rather than a plain straight line.
#[derive(Default)]
pub struct FixtureOracle {
    routes: HashMap<(OrderedCoord, OrderedCoord), Vec<Coord<f64>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct OrderedCoord(i64, i64);

impl From<Coord<f64>> for OrderedCoord {
    fn from(c: Coord<f64>) -> Self {
        Self((c.x * 1e7).round() as i64, (c.y * 1e7).round() as i64)
    }
}

impl FixtureOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, start: Coord<f64>, end: Coord<f64>, geometry: Vec<Coord<f64>>) -> Self {
        self.routes.insert((start.into(), end.into()), geometry);
        self
    }
}

#[async_trait]
impl Oracle for FixtureOracle {
    async fn route(
        &self,
        start: Coord<f64>,
        end: Coord<f64>,
        _profile: Profile,
        _cancel: &CancellationToken,
    ) -> OracleResult {
        match self.routes.get(&(start.into(), end.into())) {
            Some(geometry) => {
                let line = geo::LineString::new(geometry.clone());
                OracleResult {
                    geometry: geometry.clone(),
                    length_m: geodesic_length_m(&line),
                    used_fallback: false,
                }
            }
            None => straight_line(start, end),
        }
    }

    async fn matrix(
        &self,
        locations: &[Coord<f64>],
        _profile: Profile,
        _cancel: &CancellationToken,
    ) -> MatrixResult {
        haversine_matrix(locations)
    }
}

/// HTTP oracle against an ORS-shaped routing service (spec §6 wire
/// contract). Bounded retries with exponential backoff plus jitter,
/// `Retry-After` honored on 429, straight-line fallback on exhaustion —
/// grounded in `src/core/downloader.rs::retry_on_network_error`.
pub struct HttpOracle {
    client: Client,
    base_url: String,
    timeout: Duration,
    max_retries: u32,
    base_delay: Duration,
}

impl HttpOracle {
    pub fn new(base_url: impl Into<String>, timeout: Duration, max_retries: u32, base_delay: Duration) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            timeout,
            max_retries,
            base_delay,
        }
    }

    pub fn from_config(base_url: impl Into<String>, cfg: &sweep_common::Config) -> Self {
        Self::new(
            base_url,
            cfg.ors_timeout_duration(),
            cfg.ors_max_retries,
            Duration::from_secs_f64(cfg.ors_retry_delay),
        )
    }

    async fn post_with_retry(
        &self,
        path: &str,
        body: &impl serde::Serialize,
        cancel: &CancellationToken,
    ) -> Result<String, ()> {
        let mut attempt = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(());
            }
            let result = self
                .client
                .post(format!("{}{path}", self.base_url))
                .json(body)
                .timeout(self.timeout)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    return resp.text().await.map_err(|e| {
                        warn!(error = %e, "oracle response body read failed");
                    });
                }
                Ok(resp) if resp.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let retry_after = resp
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                        .map(Duration::from_secs);
                    if attempt >= self.max_retries {
                        warn!("oracle retries exhausted after 429");
                        return Err(());
                    }
                    let delay = retry_after.unwrap_or_else(|| self.backoff_delay(attempt));
                    attempt += 1;
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(()),
                    }
                }
                Ok(resp) if resp.status().is_server_error() => {
                    if attempt >= self.max_retries {
                        warn!(status = %resp.status(), "oracle retries exhausted after server error");
                        return Err(());
                    }
                    let delay = self.backoff_delay(attempt);
                    attempt += 1;
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(()),
                    }
                }
                Ok(resp) => {
                    warn!(status = %resp.status(), "oracle returned a non-retryable error status");
                    return Err(());
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    if attempt >= self.max_retries {
                        warn!(error = %e, "oracle retries exhausted after transient network error");
                        return Err(());
                    }
                    let delay = self.backoff_delay(attempt);
                    attempt += 1;
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = cancel.cancelled() => return Err(()),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "oracle request failed non-transiently");
                    return Err(());
                }
            }
        }
    }

    /// Exponential backoff with full jitter: `base * 2^attempt`, randomized
    /// uniformly in `[0, computed)`.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let computed = self.base_delay.as_secs_f64() * 2f64.powi(attempt as i32);
        let jittered = rand::thread_rng().gen_range(0.0..computed.max(0.001));
        Duration::from_secs_f64(jittered)
    }
}

#[async_trait]
impl Oracle for HttpOracle {
    async fn route(
        &self,
        start: Coord<f64>,
        end: Coord<f64>,
        profile: Profile,
        cancel: &CancellationToken,
    ) -> OracleResult {
        let request = RouteRequest {
            coordinates: vec![[start.x, start.y], [end.x, end.y]],
            profile: profile.as_str(),
        };
        let Ok(body) = self.post_with_retry("/v2/directions", &request, cancel).await else {
            return straight_line(start, end);
        };
        let Ok(parsed) = serde_json::from_str::<RouteResponse>(&body) else {
            warn!("oracle response did not parse as expected route envelope");
            return straight_line(start, end);
        };
        let Some(route) = parsed.routes.into_iter().next() else {
            return straight_line(start, end);
        };
        match decode_route_geometry(&route.geometry) {
            Ok(geometry) if geometry.len() >= 2 => OracleResult {
                geometry,
                length_m: route.summary.distance,
                used_fallback: false,
            },
            _ => straight_line(start, end),
        }
    }

    async fn matrix(
        &self,
        locations: &[Coord<f64>],
        profile: Profile,
        cancel: &CancellationToken,
    ) -> MatrixResult {
        let request = MatrixRequest {
            locations: locations.iter().map(|c| [c.x, c.y]).collect(),
            profile: profile.as_str(),
        };
        let Ok(body) = self.post_with_retry("/v2/matrix", &request, cancel).await else {
            return haversine_matrix(locations);
        };
        match serde_json::from_str::<MatrixResponse>(&body) {
            Ok(parsed) if parsed.distances.len() == locations.len() => MatrixResult {
                distances: parsed.distances,
                used_fallback: false,
            },
            _ => haversine_matrix(locations),
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct CachedRoute {
    geometry: Vec<(f64, f64)>,
    length_m: f64,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct CachedMatrix {
    distances: Vec<Vec<f64>>,
}

/// Wraps any `Oracle` with a content-addressed `Cache` in front of it (spec
/// §4.6), mirroring `ors_client.py`'s cache-check-then-request-then-populate
/// shape. Cache misses and cache errors are non-fatal — a cache that can't
/// be read or written just means every call falls through to `inner`.
/// Results that already used a fallback (no real oracle reachable) are
/// never cached, so a transient outage doesn't poison later lookups.
pub struct CachedOracle<O, C> {
    inner: O,
    cache: C,
    ttl: std::time::Duration,
}

impl<O: Oracle, C: Cache> CachedOracle<O, C> {
    pub fn new(inner: O, cache: C) -> Self {
        Self {
            inner,
            cache,
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

#[async_trait]
impl<O: Oracle, C: Cache> Oracle for CachedOracle<O, C> {
    async fn route(
        &self,
        start: Coord<f64>,
        end: Coord<f64>,
        profile: Profile,
        cancel: &CancellationToken,
    ) -> OracleResult {
        let key = route_cache_key(start, end, profile);
        if let Some(raw) = self.cache.get(&key).await {
            if let Ok(cached) = serde_json::from_str::<CachedRoute>(&raw) {
                return OracleResult {
                    geometry: cached.geometry.into_iter().map(|(x, y)| Coord { x, y }).collect(),
                    length_m: cached.length_m,
                    used_fallback: false,
                };
            }
            warn!("cached route entry failed to deserialize, falling through to oracle");
        }

        let result = self.inner.route(start, end, profile, cancel).await;
        if !result.used_fallback {
            let cached = CachedRoute {
                geometry: result.geometry.iter().map(|c| (c.x, c.y)).collect(),
                length_m: result.length_m,
            };
            if let Ok(raw) = serde_json::to_string(&cached) {
                self.cache.set(&key, raw, self.ttl).await;
            }
        }
        result
    }

    async fn matrix(
        &self,
        locations: &[Coord<f64>],
        profile: Profile,
        cancel: &CancellationToken,
    ) -> MatrixResult {
        let key = matrix_cache_key(locations, profile);
        if let Some(raw) = self.cache.get(&key).await {
            if let Ok(cached) = serde_json::from_str::<CachedMatrix>(&raw) {
                return MatrixResult {
                    distances: cached.distances,
                    used_fallback: false,
                };
            }
            warn!("cached matrix entry failed to deserialize, falling through to oracle");
        }

        let result = self.inner.matrix(locations, profile, cancel).await;
        if !result.used_fallback {
            let cached = CachedMatrix {
                distances: result.distances.clone(),
            };
            if let Ok(raw) = serde_json::to_string(&cached) {
                self.cache.set(&key, raw, self.ttl).await;
            }
        }
        result
    }
}

pub type SharedOracle = Arc<dyn Oracle>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_oracle_returns_straight_line() {
        let oracle = NullOracle;
        let result = oracle
            .route(
                Coord { x: 0.0, y: 0.0 },
                Coord { x: 0.001, y: 0.0 },
                Profile::DrivingCar,
                &CancellationToken::new(),
            )
            .await;
        assert!(result.used_fallback);
        assert_eq!(result.geometry.len(), 2);
        assert!(result.length_m > 0.0);
    }

    #[tokio::test]
    async fn fixture_oracle_returns_canned_route() {
        let start = Coord { x: 0.0, y: 0.0 };
        let end = Coord { x: 0.002, y: 0.0 };
        let geometry = vec![start, Coord { x: 0.001, y: 0.0005 }, end];
        let oracle = FixtureOracle::new().with_route(start, end, geometry.clone());
        let result = oracle
            .route(start, end, Profile::DrivingCar, &CancellationToken::new())
            .await;
        assert!(!result.used_fallback);
        assert_eq!(result.geometry, geometry);
    }

    #[tokio::test]
    async fn fixture_oracle_falls_back_for_unknown_pair() {
        let oracle = FixtureOracle::new();
        let result = oracle
            .route(
                Coord { x: 0.0, y: 0.0 },
                Coord { x: 1.0, y: 1.0 },
                Profile::DrivingCar,
                &CancellationToken::new(),
            )
            .await;
        assert!(result.used_fallback);
    }

    // Canonical Google-polyline encoding example (precision 5) of three
    // points, used here purely as a known-good wire fixture.
    const SAMPLE_POLYLINE: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";

    #[tokio::test]
    async fn http_oracle_decodes_a_successful_route_response() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        let body = serde_json::json!({
            "routes": [{
                "summary": {"distance": 4321.0},
                "geometry": SAMPLE_POLYLINE,
            }]
        });
        Mock::given(method("POST"))
            .and(path("/v2/directions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .mount(&server)
            .await;

        let oracle = HttpOracle::new(server.uri(), Duration::from_secs(5), 3, Duration::from_millis(1));
        let result = oracle
            .route(
                Coord { x: 0.0, y: 0.0 },
                Coord { x: 1.0, y: 1.0 },
                Profile::DrivingCar,
                &CancellationToken::new(),
            )
            .await;

        assert!(!result.used_fallback);
        assert_eq!(result.length_m, 4321.0);
        assert_eq!(result.geometry.len(), 3);
    }

    #[tokio::test]
    async fn http_oracle_falls_back_to_straight_line_after_exhausting_retries() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/directions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let oracle = HttpOracle::new(server.uri(), Duration::from_secs(5), 1, Duration::from_millis(1));
        let start = Coord { x: 0.0, y: 0.0 };
        let end = Coord { x: 0.001, y: 0.0 };
        let result = oracle
            .route(start, end, Profile::DrivingCar, &CancellationToken::new())
            .await;

        assert!(result.used_fallback);
        assert_eq!(result.geometry, vec![start, end]);
    }

    #[derive(Default)]
    struct CountingOracle {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl Oracle for CountingOracle {
        async fn route(
            &self,
            start: Coord<f64>,
            end: Coord<f64>,
            _profile: Profile,
            _cancel: &CancellationToken,
        ) -> OracleResult {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            OracleResult {
                geometry: vec![start, Coord { x: (start.x + end.x) / 2.0, y: (start.y + end.y) / 2.0 }, end],
                length_m: geodesic_length_m(&geo::LineString::new(vec![start, end])),
                used_fallback: false,
            }
        }

        async fn matrix(
            &self,
            locations: &[Coord<f64>],
            _profile: Profile,
            _cancel: &CancellationToken,
        ) -> MatrixResult {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            haversine_matrix(locations)
        }
    }

    #[tokio::test]
    async fn cached_oracle_only_calls_inner_once_per_key() {
        use crate::cache::InMemoryCache;

        let oracle = CachedOracle::new(CountingOracle::default(), InMemoryCache::new());
        let start = Coord { x: 0.0, y: 0.0 };
        let end = Coord { x: 0.01, y: 0.0 };
        let cancel = CancellationToken::new();

        let first = oracle.route(start, end, Profile::DrivingCar, &cancel).await;
        let second = oracle.route(start, end, Profile::DrivingCar, &cancel).await;

        assert_eq!(oracle.inner.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(first.geometry, second.geometry);
        assert!(!second.used_fallback);
    }

    #[tokio::test]
    async fn cached_oracle_never_caches_a_fallback_result() {
        use crate::cache::InMemoryCache;

        let oracle = CachedOracle::new(NullOracle, InMemoryCache::new());
        let start = Coord { x: 0.0, y: 0.0 };
        let end = Coord { x: 0.01, y: 0.0 };
        let cancel = CancellationToken::new();

        oracle.route(start, end, Profile::DrivingCar, &cancel).await;
        let key = route_cache_key(start, end, Profile::DrivingCar);
        assert!(oracle.cache.get(&key).await.is_none());
    }
}
