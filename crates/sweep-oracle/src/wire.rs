//! The Oracle's wire contract (spec §6): POST JSON `{coordinates, profile}`,
//! response `routes[0].summary.distance` (meters) and `routes[0].geometry`
//! (precision-5 encoded polyline, lat-first — decoded by the `polyline`
//! crate into (lon, lat) points). Matrix responses carry `distances[i][j]`.

use geo::Coord;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use sweep_common::Profile;

pub const POLYLINE_PRECISION: u32 = 5;

#[derive(Debug, Serialize)]
pub struct RouteRequest<'a> {
    pub coordinates: Vec<[f64; 2]>,
    pub profile: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct RouteResponse {
    pub routes: Vec<RouteSummaryEnvelope>,
}

#[derive(Debug, Deserialize)]
pub struct RouteSummaryEnvelope {
    pub summary: RouteSummary,
    pub geometry: String,
}

#[derive(Debug, Deserialize)]
pub struct RouteSummary {
    pub distance: f64,
}

#[derive(Debug, Serialize)]
pub struct MatrixRequest<'a> {
    pub locations: Vec<[f64; 2]>,
    pub profile: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct MatrixResponse {
    pub distances: Vec<Vec<f64>>,
}

pub fn decode_route_geometry(encoded: &str) -> Result<Vec<Coord<f64>>, String> {
    polyline::decode_polyline(encoded, POLYLINE_PRECISION).map(|ls| ls.0)
}

/// Content-addressed cache key over `(start, end, profile)`, mirroring
/// `ors_client.py::_cache_key`. Coordinates are formatted with fixed
/// precision so floating-point jitter in two callers' representations of
/// "the same point" still hashes identically.
pub fn route_cache_key(start: Coord<f64>, end: Coord<f64>, profile: Profile) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!(
        "route:{:.7},{:.7}:{:.7},{:.7}:{}",
        start.x, start.y, end.x, end.y, profile
    ));
    hex::encode(hasher.finalize())
}

pub fn matrix_cache_key(locations: &[Coord<f64>], profile: Profile) -> String {
    let mut hasher = Sha1::new();
    hasher.update(b"matrix:");
    for loc in locations {
        hasher.update(format!("{:.7},{:.7};", loc.x, loc.y));
    }
    hasher.update(profile.as_str());
    hex::encode(hasher.finalize())
}
