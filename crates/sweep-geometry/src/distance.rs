//! Geodesic distance helpers over the WGS84 ellipsoid (Karney's algorithm via
//! `geo::Geodesic`), never haversine — spec §3 is explicit that edge and
//! route lengths are geodesic, not great-circle-sphere approximations.
//! Haversine is reserved for the Oracle's straight-line fallback (spec §4.6),
//! which the original worker computes that way too.

use geo::{Distance, Geodesic, HaversineDistance, Length, LineString, Point};

pub fn geodesic_distance_m(a: Coord, b: Coord) -> f64 {
    Geodesic.distance(Point::from(a), Point::from(b))
}

pub fn haversine_distance_m(a: Coord, b: Coord) -> f64 {
    Point::from(a).haversine_distance(&Point::from(b))
}

/// Sum of consecutive geodesic segment lengths along `line`.
pub fn geodesic_length_m(line: &LineString<f64>) -> f64 {
    line.length::<Geodesic>()
}

pub use geo::Coord;
