//! Local metric projection used to get meter-accurate intersection geometry
//! out of an otherwise decimal-degree world.
//!
//! Spec §4.1 step 2: pick a UTM zone from the centroid of the input and
//! project/unproject every coordinate through it. Good for areas up to a
//! few tens of km across (spec §9); beyond that a local azimuthal
//! equidistant projection would be the next step, but UTM is what this
//! planner ships.

use geo::{Coord, LineString};

/// A UTM zone anchored to a center point, used to project WGS84 coordinates
/// to meters and back for the duration of `GraphBuilder`'s intersection pass.
#[derive(Debug, Clone, Copy)]
pub struct LocalProjection {
    zone: u8,
    northern: bool,
}

impl LocalProjection {
    /// Pick the UTM zone containing `center` (lon, lat).
    pub fn for_center(center: Coord<f64>) -> Self {
        let zone = (((center.x + 180.0) / 6.0).floor() as i64 + 1).clamp(1, 60) as u8;
        Self {
            zone,
            northern: center.y >= 0.0,
        }
    }

    /// Mean of all vertices across every input line, used as the projection
    /// center when the caller supplies no explicit one.
    pub fn centroid_of(lines: &[LineString<f64>]) -> Coord<f64> {
        let mut sum = Coord { x: 0.0, y: 0.0 };
        let mut n = 0usize;
        for line in lines {
            for c in line.coords() {
                sum.x += c.x;
                sum.y += c.y;
                n += 1;
            }
        }
        if n == 0 {
            return Coord { x: 0.0, y: 0.0 };
        }
        Coord {
            x: sum.x / n as f64,
            y: sum.y / n as f64,
        }
    }

    /// Project a (lon, lat) coordinate to (easting, northing) meters.
    pub fn project(&self, coord: Coord<f64>) -> Coord<f64> {
        let (northing, easting, _convergence) = utm::to_utm_wgs84(coord.y, coord.x, self.zone);
        Coord {
            x: easting,
            y: northing,
        }
    }

    /// Inverse of [`Self::project`]: meters back to (lon, lat).
    pub fn unproject(&self, coord: Coord<f64>) -> Coord<f64> {
        let (lat, lon) = utm::wsg84_utm_to_lat_lon(coord.y, coord.x, self.zone, self.northern)
            .expect("unprojecting a point this projection itself produced");
        Coord { x: lon, y: lat }
    }

    pub fn project_line(&self, line: &LineString<f64>) -> LineString<f64> {
        LineString::new(line.coords().map(|c| self.project(*c)).collect())
    }

    pub fn unproject_line(&self, line: &LineString<f64>) -> LineString<f64> {
        LineString::new(line.coords().map(|c| self.unproject(*c)).collect())
    }
}
