//! Slices a finished route into time-bounded chunks (spec §4.5).

use geo::{Coord, LineString};
use sweep_geometry::geodesic_distance_m;

use crate::types::Chunk;

/// Accumulates geodesic length/time along consecutive points, closing a
/// chunk once accumulated time reaches `chunk_duration_s` (the terminating
/// point starts the next chunk too), and emitting a trailing chunk for any
/// remainder of at least 2 points.
pub fn chunk_route(points: &[Coord<f64>], chunk_duration_s: f64, speed_mps: f64) -> Vec<Chunk> {
    if points.len() < 2 || chunk_duration_s <= 0.0 || speed_mps <= 0.0 {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut current = vec![points[0]];
    let mut acc_length_m = 0.0;
    let mut acc_time_s = 0.0;
    let mut next_id = 0u64;

    for w in points.windows(2) {
        let seg_len = geodesic_distance_m(w[0], w[1]);
        let seg_time = seg_len / speed_mps;
        current.push(w[1]);
        acc_length_m += seg_len;
        acc_time_s += seg_time;

        if acc_time_s >= chunk_duration_s {
            chunks.push(make_chunk(next_id, std::mem::take(&mut current), acc_length_m, acc_time_s));
            next_id += 1;
            current.push(w[1]);
            acc_length_m = 0.0;
            acc_time_s = 0.0;
        }
    }

    if current.len() >= 2 {
        chunks.push(make_chunk(next_id, current, acc_length_m, acc_time_s));
    }

    chunks
}

fn make_chunk(id: u64, coords: Vec<Coord<f64>>, length_m: f64, time_s: f64) -> Chunk {
    let start_point = coords[0];
    let end_point = *coords.last().unwrap();
    Chunk {
        id,
        geometry: LineString::new(coords),
        length_m,
        time_s,
        start_point,
        end_point,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight_line(n: usize, step_deg: f64) -> Vec<Coord<f64>> {
        (0..n).map(|i| Coord { x: i as f64 * step_deg, y: 0.0 }).collect()
    }

    #[test]
    fn empty_or_degenerate_input_yields_no_chunks() {
        assert!(chunk_route(&[], 60.0, 10.0).is_empty());
        assert!(chunk_route(&[Coord { x: 0.0, y: 0.0 }], 60.0, 10.0).is_empty());
    }

    #[test]
    fn chunks_partition_the_full_route() {
        let points = straight_line(50, 0.0001);
        let chunks = chunk_route(&points, 30.0, 10.0);
        assert!(!chunks.is_empty());
        // First point of route starts chunk 0; last point of route ends the last chunk.
        assert_eq!(chunks.first().unwrap().start_point, points[0]);
        assert_eq!(chunks.last().unwrap().end_point, *points.last().unwrap());
        // Consecutive chunks share a boundary point.
        for w in chunks.windows(2) {
            assert_eq!(w[0].end_point, w[1].start_point);
        }
    }

    #[test]
    fn each_chunk_is_within_ten_percent_of_target_duration() {
        let points = straight_line(1000, 0.00005);
        let chunks = chunk_route(&points, 60.0, 10.0);
        for c in &chunks[..chunks.len().saturating_sub(1)] {
            assert!(c.time_s <= 60.0 * 1.1, "chunk time {} exceeds budget", c.time_s);
        }
    }
}
