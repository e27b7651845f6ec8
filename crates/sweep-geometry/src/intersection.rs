//! Splitting projected polylines at their true geometric intersections
//! (spec §4.1 step 3).
//!
//! Works entirely in the projected (meter) plane produced by
//! [`crate::projection::LocalProjection`] — that's what makes "within 0.5m"
//! a sane buffer instead of a degenerate degree-scale one.

use geo::line_intersection::{line_intersection, LineIntersection};
use geo::{Coord, Line, LineString};
use rstar::{RTree, RTreeObject, AABB};

/// Distance (in projected meters) within which a candidate segment is
/// considered for intersection testing, and within which two points are
/// treated as the same intersection. Spec §4.1 step 3.
pub const SNAP_BUFFER_M: f64 = 0.5;

#[derive(Debug, Clone, Copy)]
struct IndexedSegment {
    line_idx: usize,
    seg: Line<f64>,
}

impl RTreeObject for IndexedSegment {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        let (a, b) = (self.seg.start, self.seg.end);
        AABB::from_corners(
            [a.x.min(b.x) - SNAP_BUFFER_M, a.y.min(b.y) - SNAP_BUFFER_M],
            [a.x.max(b.x) + SNAP_BUFFER_M, a.y.max(b.y) + SNAP_BUFFER_M],
        )
    }
}

/// Splits each projected line at every point it shares with any other line
/// (within `SNAP_BUFFER_M`), returning the resulting sub-lines grouped by
/// their originating line index. Sub-lines share exact endpoint coordinates
/// at every split, which is what lets `GraphBuilder`'s node-snapping pass
/// (§4.1 step 5) identify them as the same node.
pub fn split_at_intersections(lines: &[LineString<f64>]) -> Vec<Vec<LineString<f64>>> {
    let mut index = Vec::new();
    for (line_idx, line) in lines.iter().enumerate() {
        for seg in line.lines() {
            index.push(IndexedSegment { line_idx, seg });
        }
    }
    let tree = RTree::bulk_load(index);

    let mut split_params: Vec<Vec<f64>> = vec![Vec::new(); lines.len()];

    for (line_idx, line) in lines.iter().enumerate() {
        for seg in line.lines() {
            let envelope = IndexedSegment { line_idx, seg }.envelope();
            for candidate in tree.locate_in_envelope_intersecting(&envelope) {
                if candidate.line_idx == line_idx {
                    continue;
                }
                if let Some(point) = intersection_point(seg, candidate.seg) {
                    if let Some(param) = arc_length_param(line, point) {
                        split_params[line_idx].push(param);
                    }
                    if let Some(param) = arc_length_param(&lines[candidate.line_idx], point) {
                        split_params[candidate.line_idx].push(param);
                    }
                }
            }
        }
    }

    lines
        .iter()
        .enumerate()
        .map(|(idx, line)| split_line(line, &mut split_params[idx]))
        .collect()
}

fn intersection_point(a: Line<f64>, b: Line<f64>) -> Option<Coord<f64>> {
    match line_intersection(a, b)? {
        LineIntersection::SinglePoint { intersection, .. } => Some(intersection),
        LineIntersection::Collinear { intersection } => Some(intersection.start),
    }
}

/// Arc-length parameter (meters from the line's start) of the closest point
/// on `line` to `point`, or `None` if `point` lies further than
/// `SNAP_BUFFER_M` from every segment of `line`.
fn arc_length_param(line: &LineString<f64>, point: Coord<f64>) -> Option<f64> {
    let mut best: Option<(f64, f64)> = None; // (distance, arc length)
    let mut cumulative = 0.0;
    for seg in line.lines() {
        let (proj, t) = project_onto_segment(seg, point);
        let dist = dist2(proj, point).sqrt();
        let seg_len = dist2(seg.start, seg.end).sqrt();
        let arc = cumulative + t * seg_len;
        if best.map(|(best_dist, _)| dist < best_dist).unwrap_or(true) {
            best = Some((dist, arc));
        }
        cumulative += seg_len;
    }
    best.filter(|(dist, _)| *dist <= SNAP_BUFFER_M).map(|(_, arc)| arc)
}

fn project_onto_segment(seg: Line<f64>, point: Coord<f64>) -> (Coord<f64>, f64) {
    let dx = seg.end.x - seg.start.x;
    let dy = seg.end.y - seg.start.y;
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return (seg.start, 0.0);
    }
    let t = (((point.x - seg.start.x) * dx) + ((point.y - seg.start.y) * dy)) / len2;
    let t = t.clamp(0.0, 1.0);
    (
        Coord {
            x: seg.start.x + t * dx,
            y: seg.start.y + t * dy,
        },
        t,
    )
}

fn dist2(a: Coord<f64>, b: Coord<f64>) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

/// Split `line` at the given arc-length parameters (deduplicated, sorted,
/// clamped away from the endpoints), returning the resulting sub-lines.
fn split_line(line: &LineString<f64>, params: &mut Vec<f64>) -> Vec<LineString<f64>> {
    let total_len: f64 = line
        .lines()
        .map(|seg| dist2(seg.start, seg.end).sqrt())
        .sum();

    params.sort_by(|a, b| a.partial_cmp(b).unwrap());
    params.dedup_by(|a, b| (*a - *b).abs() < SNAP_BUFFER_M);
    params.retain(|p| *p > SNAP_BUFFER_M && *p < total_len - SNAP_BUFFER_M);

    if params.is_empty() {
        return vec![line.clone()];
    }

    let mut cut_points: Vec<Coord<f64>> = Vec::with_capacity(params.len());
    for &p in params.iter() {
        cut_points.push(point_at_arc_length(line, p));
    }

    let mut pieces = Vec::new();
    let mut current: Vec<Coord<f64>> = Vec::new();
    let mut cumulative = 0.0;
    let mut next_cut = 0usize;

    current.push(line.0[0]);
    for seg in line.lines() {
        let seg_len = dist2(seg.start, seg.end).sqrt();
        while next_cut < params.len() && params[next_cut] <= cumulative + seg_len {
            let cut = cut_points[next_cut];
            current.push(cut);
            pieces.push(std::mem::take(&mut current));
            current.push(cut);
            next_cut += 1;
        }
        current.push(seg.end);
        cumulative += seg_len;
    }
    pieces.push(current);

    pieces
        .into_iter()
        .filter(|pts| pts.len() >= 2)
        .map(LineString::new)
        .filter(|ls: &LineString<f64>| euclidean_length(ls) > 1e-9)
        .collect()
}

fn euclidean_length(line: &LineString<f64>) -> f64 {
    line.lines().map(|seg| dist2(seg.start, seg.end).sqrt()).sum()
}

fn point_at_arc_length(line: &LineString<f64>, target: f64) -> Coord<f64> {
    let mut cumulative = 0.0;
    for seg in line.lines() {
        let seg_len = dist2(seg.start, seg.end).sqrt();
        if cumulative + seg_len >= target {
            let t = if seg_len > 0.0 {
                (target - cumulative) / seg_len
            } else {
                0.0
            };
            return Coord {
                x: seg.start.x + t * (seg.end.x - seg.start.x),
                y: seg.start.y + t * (seg.end.y - seg.start.y),
            };
        }
        cumulative += seg_len;
    }
    line.0[line.0.len() - 1]
}
