//! Converts raw street features into a driveable directed multigraph with
//! correct intersection topology (spec §4.1). Never raises: invalid
//! geometries are logged and skipped.

use geo::{Coord, LineString};
use sweep_geometry::{geodesic_length_m, split_at_intersections, LocalProjection, NodeSnapIndex};
use tracing::{debug, warn};

use crate::types::{EdgeData, NodeData, RouteGraph, StreetFeature, StreetTags};

/// Default speed (m/s) by highway class, used when a feature carries no
/// parseable `maxspeed` tag (spec §4.1 step 6).
fn default_speed_mps(highway: Option<&str>) -> f64 {
    match highway {
        Some("motorway") => 30.0,
        Some("trunk") => 25.0,
        Some("primary") => 20.0,
        Some("secondary") => 15.0,
        Some("tertiary") => 12.0,
        Some("residential") => 8.0,
        Some("service") => 5.0,
        Some("living_street") => 3.0,
        _ => 10.0,
    }
}

/// Parses `"N"`, `"N km/h"` or `"N mph"` into meters per second. Anything
/// unparseable falls through to the highway-class default.
fn parse_speed_mps(tags: &StreetTags) -> f64 {
    let Some(raw) = tags.maxspeed.as_deref() else {
        return default_speed_mps(tags.highway.as_deref());
    };
    let raw = raw.trim();
    let (number_part, is_mph) = if let Some(stripped) = raw.strip_suffix("mph") {
        (stripped.trim(), true)
    } else if let Some(stripped) = raw.strip_suffix("km/h") {
        (stripped.trim(), false)
    } else {
        (raw, false)
    };
    match number_part.parse::<f64>() {
        Ok(n) if is_mph => n * 0.44704,
        Ok(n) => n / 3.6,
        Err(_) => default_speed_mps(tags.highway.as_deref()),
    }
}

/// Build a directed multigraph from a feature collection. Returns an empty
/// graph if there are no valid features (spec §4.1 contract).
pub fn build_graph(
    features: &[StreetFeature],
    center: Option<Coord<f64>>,
    snap_tolerance: f64,
) -> RouteGraph {
    let valid: Vec<&StreetFeature> = features
        .iter()
        .filter(|f| {
            let ok = f.is_valid();
            if !ok {
                warn!("skipping invalid street feature (degenerate or <2 points)");
            }
            ok
        })
        .collect();

    let mut graph = RouteGraph::new();
    if valid.is_empty() {
        return graph;
    }

    let lines: Vec<LineString<f64>> = valid.iter().map(|f| f.geometry.clone()).collect();
    let center = center.unwrap_or_else(|| LocalProjection::centroid_of(&lines));
    let projection = LocalProjection::for_center(center);

    let projected: Vec<LineString<f64>> = lines.iter().map(|l| projection.project_line(l)).collect();
    let split = split_at_intersections(&projected);

    let mut snap = NodeSnapIndex::new(snap_tolerance);
    let mut node_indices = Vec::new();

    for (feature_idx, pieces) in split.into_iter().enumerate() {
        let tags = &valid[feature_idx].tags;
        for piece in pieces {
            let geometry = projection.unproject_line(&piece);
            if geometry.0.len() < 2 {
                continue;
            }
            let length_m = geodesic_length_m(&geometry);
            if length_m <= 0.0 {
                continue;
            }
            let speed_mps = parse_speed_mps(tags);

            let u_coord = geometry.0[0];
            let v_coord = geometry.0[geometry.0.len() - 1];
            let u_id = snap.insert_or_get(u_coord);
            let v_id = snap.insert_or_get(v_coord);

            while node_indices.len() <= u_id.max(v_id) {
                node_indices.push(None);
            }
            let u = *node_indices[u_id].get_or_insert_with(|| {
                graph.add_node(NodeData { coord: snap.coord(u_id) })
            });
            let v = *node_indices[v_id].get_or_insert_with(|| {
                graph.add_node(NodeData { coord: snap.coord(v_id) })
            });

            graph.add_edge(
                u,
                v,
                EdgeData {
                    length_m,
                    time_s: length_m / speed_mps,
                    geometry: geometry.clone(),
                    tags: tags.clone(),
                    is_connector: false,
                    duplicated: false,
                },
            );

            if !tags.oneway {
                let mut reversed: Vec<Coord<f64>> = geometry.0.clone();
                reversed.reverse();
                graph.add_edge(
                    v,
                    u,
                    EdgeData {
                        length_m,
                        time_s: length_m / speed_mps,
                        geometry: LineString::new(reversed),
                        tags: tags.clone(),
                        is_connector: false,
                        duplicated: false,
                    },
                );
            }
        }
    }

    debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "graph built"
    );
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StreetTags;

    fn feature(coords: Vec<(f64, f64)>, oneway: bool, highway: &str) -> StreetFeature {
        StreetFeature {
            geometry: LineString::from(coords),
            tags: StreetTags {
                highway: Some(highway.to_string()),
                oneway,
                ..Default::default()
            },
        }
    }

    #[test]
    fn empty_input_yields_empty_graph() {
        let graph = build_graph(&[], None, 1e-6);
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn invalid_feature_is_skipped() {
        let degenerate = feature(vec![(0.0, 0.0), (0.0, 0.0)], false, "residential");
        let graph = build_graph(&[degenerate], None, 1e-6);
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn single_loop_produces_eight_directed_edges() {
        let square = feature(
            vec![
                (0.0, 0.0),
                (0.001, 0.0),
                (0.001, 0.001),
                (0.0, 0.001),
                (0.0, 0.0),
            ],
            false,
            "residential",
        );
        let graph = build_graph(&[square], None, 1e-6);
        assert_eq!(graph.edge_count(), 8);
        assert_eq!(graph.node_count(), 4);
    }

    #[test]
    fn oneway_feature_adds_single_direction() {
        let line = feature(vec![(0.0, 0.0), (0.001, 0.0)], true, "residential");
        let graph = build_graph(&[line], None, 1e-6);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn x_crossing_creates_shared_node() {
        let a = feature(vec![(0.0, 0.5), (1.0, 0.5)], false, "residential");
        let b = feature(vec![(0.5, 0.0), (0.5, 1.0)], false, "residential");
        let graph = build_graph(&[a, b], None, 1e-6);
        // 2 original lines x 2 segments each x 2 directions = 8 edges.
        assert_eq!(graph.edge_count(), 8);
        // 4 endpoints + 1 shared crossing node = 5.
        assert_eq!(graph.node_count(), 5);
    }

    #[test]
    fn speed_parses_kmh_and_mph() {
        let mut tags = StreetTags {
            maxspeed: Some("50".to_string()),
            ..Default::default()
        };
        assert!((parse_speed_mps(&tags) - 50.0 / 3.6).abs() < 1e-9);
        tags.maxspeed = Some("30 mph".to_string());
        assert!((parse_speed_mps(&tags) - 30.0 * 0.44704).abs() < 1e-6);
        tags.maxspeed = Some("60 km/h".to_string());
        assert!((parse_speed_mps(&tags) - 60.0 / 3.6).abs() < 1e-9);
    }

    #[test]
    fn unparseable_speed_falls_back_to_highway_default() {
        let tags = StreetTags {
            maxspeed: Some("walk".to_string()),
            highway: Some("service".to_string()),
            ..Default::default()
        };
        assert_eq!(parse_speed_mps(&tags), 5.0);
    }
}
