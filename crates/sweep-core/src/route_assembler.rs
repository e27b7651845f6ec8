//! Walks a stitched circuit into a single continuous polyline and computes
//! its scalar statistics (spec §4.4).

use geo::{Coord, LineString};
use sweep_common::Profile;
use sweep_geometry::{geodesic_distance_m, geodesic_length_m};
use sweep_oracle::Oracle;
use tokio_util::sync::CancellationToken;

use crate::route_connector::{final_repair_pass, repair_gap};
use crate::types::{Circuit, Diagnostics, Route, RouteGraph};

const SMALL_GAP_M: f64 = 1e-3;

/// Emits the continuous polyline for `circuit`, delegating gap handling to
/// [`crate::route_connector`], then computes length, drive time, and the
/// `valid` flag (spec §4.4: no consecutive-point gap over `max_gap_m`).
pub async fn assemble(
    graph: &RouteGraph,
    circuit: &Circuit,
    oracle: &dyn Oracle,
    cancel: &CancellationToken,
    profile: Profile,
    max_gap_m: f64,
    diagnostics: &mut Diagnostics,
) -> Route {
    let mut points: Vec<Coord<f64>> = Vec::new();

    for &eid in &circuit.edges {
        let edge = &graph[eid];
        let geom = &edge.geometry.0;
        if geom.is_empty() {
            continue;
        }
        match points.last().copied() {
            None => points.extend(geom.iter().copied()),
            Some(last) => {
                let gap = geodesic_distance_m(last, geom[0]);
                if gap > SMALL_GAP_M {
                    let fill = repair_gap(last, geom[0], oracle, cancel).await;
                    if !fill.coords.is_empty() {
                        diagnostics.gap_repairs += 1;
                        if fill.used_fallback {
                            diagnostics.oracle_fallbacks += 1;
                        }
                        points.extend(fill.coords);
                    }
                }
                points.extend(geom.iter().skip(1).copied());
            }
        }
    }

    final_repair_pass(&mut points, oracle, cancel, diagnostics).await;

    let line = LineString::new(points.clone());
    let length_m = geodesic_length_m(&line);
    let drive_time_s = length_m / profile.speed_mps();

    let mut violations = 0usize;
    let mut worst_gap = 0.0f64;
    for w in points.windows(2) {
        let gap = geodesic_distance_m(w[0], w[1]);
        if gap > max_gap_m {
            violations += 1;
        }
        if gap > worst_gap {
            worst_gap = gap;
        }
    }

    let deadhead_length_m: f64 = circuit
        .edges
        .iter()
        .map(|&e| &graph[e])
        .filter(|e| e.duplicated || e.is_connector)
        .map(|e| e.length_m)
        .sum();

    diagnostics.route_points = points.len();
    diagnostics.continuity_violations = violations;
    diagnostics.continuity_valid = violations == 0;
    diagnostics.max_gap_m = worst_gap;
    diagnostics.deadhead_ratio = if length_m > 0.0 {
        deadhead_length_m / length_m
    } else {
        0.0
    };

    Route {
        geometry: line,
        length_m,
        drive_time_s,
        valid: violations == 0,
        diagnostics: diagnostics.clone(),
        chunks: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Diagnostics, EdgeData, NodeData};
    use petgraph::graph::DiGraph;
    use sweep_oracle::NullOracle;

    fn graph_with_square() -> (RouteGraph, Circuit) {
        let mut g: RouteGraph = DiGraph::new();
        let coords = [
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 0.001, y: 0.0 },
            Coord { x: 0.001, y: 0.001 },
            Coord { x: 0.0, y: 0.001 },
        ];
        let nodes: Vec<_> = coords.iter().map(|&coord| g.add_node(NodeData { coord })).collect();
        let mut edges = Vec::new();
        for i in 0..4 {
            let u = nodes[i];
            let v = nodes[(i + 1) % 4];
            let geom = LineString::new(vec![g[u].coord, g[v].coord]);
            let length_m = geodesic_length_m(&geom);
            edges.push(g.add_edge(
                u,
                v,
                EdgeData {
                    length_m,
                    time_s: length_m / 10.0,
                    geometry: geom,
                    tags: Default::default(),
                    is_connector: false,
                    duplicated: false,
                },
            ));
        }
        (g, Circuit { edges })
    }

    #[tokio::test]
    async fn assembled_route_is_valid_and_closed() {
        let (graph, circuit) = graph_with_square();
        let oracle = NullOracle;
        let mut diagnostics = Diagnostics::default();
        let route = assemble(
            &graph,
            &circuit,
            &oracle,
            &CancellationToken::new(),
            Profile::DrivingCar,
            30.0,
            &mut diagnostics,
        )
        .await;
        assert!(route.valid);
        assert_eq!(route.geometry.0.first(), route.geometry.0.last());
        assert!(route.length_m > 0.0);
        assert_eq!(diagnostics.deadhead_ratio, 0.0);
    }
}
