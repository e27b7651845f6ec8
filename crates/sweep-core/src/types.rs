//! Data model shared by every pipeline stage (spec §3).

use geo::{Coord, LineString};
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use serde::{Deserialize, Serialize};

/// `Diagnostics`/`SccStats` live in `sweep_common` (spec §6's persisted-state
/// shape embeds them in `JobRecord`, which can't depend back on this crate);
/// re-exported here so existing `crate::types::Diagnostics` call sites are
/// unaffected.
pub use sweep_common::{Diagnostics, SccStats};

/// A raw input street, as read from a GeoJSON `LineString` feature.
#[derive(Debug, Clone)]
pub struct StreetFeature {
    pub geometry: LineString<f64>,
    pub tags: StreetTags,
}

#[derive(Debug, Clone, Default)]
pub struct StreetTags {
    pub highway: Option<String>,
    pub name: Option<String>,
    pub oneway: bool,
    pub maxspeed: Option<String>,
    pub osm_id: Option<i64>,
}

impl StreetFeature {
    /// Spec §4.1 step 1: keep polylines with ≥2 points that are simple and
    /// nonzero-length; everything else is invalid input, dropped upstream.
    pub fn is_valid(&self) -> bool {
        self.geometry.0.len() >= 2 && !is_degenerate(&self.geometry)
    }
}

fn is_degenerate(line: &LineString<f64>) -> bool {
    let first = line.0[0];
    line.0.iter().all(|c| (c.x - first.x).abs() < 1e-15 && (c.y - first.y).abs() < 1e-15)
}

/// Per-node payload in the graph arena.
#[derive(Debug, Clone, Copy)]
pub struct NodeData {
    pub coord: Coord<f64>,
}

/// Per-edge payload. Geometry is always aligned source→target with
/// endpoints snapped exactly to the node coordinates (spec §9).
#[derive(Debug, Clone)]
pub struct EdgeData {
    pub length_m: f64,
    pub time_s: f64,
    pub geometry: LineString<f64>,
    pub tags: StreetTags,
    pub is_connector: bool,
    /// Set on the copies `CPPSolver` adds to balance degrees (spec §4.3).
    /// The original edge created by `GraphBuilder`/`RouteConnector` is
    /// never marked; every parallel copy after it is.
    pub duplicated: bool,
}

/// The directed multigraph. `NodeIndex`/`EdgeIndex` are stable for the
/// lifetime of the graph (spec §9) as long as nothing is removed — the
/// pipeline only ever adds nodes/edges, never removes them.
pub type RouteGraph = DiGraph<NodeData, EdgeData>;

/// An ordered sequence of edges forming a closed (or, mid-pipeline,
/// possibly open) walk. Holds edge identifiers, not owned geometry.
#[derive(Debug, Clone, Default)]
pub struct Circuit {
    pub edges: Vec<EdgeIndex>,
}

/// The final deliverable: a continuous polyline plus scalar stats.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub geometry: LineString<f64>,
    pub length_m: f64,
    pub drive_time_s: f64,
    pub valid: bool,
    pub diagnostics: Diagnostics,
    pub chunks: Vec<Chunk>,
}

/// A contiguous, time-bounded sub-polyline of a `Route` (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: u64,
    pub geometry: LineString<f64>,
    pub length_m: f64,
    pub time_s: f64,
    pub start_point: Coord<f64>,
    pub end_point: Coord<f64>,
}

/// Whole-graph out-degree minus in-degree for one node. Exposed so a caller
/// can check spec §8's Eulerian invariant (`in_deg(v) == out_deg(v)` for
/// every node after `CPPSolver` runs) against the graph it gets back,
/// independent of the per-SCC balance bookkeeping internal to the solver.
pub fn balance(graph: &RouteGraph, node: NodeIndex) -> i64 {
    let out_deg = graph
        .edges_directed(node, petgraph::Direction::Outgoing)
        .count() as i64;
    let in_deg = graph
        .edges_directed(node, petgraph::Direction::Incoming)
        .count() as i64;
    out_deg - in_deg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_is_zero_for_an_evenly_connected_node() {
        let mut g = RouteGraph::new();
        let a = g.add_node(NodeData { coord: Coord { x: 0.0, y: 0.0 } });
        let b = g.add_node(NodeData { coord: Coord { x: 1.0, y: 0.0 } });
        let edge = EdgeData {
            length_m: 1.0,
            time_s: 1.0,
            geometry: LineString::from(vec![(0.0, 0.0), (1.0, 0.0)]),
            tags: StreetTags::default(),
            is_connector: false,
            duplicated: false,
        };
        g.add_edge(a, b, edge.clone());
        g.add_edge(b, a, edge);
        assert_eq!(balance(&g, a), 0);
        assert_eq!(balance(&g, b), 0);
    }

    #[test]
    fn balance_is_negative_for_a_supply_node() {
        let mut g = RouteGraph::new();
        let a = g.add_node(NodeData { coord: Coord { x: 0.0, y: 0.0 } });
        let b = g.add_node(NodeData { coord: Coord { x: 1.0, y: 0.0 } });
        g.add_edge(
            a,
            b,
            EdgeData {
                length_m: 1.0,
                time_s: 1.0,
                geometry: LineString::from(vec![(0.0, 0.0), (1.0, 0.0)]),
                tags: StreetTags::default(),
                is_connector: false,
                duplicated: false,
            },
        );
        // a has only an outgoing edge: it needs one more incoming edge to balance.
        assert_eq!(balance(&g, a), 1);
        assert_eq!(balance(&g, b), -1);
    }
}
