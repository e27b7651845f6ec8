//! Ensures the working graph is weakly connected, and repairs residual
//! sub-edge gaps during polyline assembly (spec §4.2).

use geo::{Coord, LineString};
use petgraph::graph::NodeIndex;
use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;
use sweep_common::Config;
use sweep_geometry::{geodesic_distance_m, geodesic_length_m};
use sweep_oracle::Oracle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::types::{Diagnostics, EdgeData, RouteGraph};

const MAX_JOIN_ITERATIONS: u32 = 10;
const MAX_STALLS: u32 = 3;
const MAX_COMPONENT_DISTANCE_M: f64 = 5_000.0;
const DEFAULT_MAX_CANDIDATES: usize = 5;
const EARLY_STOP_RATIO: f64 = 1.5;

const SMALL_GAP_M: f64 = 1e-3; // 1mm, spec §4.2
const SNAP_GAP_M: f64 = 20.0;
const FINAL_REPAIR_CAP: usize = 200;

const UTURN_DIRECT_M: f64 = 50.0;
const UTURN_PROBE_M: f64 = 100.0;
const UTURN_NEIGHBOR_M: f64 = 20.0;

/// Weakly connected components, grouped by node, sorted by node count
/// descending (spec §4.2: "list weak components sorted by node count
/// descending").
pub fn weak_components(graph: &RouteGraph) -> Vec<Vec<NodeIndex>> {
    let mut uf = UnionFind::new(graph.node_count());
    for edge in graph.edge_references() {
        uf.union(edge.source().index(), edge.target().index());
    }
    let labeling = uf.into_labeling();
    let mut groups: std::collections::HashMap<usize, Vec<NodeIndex>> = std::collections::HashMap::new();
    for (idx, &root) in labeling.iter().enumerate() {
        groups.entry(root).or_default().push(NodeIndex::new(idx));
    }
    let mut components: Vec<Vec<NodeIndex>> = groups.into_values().collect();
    components.sort_by(|a, b| b.len().cmp(&a.len()));
    components
}

fn centroid(graph: &RouteGraph, nodes: &[NodeIndex]) -> Coord<f64> {
    let mut sum = Coord { x: 0.0, y: 0.0 };
    for &n in nodes {
        let c = graph[n].coord;
        sum.x += c.x;
        sum.y += c.y;
    }
    let n = nodes.len().max(1) as f64;
    Coord {
        x: sum.x / n,
        y: sum.y / n,
    }
}

fn top_k_node_pairs(
    graph: &RouteGraph,
    a: &[NodeIndex],
    b: &[NodeIndex],
    k: usize,
) -> Vec<(NodeIndex, NodeIndex, f64)> {
    let mut pairs: Vec<(NodeIndex, NodeIndex, f64)> = Vec::with_capacity(a.len() * b.len());
    for &u in a {
        for &v in b {
            let d = geodesic_distance_m(graph[u].coord, graph[v].coord);
            pairs.push((u, v, d));
        }
    }
    pairs.sort_by(|x, y| x.2.partial_cmp(&y.2).unwrap());
    pairs.truncate(k);
    pairs
}

/// Find a node anywhere in the graph within `radius_m` of `coord`, other
/// than `exclude`. Used by the coverage-mode U-turn heuristic's
/// common-neighbor probe.
fn nearest_neighbor_within(
    graph: &RouteGraph,
    coord: Coord<f64>,
    radius_m: f64,
    exclude: &[NodeIndex],
) -> Option<NodeIndex> {
    graph
        .node_indices()
        .filter(|n| !exclude.contains(n))
        .map(|n| (n, geodesic_distance_m(graph[n].coord, coord)))
        .filter(|(_, d)| *d <= radius_m)
        .min_by(|x, y| x.1.partial_cmp(&y.1).unwrap())
        .map(|(n, _)| n)
}

/// Snaps `geometry`'s endpoints to `graph[u].coord`/`graph[v].coord` before
/// wiring it in, so the Edge invariant (`geometry[0]==u ∧ geometry[-1]==v`,
/// bitwise) holds even when the oracle's reported endpoints differ slightly
/// from the node coordinates — the same snap `repair_gap` already applies.
fn add_connector(graph: &mut RouteGraph, u: NodeIndex, v: NodeIndex, mut geometry: LineString<f64>) {
    if let Some(first) = geometry.0.first_mut() {
        *first = graph[u].coord;
    }
    if let Some(last) = geometry.0.last_mut() {
        *last = graph[v].coord;
    }
    let length_m = geodesic_length_m(&geometry);
    let forward = EdgeData {
        length_m,
        time_s: length_m / 10.0,
        geometry: geometry.clone(),
        tags: Default::default(),
        is_connector: true,
        duplicated: false,
    };
    let mut reversed = geometry.0.clone();
    reversed.reverse();
    let backward = EdgeData {
        length_m,
        time_s: length_m / 10.0,
        geometry: LineString::new(reversed),
        tags: Default::default(),
        is_connector: true,
        duplicated: false,
    };
    graph.add_edge(u, v, forward);
    graph.add_edge(v, u, backward);
}

/// Result of a component-joining pass, folded into the caller's
/// `Diagnostics`.
#[derive(Debug, Default)]
pub struct ConnectOutcome {
    pub components_before: usize,
    pub components_after: usize,
    pub iterations: u32,
    pub uturn_connections: usize,
    pub oracle_fallbacks: usize,
    pub disconnected: bool,
}

/// Spec §4.2 "Component joining": iteratively stitch the largest weakly
/// connected components together via the oracle, capped at
/// `MAX_JOIN_ITERATIONS`, aborting after `MAX_STALLS` non-reducing
/// iterations.
pub async fn connect_components(
    graph: &mut RouteGraph,
    oracle: &dyn Oracle,
    cfg: &Config,
    cancel: &CancellationToken,
) -> ConnectOutcome {
    let initial = weak_components(graph);
    let components_before = initial.len();
    if components_before <= 1 {
        return ConnectOutcome {
            components_before,
            components_after: components_before,
            ..Default::default()
        };
    }

    let mut stalls = 0u32;
    let mut iterations = 0u32;
    let mut uturn_connections = 0usize;
    let mut oracle_fallbacks = 0usize;

    loop {
        let components = weak_components(graph);
        if components.len() <= 1 || iterations >= MAX_JOIN_ITERATIONS {
            return ConnectOutcome {
                components_before,
                components_after: components.len(),
                iterations,
                uturn_connections,
                oracle_fallbacks,
                disconnected: components.len() > 1,
            };
        }
        iterations += 1;

        let mut joined = false;
        'pairs: for i in 0..components.len() {
            for j in (i + 1)..components.len() {
                if cancel.is_cancelled() {
                    return ConnectOutcome {
                        components_before,
                        components_after: weak_components(graph).len(),
                        iterations,
                        uturn_connections,
                        oracle_fallbacks,
                        disconnected: true,
                    };
                }
                let a = &components[i];
                let b = &components[j];
                let ca = centroid(graph, a);
                let cb = centroid(graph, b);
                if geodesic_distance_m(ca, cb) > MAX_COMPONENT_DISTANCE_M {
                    continue;
                }

                let candidates = top_k_node_pairs(graph, a, b, DEFAULT_MAX_CANDIDATES);
                let mut best: Option<(NodeIndex, NodeIndex, Vec<Coord<f64>>, f64)> = None;
                let mut best_is_fallback = false;

                for (u, v, straight) in &candidates {
                    if cfg.coverage_mode_uturns && *straight <= UTURN_DIRECT_M {
                        best = Some((*u, *v, vec![graph[*u].coord, graph[*v].coord], *straight));
                        uturn_connections += 1;
                        break;
                    }
                    if cfg.coverage_mode_uturns && *straight <= UTURN_PROBE_M {
                        if let Some(hop) =
                            nearest_neighbor_within(graph, graph[*u].coord, UTURN_NEIGHBOR_M, &[*u, *v])
                        {
                            if geodesic_distance_m(graph[hop].coord, graph[*v].coord) <= UTURN_NEIGHBOR_M {
                                let geom = vec![graph[*u].coord, graph[hop].coord, graph[*v].coord];
                                let len = geodesic_length_m(&LineString::new(geom.clone()));
                                best = Some((*u, *v, geom, len));
                                uturn_connections += 1;
                                break;
                            }
                        }
                    }

                    let result = oracle
                        .route(graph[*u].coord, graph[*v].coord, Default::default(), cancel)
                        .await;
                    let routed_len = result.length_m;
                    let better = best
                        .as_ref()
                        .map(|(_, _, _, len)| routed_len < *len)
                        .unwrap_or(true);
                    if better {
                        best = Some((*u, *v, result.geometry.clone(), routed_len));
                        best_is_fallback = result.used_fallback;
                    }
                    if routed_len <= EARLY_STOP_RATIO * straight {
                        break;
                    }
                }

                if let Some((u, v, geometry, _)) = best {
                    if best_is_fallback {
                        oracle_fallbacks += 1;
                    }
                    add_connector(graph, u, v, LineString::new(geometry));
                    joined = true;
                    break 'pairs;
                }
            }
        }

        if joined {
            stalls = 0;
        } else {
            stalls += 1;
            if stalls >= MAX_STALLS {
                warn!(stalls, "route connector stalled, aborting with a disconnected graph");
                let components_after = weak_components(graph).len();
                return ConnectOutcome {
                    components_before,
                    components_after,
                    iterations,
                    uturn_connections,
                    oracle_fallbacks,
                    disconnected: components_after > 1,
                };
            }
        }
    }
}

/// Outcome of walking one edge transition during assembly (spec §4.2 "Gap
/// repair"): the coordinates to append, whether an oracle call was made, and
/// (when it was) whether the oracle exhausted retries and fell back to a
/// straight line (spec §7 `OracleExhausted`).
pub struct GapFill {
    pub coords: Vec<Coord<f64>>,
    pub used_oracle: bool,
    pub used_fallback: bool,
}

/// Bridges the gap between the last emitted point `a` and the next edge's
/// first coordinate `b`, per spec §4.2's three gap tiers.
pub async fn repair_gap(
    a: Coord<f64>,
    b: Coord<f64>,
    oracle: &dyn Oracle,
    cancel: &CancellationToken,
) -> GapFill {
    let gap = geodesic_distance_m(a, b);
    if gap <= SMALL_GAP_M {
        GapFill {
            coords: vec![],
            used_oracle: false,
            used_fallback: false,
        }
    } else if gap <= SNAP_GAP_M {
        GapFill {
            coords: vec![b],
            used_oracle: false,
            used_fallback: false,
        }
    } else {
        let result = oracle.route(a, b, Default::default(), cancel).await;
        let used_fallback = result.used_fallback;
        let mut coords = result.geometry;
        if let Some(first) = coords.first_mut() {
            *first = a;
        }
        if let Some(last) = coords.last_mut() {
            *last = b;
        }
        GapFill {
            coords,
            used_oracle: true,
            used_fallback,
        }
    }
}

/// Final single-pass repair loop over an already-assembled polyline (spec
/// §4.2): replaces any consecutive-point gap over `SNAP_GAP_M` with an
/// oracle polyline, up to `FINAL_REPAIR_CAP` fixes. Remaining violations are
/// reported (via `diagnostics.continuity_violations`), not failed.
pub async fn final_repair_pass(
    points: &mut Vec<Coord<f64>>,
    oracle: &dyn Oracle,
    cancel: &CancellationToken,
    diagnostics: &mut Diagnostics,
) {
    let mut fixes = 0usize;
    let mut i = 0usize;
    while i + 1 < points.len() {
        let gap = geodesic_distance_m(points[i], points[i + 1]);
        if gap > SNAP_GAP_M {
            if fixes >= FINAL_REPAIR_CAP {
                diagnostics.continuity_violations += 1;
                i += 1;
                continue;
            }
            let result = repair_gap(points[i], points[i + 1], oracle, cancel).await;
            if !result.coords.is_empty() {
                let insert_at = i + 1;
                points.splice(insert_at..insert_at, result.coords.clone());
                fixes += 1;
                diagnostics.gap_repairs += 1;
                if result.used_fallback {
                    diagnostics.oracle_fallbacks += 1;
                }
                i += result.coords.len();
                continue;
            }
        }
        i += 1;
    }
    info!(fixes, "final gap-repair pass complete");
}
