//! Ties GraphBuilder → RouteConnector → CPPSolver → RouteAssembler → Chunker
//! into the single `plan_route` entry point a worker job invokes, reporting
//! progress through a caller-supplied hook (spec §6 "Persisted state
//! layout", job lifecycle).

use geo::Coord;
use sweep_common::{Config, Error, Profile, Result, Stage};
use sweep_oracle::Oracle;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::chunker::chunk_route;
use crate::cpp_solver;
use crate::graph_builder::build_graph;
use crate::route_assembler::assemble;
use crate::route_connector::connect_components;
use crate::types::{Diagnostics, Route, StreetFeature};

/// Everything `plan_route` needs beyond configuration/collaborators.
pub struct PlanInput {
    pub features: Vec<StreetFeature>,
    pub center: Option<Coord<f64>>,
    pub profile: Profile,
    pub chunk_duration_s: f64,
}

/// Runs the full pipeline for one job. `progress` is called at each stage
/// transition with a monotonically increasing percent (spec §6 state
/// machine). Only `InvalidInput`/`Fatal` surface as `Err` — everything else
/// degrades gracefully into `Diagnostics` (spec §7's propagation rule).
#[instrument(skip(input, cfg, oracle, cancel, progress))]
pub async fn plan_route(
    input: PlanInput,
    cfg: &Config,
    oracle: &dyn Oracle,
    cancel: &CancellationToken,
    mut progress: impl FnMut(Stage, u8),
) -> Result<Route> {
    if input.features.is_empty() {
        return Err(Error::InvalidInput("no street features supplied".to_string()));
    }

    let mut diagnostics = Diagnostics {
        input_streets: input.features.len(),
        ..Default::default()
    };

    progress(Stage::BuildGraph, 10);
    let mut graph = build_graph(&input.features, input.center, cfg.snap_tolerance);
    if graph.edge_count() == 0 {
        return Err(Error::InvalidInput(
            "no valid street geometry produced a usable graph".to_string(),
        ));
    }
    diagnostics.graph_nodes = graph.node_count();
    diagnostics.graph_edges = graph.edge_count();

    let connect_outcome = connect_components(&mut graph, oracle, cfg, cancel).await;
    diagnostics.components_before = connect_outcome.components_before;
    diagnostics.components_after = connect_outcome.components_after;
    diagnostics.uturn_connections = connect_outcome.uturn_connections;
    diagnostics.oracle_fallbacks += connect_outcome.oracle_fallbacks;
    if connect_outcome.disconnected {
        info!(
            components = connect_outcome.components_after,
            "graph remains disconnected after join iterations; proceeding per-component"
        );
    }

    progress(Stage::Eulerize, 40);
    let (circuit, scc_stats, stitch_fallbacks) = cpp_solver::solve(&mut graph, oracle, cfg, cancel).await;
    diagnostics.scc_count = scc_stats.len();
    diagnostics.circuits_found = scc_stats.iter().filter(|s| s.edge_count > 0).count();
    diagnostics.duplicated_length_m = scc_stats.iter().map(|s| s.duplicated_length_m).sum();
    diagnostics.scc_stats = scc_stats;
    diagnostics.oracle_fallbacks += stitch_fallbacks;

    progress(Stage::Assemble, 70);
    let max_gap_m = if cfg.max_gap_meters > 0.0 { cfg.max_gap_meters } else { 30.0 };
    let mut route = assemble(
        &graph,
        &circuit,
        oracle,
        cancel,
        input.profile,
        max_gap_m,
        &mut diagnostics,
    )
    .await;

    progress(Stage::Chunk, 90);
    route.chunks = chunk_route(&route.geometry.0, input.chunk_duration_s, input.profile.speed_mps());
    route.diagnostics = diagnostics;

    progress(Stage::Save, 100);
    Ok(route)
}
