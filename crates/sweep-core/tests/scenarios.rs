//! End-to-end scenarios covering the full pipeline: build, connect,
//! Eulerize, assemble.

use geo::LineString;
use sweep_common::{Config, Profile};
use sweep_core::pipeline::{plan_route, PlanInput};
use sweep_core::types::{StreetFeature, StreetTags};
use sweep_oracle::NullOracle;
use tokio_util::sync::CancellationToken;

fn feature(coords: Vec<(f64, f64)>, oneway: bool) -> StreetFeature {
    StreetFeature {
        geometry: LineString::from(coords),
        tags: StreetTags {
            highway: Some("residential".to_string()),
            oneway,
            ..Default::default()
        },
    }
}

async fn run(features: Vec<StreetFeature>) -> sweep_core::types::Route {
    let cfg = Config::default();
    let oracle = NullOracle;
    let input = PlanInput {
        features,
        center: None,
        profile: Profile::DrivingCar,
        chunk_duration_s: 3600.0,
    };
    plan_route(input, &cfg, &oracle, &CancellationToken::new(), |_, _| {})
        .await
        .expect("pipeline should succeed")
}

#[tokio::test]
async fn scenario_1_single_loop() {
    let square = feature(
        vec![(0.0, 0.0), (0.001, 0.0), (0.001, 0.001), (0.0, 0.001), (0.0, 0.0)],
        false,
    );
    let route = run(vec![square]).await;

    assert_eq!(route.diagnostics.graph_edges, 8);
    assert_eq!(route.diagnostics.scc_count, 1);
    assert_eq!(route.diagnostics.duplicated_length_m, 0.0);
    assert_eq!(route.diagnostics.deadhead_ratio, 0.0);
    assert!(route.valid);
    assert!(
        (route.length_m - 444.0).abs() < 20.0,
        "expected ~444m, got {}",
        route.length_m
    );
}

#[tokio::test]
async fn scenario_2_path_with_dead_ends_duplicates_both_legs() {
    // A -- B -- C, undirected (each feature creates both directions).
    let ab = feature(vec![(0.0, 0.0), (0.001, 0.0)], false);
    let bc = feature(vec![(0.001, 0.0), (0.002, 0.0)], false);
    let route = run(vec![ab, bc]).await;

    assert!(route.valid);
    assert!(route.diagnostics.duplicated_length_m > 0.0);
}

#[tokio::test]
async fn scenario_3_x_crossing_covers_every_segment() {
    let a = feature(vec![(0.0, 0.5), (1.0, 0.5)], false);
    let b = feature(vec![(0.5, 0.0), (0.5, 1.0)], false);
    let route = run(vec![a, b]).await;

    assert_eq!(route.diagnostics.scc_count, 1);
    assert!(route.diagnostics.graph_edges >= 8);
    assert!(route.valid);
}

#[tokio::test]
async fn scenario_4_disconnected_islands_within_5km_are_joined() {
    // Two ~111m squares roughly 1.1km apart (0.01 deg longitude at the equator).
    let square_a = feature(
        vec![(0.0, 0.0), (0.001, 0.0), (0.001, 0.001), (0.0, 0.001), (0.0, 0.0)],
        false,
    );
    let square_b = feature(
        vec![(0.01, 0.0), (0.011, 0.0), (0.011, 0.001), (0.01, 0.001), (0.01, 0.0)],
        false,
    );
    let route = run(vec![square_a, square_b]).await;

    assert_eq!(route.diagnostics.components_before, 2);
    assert_eq!(route.diagnostics.components_after, 1);
    assert!(route.valid);
    assert!(route.length_m.is_finite());
}

#[tokio::test]
async fn scenario_5_oneway_cycle_is_balanced_with_zero_deadhead() {
    let triangle = vec![
        feature(vec![(0.0, 0.0), (0.001, 0.0)], true),
        feature(vec![(0.001, 0.0), (0.0005, 0.001)], true),
        feature(vec![(0.0005, 0.001), (0.0, 0.0)], true),
    ];
    let route = run(triangle).await;

    assert_eq!(route.diagnostics.graph_nodes, 3);
    assert_eq!(route.diagnostics.graph_edges, 3);
    assert_eq!(route.diagnostics.scc_count, 1);
    assert_eq!(route.diagnostics.deadhead_ratio, 0.0);
    assert!(route.valid);
    assert_eq!(route.geometry.0.first(), route.geometry.0.last());
}

#[tokio::test]
async fn scenario_6_oneway_with_imbalance_duplicates_shortest_return_path() {
    let mut features = vec![
        feature(vec![(0.0, 0.0), (0.001, 0.0)], true),
        feature(vec![(0.001, 0.0), (0.0005, 0.001)], true),
        feature(vec![(0.0005, 0.001), (0.0, 0.0)], true),
    ];
    // Extra one-way A->B duplicate, imbalancing A (supply) and B (demand).
    features.push(feature(vec![(0.0, 0.0), (0.001, 0.0)], true));
    let route = run(features).await;

    assert_eq!(route.diagnostics.graph_edges, 4);
    assert!(route.diagnostics.duplicated_length_m > 0.0);
    assert!(route.valid);
    assert!(
        (route.diagnostics.deadhead_ratio - route.diagnostics.duplicated_length_m / route.length_m).abs()
            < 1e-6
    );
}
