//! Street-coverage route planner core: builds a driveable graph from raw
//! street geometry, connects it, Eulerizes it per strongly-connected
//! component, assembles the final polyline, and chunks it into time
//! buckets.

pub mod chunker;
pub mod cpp_solver;
pub mod graph_builder;
pub mod job;
pub mod mincost_flow;
pub mod pipeline;
pub mod route_assembler;
pub mod route_connector;
pub mod types;

pub use job::{InMemoryJobStore, JobStore};
pub use pipeline::{plan_route, PlanInput};
pub use types::{
    balance, Chunk, Circuit, Diagnostics, EdgeData, NodeData, Route, RouteGraph, SccStats,
    StreetFeature, StreetTags,
};
