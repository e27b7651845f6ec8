//! Error kinds for the street-coverage route planner.
//!
//! Transient kinds (`OracleTransient`, `OracleExhausted`, `MatchingInfeasible`,
//! `CircuitMissing`, `ContinuityBreached`) never escape the pipeline as
//! `Err` — callers convert them into a fallback plus a diagnostics counter
//! bump at the point of occurrence. Only `InvalidInput`, `Disconnected` (as a
//! warning, not a failure) and `Fatal` are meant to surface to the caller.
//! `Fatal` specifically is constructed at `WorkerLoop::process_one`'s panic
//! boundary (spec §7: "unexpected exception in solver" fails the job, not the
//! worker process) rather than anywhere in the pipeline itself.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("graph remains disconnected after {iterations} join iterations ({components} components)")]
    Disconnected { iterations: u32, components: usize },

    #[error("oracle request failed transiently: {0}")]
    OracleTransient(String),

    #[error("oracle retries exhausted: {0}")]
    OracleExhausted(String),

    #[error("min-cost flow matching infeasible: {0}")]
    MatchingInfeasible(String),

    #[error("eulerian circuit extraction failed for scc {scc_idx}: {reason}")]
    CircuitMissing { scc_idx: usize, reason: String },

    #[error("route continuity breached: {violations} gap(s), max {max_gap_m:.1}m")]
    ContinuityBreached { violations: usize, max_gap_m: f64 },

    #[error("fatal solver error: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
