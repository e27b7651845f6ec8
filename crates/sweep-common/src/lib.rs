//! Shared error types, configuration, travel profiles and job identity for
//! the street-coverage route planner.
//!
//! This crate carries no geometry or graph code — it is the dependency every
//! other `sweep-*` crate, plus the `sweep-worker` binary, links against for a
//! single definition of "what went wrong" and "what was configured".

pub mod config;
pub mod error;
pub mod job;
pub mod profile;

pub use config::Config;
pub use error::{Error, Result};
pub use job::{AreaId, Diagnostics, JobId, JobRecord, JobStatus, Progress, SccStats, Stage};
pub use profile::Profile;
