//! Runtime configuration.
//!
//! Mirrors the keys recognized by the original worker's `Settings`
//! (`apps/worker/app/config.py`): defaults are carried over verbatim so a
//! deployment migrating from the Python worker sees identical behavior
//! unless it explicitly overrides a key.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sleep between empty job polls, in seconds.
    pub poll_interval: u64,
    /// Overall per-job budget, in seconds, enforced by the orchestrator.
    pub job_timeout: u64,
    /// Max transient retry count for a whole job (orchestrator-level, not oracle retries).
    pub max_retries: u32,

    /// Oracle per-request timeout, in seconds.
    pub ors_timeout: u64,
    /// Oracle retry attempts before falling back to a straight line.
    pub ors_max_retries: u32,
    /// Oracle base backoff delay, in seconds (exponential, doubled per attempt).
    pub ors_retry_delay: f64,

    /// Validity gap threshold, in meters. A route with any consecutive-point
    /// gap larger than this is reported `valid = false`.
    pub max_gap_meters: f64,
    /// Node identification tolerance, in degrees.
    pub snap_tolerance: f64,

    /// Gate for the coverage-mode U-turn heuristic in `RouteConnector`
    /// (direct-connect below 50m, common-neighbor probe below 100m). See
    /// SPEC_FULL.md §4.2 — speculative, verify it does not inflate deadhead
    /// before enabling in production.
    pub coverage_mode_uturns: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval: 30,
            job_timeout: 3600,
            max_retries: 3,
            ors_timeout: 30,
            ors_max_retries: 3,
            ors_retry_delay: 1.0,
            max_gap_meters: 30.0,
            snap_tolerance: 1e-6,
            coverage_mode_uturns: true,
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::InvalidInput(format!("reading config file: {e}")))?;
        toml::from_str(&text).map_err(|e| Error::InvalidInput(format!("parsing config file: {e}")))
    }

    /// Overlay recognized environment variables (`POLL_INTERVAL`,
    /// `JOB_TIMEOUT`, `MAX_RETRIES`, `ORS_TIMEOUT`, `ORS_MAX_RETRIES`,
    /// `ORS_RETRY_DELAY`, `MAX_GAP_METERS`, `SNAP_TOLERANCE`,
    /// `COVERAGE_MODE_UTURNS`) onto `self`, leaving unset keys unchanged.
    pub fn apply_env_overrides(&mut self) {
        fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
            std::env::var(key).ok().and_then(|v| v.parse().ok())
        }

        if let Some(v) = parse_env::<u64>("POLL_INTERVAL") {
            self.poll_interval = v;
        }
        if let Some(v) = parse_env::<u64>("JOB_TIMEOUT") {
            self.job_timeout = v;
        }
        if let Some(v) = parse_env::<u32>("MAX_RETRIES") {
            self.max_retries = v;
        }
        if let Some(v) = parse_env::<u64>("ORS_TIMEOUT") {
            self.ors_timeout = v;
        }
        if let Some(v) = parse_env::<u32>("ORS_MAX_RETRIES") {
            self.ors_max_retries = v;
        }
        if let Some(v) = parse_env::<f64>("ORS_RETRY_DELAY") {
            self.ors_retry_delay = v;
        }
        if let Some(v) = parse_env::<f64>("MAX_GAP_METERS") {
            self.max_gap_meters = v;
        }
        if let Some(v) = parse_env::<f64>("SNAP_TOLERANCE") {
            self.snap_tolerance = v;
        }
        if let Some(v) = parse_env::<bool>("COVERAGE_MODE_UTURNS") {
            self.coverage_mode_uturns = v;
        }
    }

    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg
    }

    pub fn poll_interval_duration(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn job_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.job_timeout)
    }

    pub fn ors_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.ors_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_worker() {
        let cfg = Config::default();
        assert_eq!(cfg.poll_interval, 30);
        assert_eq!(cfg.job_timeout, 3600);
        assert_eq!(cfg.max_gap_meters, 30.0);
        assert_eq!(cfg.snap_tolerance, 1e-6);
    }

    #[test]
    fn from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_gap_meters = 12.0\nors_max_retries = 5\n").unwrap();

        let cfg = Config::from_file(&path).unwrap();
        assert_eq!(cfg.max_gap_meters, 12.0);
        assert_eq!(cfg.ors_max_retries, 5);
        // unspecified keys keep their default
        assert_eq!(cfg.poll_interval, 30);
    }

    #[test]
    fn env_override_takes_precedence() {
        std::env::set_var("MAX_GAP_METERS", "99.5");
        let cfg = Config::from_env();
        std::env::remove_var("MAX_GAP_METERS");
        assert_eq!(cfg.max_gap_meters, 99.5);
    }
}
