//! The worker's job-processing loop (spec §5: single-threaded cooperative,
//! one job at a time, `poll_interval` sleep between empty polls). Grounded in
//! `apps/worker/app/services/job_processor.py`'s `JobProcessor.start` /
//! `process_job`, translated from its polling `while self.running` loop into
//! an explicit, cancellable `tokio` loop.

use std::sync::Arc;

use sweep_common::Config;
use sweep_core::job::JobStore;
use sweep_core::pipeline::{plan_route, PlanInput};
use sweep_oracle::Oracle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Drives a `JobStore`'s claim/update/complete/fail surface, running
/// `plan_route` for every claimed job. The CLI's standalone harness has no
/// external map-extract service to resolve a job's `AreaId` into its own
/// street data (spec §1 Out-of-scope), so every claimed job is planned
/// against the same caller-supplied `PlanInput` factory.
pub struct WorkerLoop {
    store: Arc<dyn JobStore>,
    oracle: Arc<dyn Oracle>,
    cfg: Config,
}

impl WorkerLoop {
    pub fn new(store: Arc<dyn JobStore>, oracle: Arc<dyn Oracle>, cfg: Config) -> Self {
        Self { store, oracle, cfg }
    }

    /// Claims and processes at most one pending job. Returns `true` if a job
    /// was claimed (whether it succeeded or failed), `false` on an empty
    /// queue so the caller knows to sleep.
    ///
    /// Planning runs on its own `tokio` task so a panic inside the solver
    /// (spec §7 `Fatal`: "unexpected exception in solver") fails only this
    /// job — `tokio::spawn` catches the unwind and reports it as a
    /// `JoinError` rather than taking down the worker process, the async
    /// equivalent of the teacher's `catch_unwind` at its FFI boundary.
    pub async fn process_one(
        &self,
        build_input: &(dyn Fn() -> PlanInput + Send + Sync),
        cancel: &CancellationToken,
    ) -> bool {
        let Some(job) = self.store.claim_pending().await else {
            return false;
        };
        info!(job_id = job.id.0, area_id = job.area_id.0, "claimed job");
        let id = job.id;

        let input = build_input();
        let oracle = self.oracle.clone();
        let cfg = self.cfg.clone();
        let task_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            let mut stages = Vec::new();
            let result = plan_route(input, &cfg, oracle.as_ref(), &task_cancel, |stage, pct| {
                stages.push((stage, pct));
            })
            .await;
            (stages, result)
        });

        let result = match task.await {
            Ok((stages, result)) => {
                for (stage, pct) in stages {
                    self.store.update_progress(id, stage, pct).await;
                }
                result
            }
            Err(join_err) => Err(sweep_common::Error::Fatal(format!("solver panicked: {join_err}"))),
        };

        match result {
            Ok(route) => {
                // spec §1 job lifecycle: `completed_with_warnings` when the
                // route is geometrically sound but something was degraded
                // (continuity violations or a component the connector never
                // joined).
                let warnings = !route.diagnostics.continuity_valid || route.diagnostics.components_after > 1;
                info!(
                    job_id = id.0,
                    length_m = route.length_m,
                    valid = route.valid,
                    warnings,
                    "job completed"
                );
                self.store.complete(id, route.diagnostics, warnings).await;
            }
            Err(e) => {
                error!(job_id = id.0, error = %e, "job failed");
                self.store.fail(id, e.to_string()).await;
            }
        }
        true
    }

    /// Runs the poll loop until cancelled: claim-and-process, or sleep
    /// `poll_interval` on an empty queue (spec §5). Every suspension point
    /// (the sleep, and every await inside `process_one`) is cancellable.
    pub async fn run(&self, build_input: &(dyn Fn() -> PlanInput + Send + Sync), cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            let claimed = self.process_one(build_input, &cancel).await;
            if !claimed {
                info!(poll_interval_s = self.cfg.poll_interval, "no pending jobs, sleeping");
                tokio::select! {
                    _ = tokio::time::sleep(self.cfg.poll_interval_duration()) => {}
                    _ = cancel.cancelled() => return,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::LineString;
    use sweep_common::{AreaId, Profile};
    use sweep_core::job::InMemoryJobStore;
    use sweep_core::types::{StreetFeature, StreetTags};
    use sweep_oracle::NullOracle;

    fn square_input() -> PlanInput {
        let square = StreetFeature {
            geometry: LineString::from(vec![
                (0.0, 0.0),
                (0.001, 0.0),
                (0.001, 0.001),
                (0.0, 0.001),
                (0.0, 0.0),
            ]),
            tags: StreetTags {
                highway: Some("residential".to_string()),
                ..Default::default()
            },
        };
        PlanInput {
            features: vec![square],
            center: None,
            profile: Profile::DrivingCar,
            chunk_duration_s: 600.0,
        }
    }

    #[tokio::test]
    async fn process_one_returns_false_on_empty_queue() {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let loop_ = WorkerLoop::new(store, Arc::new(NullOracle), Config::default());
        let claimed = loop_.process_one(&square_input, &CancellationToken::new()).await;
        assert!(!claimed);
    }

    #[tokio::test]
    async fn process_one_completes_a_claimed_job() {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let id = store.enqueue(AreaId(1)).await;
        let loop_ = WorkerLoop::new(store.clone(), Arc::new(NullOracle), Config::default());

        let claimed = loop_.process_one(&square_input, &CancellationToken::new()).await;
        assert!(claimed);

        let record = store.get(id).await.unwrap();
        assert!(record.status.is_terminal());
    }
}
