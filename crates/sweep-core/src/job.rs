//! Job orchestration harness: a `JobStore` trait (pending/claim/update/save)
//! plus an in-memory reference implementation, standing in for the external
//! persistent job store described in spec §6 (grounded in
//! `apps/worker/app/services/job_processor.py`).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use sweep_common::{AreaId, JobId, JobRecord, JobStatus, Stage};

use crate::types::Diagnostics;

/// Claim/update/save surface the worker binary polls. Implementations must
/// be safe to share across the worker's job loop without external locking.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn enqueue(&self, area_id: AreaId) -> JobId;
    /// Atomically claims the oldest pending job, if any, marking it `processing`.
    async fn claim_pending(&self) -> Option<JobRecord>;
    async fn update_progress(&self, id: JobId, stage: Stage, percent: u8);
    async fn complete(&self, id: JobId, diagnostics: Diagnostics, warnings: bool);
    async fn fail(&self, id: JobId, error: String);
    async fn get(&self, id: JobId) -> Option<JobRecord>;
}

/// `HashMap`-backed `JobStore`, sufficient to run and test the worker loop
/// standalone. A real deployment swaps this for the external job store;
/// nothing else in `sweep-core` depends on the concrete implementation.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<u64, JobRecord>>,
    next_id: AtomicU64,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(&self, area_id: AreaId) -> JobId {
        let id = JobId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut jobs = self.jobs.lock();
        jobs.insert(id.0, JobRecord::pending(id, area_id));
        id
    }

    async fn claim_pending(&self) -> Option<JobRecord> {
        let mut jobs = self.jobs.lock();
        let mut ids: Vec<u64> = jobs
            .iter()
            .filter(|(_, record)| record.status == JobStatus::Pending)
            .map(|(&id, _)| id)
            .collect();
        ids.sort_unstable();
        let id = *ids.first()?;
        let record = jobs.get_mut(&id)?;
        record.status = JobStatus::Processing;
        Some(record.clone())
    }

    async fn update_progress(&self, id: JobId, stage: Stage, percent: u8) {
        let mut jobs = self.jobs.lock();
        if let Some(record) = jobs.get_mut(&id.0) {
            record.stage = Some(stage.as_str().to_string());
            record.progress = percent;
        }
    }

    async fn complete(&self, id: JobId, diagnostics: Diagnostics, warnings: bool) {
        let mut jobs = self.jobs.lock();
        if let Some(record) = jobs.get_mut(&id.0) {
            record.status = if warnings {
                JobStatus::CompletedWithWarnings
            } else {
                JobStatus::Completed
            };
            record.progress = 100;
            record.diagnostics = Some(diagnostics);
        }
    }

    async fn fail(&self, id: JobId, error: String) {
        let mut jobs = self.jobs.lock();
        if let Some(record) = jobs.get_mut(&id.0) {
            record.status = JobStatus::Failed;
            record.error = Some(error);
        }
    }

    async fn get(&self, id: JobId) -> Option<JobRecord> {
        self.jobs.lock().get(&id.0).cloned()
    }
}
