// ABOUTME: One collection cycle: re-check the job, enforce its window, fetch routes, persist snapshots
// ABOUTME: Failures are logged and contained so the job's timer keeps ticking

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::Scheduler;
use crate::directions::{CollectedRoute, DirectionsError};
use crate::store::{JobStatus, NewSnapshot, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Job missing or no longer running.
    Skipped,
    /// Before the job's start time.
    NotStarted,
    /// Collection window over; the job was stopped.
    Expired,
    /// Provider found no route this time.
    NoRoutes,
    /// Snapshots written, one per route.
    Collected(usize),
    Failed,
}

impl Scheduler {
    /// Run one cycle, logging a provider failure and waiting for the next tick.
    pub async fn run_cycle(&self, job_id: Uuid) -> CycleOutcome {
        match self.try_cycle(job_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    job_id = %job_id,
                    error = %e,
                    fatal = e.is_fatal(),
                    "route fetch failed, waiting for next cycle"
                );
                CycleOutcome::Failed
            }
        }
    }

    /// One cycle with the provider error handed back to the caller.
    /// Store failures are still logged here and reported as `Failed`.
    pub(super) async fn try_cycle(&self, job_id: Uuid) -> Result<CycleOutcome, DirectionsError> {
        // Re-read on every tick: a pause, stop or delete may have raced this timer.
        let job = match self.store().get_job(job_id) {
            Ok(Some(job)) if job.status == JobStatus::Running => job,
            Ok(Some(job)) => {
                debug!(job_id = %job_id, status = %job.status, "job not running, skipping cycle");
                return Ok(CycleOutcome::Skipped);
            }
            Ok(None) => {
                debug!(job_id = %job_id, "job gone, skipping cycle");
                return Ok(CycleOutcome::Skipped);
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "failed to load job for cycle");
                return Ok(CycleOutcome::Failed);
            }
        };

        let now = self.now();
        if let Some(window_end) = job.window_end().filter(|end| now > *end) {
            info!(job_id = %job_id, window_end = %window_end, "collection window ended, stopping job");
            if let Err(e) = self.stop_job(job_id) {
                warn!(job_id = %job_id, error = %e, "failed to stop expired job");
            }
            return Ok(CycleOutcome::Expired);
        }
        if now < job.start_time {
            debug!(job_id = %job_id, start_time = %job.start_time, "job window not open yet");
            return Ok(CycleOutcome::NotStarted);
        }

        let routes = self
            .inner
            .routes
            .fetch_routes_for_collection(&job.origin, &job.destination, &job.route_options())
            .await?;

        if routes.is_empty() {
            info!(
                job_id = %job_id,
                origin = %job.origin,
                destination = %job.destination,
                "no route returned, waiting for next cycle"
            );
            return Ok(CycleOutcome::NoRoutes);
        }

        // One timestamp for every route of this cycle.
        let collected_at = self.now();
        let outcome = match self.persist(job_id, &routes, collected_at) {
            Ok(written) => {
                debug!(
                    job_id = %job_id,
                    snapshots = written,
                    duration_seconds = ?routes[0].duration_seconds,
                    "cycle collected"
                );
                CycleOutcome::Collected(written)
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "failed to persist snapshots");
                CycleOutcome::Failed
            }
        };
        Ok(outcome)
    }

    fn persist(
        &self,
        job_id: Uuid,
        routes: &[CollectedRoute],
        collected_at: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        for route in routes {
            self.store().insert_snapshot(&NewSnapshot {
                job_id,
                route_index: route.route_index,
                collected_at,
                duration_seconds: route.duration_seconds,
                distance_meters: route.distance_meters,
                route_details: serde_json::to_value(&route.details)?,
            })?;
        }
        self.store().touch_updated_at(job_id, collected_at)?;
        Ok(routes.len())
    }
}
