// ABOUTME: Keeps a long-running scheduler's timer registry in line with persisted job status
// ABOUTME: Adopts jobs started by other processes and drops timers of jobs stopped elsewhere

use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};
use uuid::Uuid;

use super::{remove_timer, Scheduler};
use crate::error::SchedulerError;

/// What one reconcile pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reconciled {
    /// Timers created for running jobs that had none, or had one with a stale period.
    pub registered: usize,
    /// Timers dropped because their job is no longer running.
    pub cancelled: usize,
}

impl Reconciled {
    pub fn is_empty(&self) -> bool {
        self.registered == 0 && self.cancelled == 0
    }
}

impl Scheduler {
    /// Compare the registry with the jobs persisted as running and fix
    /// any difference.
    ///
    /// A newly adopted job collects right away only when a full cycle has
    /// passed since it was last updated; otherwise its first tick is
    /// scheduled for when the next collection is due.
    pub async fn reconcile(&self) -> Result<Reconciled, SchedulerError> {
        let (report, due_now) = self.reconcile_registry()?;
        futures::future::join_all(due_now.iter().map(|id| self.run_cycle(*id))).await;
        Ok(report)
    }

    fn reconcile_registry(&self) -> Result<(Reconciled, Vec<Uuid>), SchedulerError> {
        let mut timers = self.inner.timers();
        let running = self.store().list_running()?;
        let mut report = Reconciled::default();

        let stale: Vec<Uuid> = timers
            .iter()
            .filter(|(id, timer)| {
                timer.handle.is_finished() || !running.iter().any(|job| job.id == **id)
            })
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            remove_timer(&mut timers, id);
            report.cancelled += 1;
        }

        let missing: Vec<_> = running
            .iter()
            .filter(|job| {
                timers
                    .get(&job.id)
                    .map_or(true, |timer| timer.period != self.cycle_interval(job))
            })
            .collect();
        if missing.is_empty() {
            return Ok((report, Vec::new()));
        }

        self.inner
            .routes
            .ensure_configured()
            .map_err(SchedulerError::Configuration)?;

        let now = self.now();
        let mut due_now = Vec::new();
        for job in missing {
            let period = self.cycle_interval(job);
            let since = (now - job.updated_at).to_std().unwrap_or(Duration::ZERO);
            let first_tick = match period.checked_sub(since) {
                Some(wait) if !wait.is_zero() => wait,
                _ => {
                    due_now.push(job.id);
                    period
                }
            };
            self.install_timer(&mut timers, job, first_tick);
            report.registered += 1;
            info!(
                job_id = %job.id,
                route = %job.label(),
                interval_secs = period.as_secs(),
                first_tick_secs = first_tick.as_secs(),
                "job adopted"
            );
        }

        Ok((report, due_now))
    }

    /// Daemon loop: restore running jobs, reconcile every `every` until
    /// `shutdown` resolves, then cancel all timers.
    pub async fn run_until<F>(&self, every: Duration, shutdown: F) -> Result<usize, SchedulerError>
    where
        F: Future<Output = ()>,
    {
        let restored = self.restore_running_jobs().await?;
        info!(
            restored,
            reconcile_secs = every.as_secs(),
            "scheduler running"
        );

        let every = every.max(Duration::from_secs(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => match self.reconcile().await {
                    Ok(report) if !report.is_empty() => info!(
                        registered = report.registered,
                        cancelled = report.cancelled,
                        "registry reconciled with store"
                    ),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "reconcile failed, retrying on next pass"),
                },
            }
        }

        self.shutdown();
        Ok(restored)
    }
}
