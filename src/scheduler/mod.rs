// ABOUTME: Job scheduler: owns the per-job timer registry and the start/stop/pause/resume lifecycle
// ABOUTME: Persisted job status is the source of truth; the registry is rebuilt from it at boot

pub mod clock;
pub mod cycle;
pub mod reconcile;

pub use clock::{Clock, SystemClock};
pub use cycle::CycleOutcome;
pub use reconcile::Reconciled;

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::directions::RouteSource;
use crate::error::SchedulerError;
use crate::store::{Job, JobStatus, JobStore, MAX_CYCLE};


/// Floor for any job's cycle, bounding provider request rate.
pub const MIN_CYCLE: Duration = Duration::from_secs(10);

/// Owns one repeating timer per running job.
///
/// Cloning is cheap and every clone shares the same registry. Timer tasks
/// hold only a weak reference, so dropping the last clone cancels them.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    store: JobStore,
    routes: Arc<dyn RouteSource>,
    clock: Arc<dyn Clock>,
    min_cycle: Duration,
    timers: Mutex<HashMap<Uuid, Timer>>,
}

/// A registered repeating timer and the period it was created with.
struct Timer {
    handle: JoinHandle<()>,
    period: Duration,
}

type Registry = HashMap<Uuid, Timer>;

impl Inner {
    /// Status writes that add or remove a timer happen under this lock.
    fn timers(&self) -> MutexGuard<'_, Registry> {
        self.timers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let timers = self.timers.get_mut().unwrap_or_else(|p| p.into_inner());
        for (_, timer) in timers.drain() {
            timer.handle.abort();
        }
    }
}

impl Scheduler {
    pub fn new(store: JobStore, routes: Arc<dyn RouteSource>, min_cycle: Duration) -> Self {
        Self::with_clock(store, routes, min_cycle, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: JobStore,
        routes: Arc<dyn RouteSource>,
        min_cycle: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                routes,
                clock,
                min_cycle: min_cycle.clamp(Duration::from_secs(1), MAX_CYCLE),
                timers: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.inner.store
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    /// Timer period for a job, fixed for the lifetime of one registration.
    pub fn cycle_interval(&self, job: &Job) -> Duration {
        job.cycle.min(MAX_CYCLE).max(self.inner.min_cycle)
    }

    /// Start collecting. Runs the first cycle before returning.
    ///
    /// A job that is already running is left untouched. If the provider
    /// rejects that first request (bad key, quota) the start is undone and
    /// the rejection is returned.
    pub async fn start_job(&self, job_id: Uuid) -> Result<Job, SchedulerError> {
        let job = self.require_job(job_id)?;
        if job.status == JobStatus::Running {
            debug!(job_id = %job_id, "start requested for running job, ignoring");
            return Ok(job);
        }

        self.inner
            .routes
            .ensure_configured()
            .map_err(SchedulerError::Configuration)?;

        let period = {
            let mut timers = self.inner.timers();
            self.store().set_status(job_id, JobStatus::Running)?;
            let period = self.cycle_interval(&job);
            self.install_timer(&mut timers, &job, period)
        };
        info!(
            job_id = %job_id,
            route = %job.label(),
            interval_secs = period.as_secs(),
            "job started"
        );

        match self.try_cycle(job_id).await {
            Ok(_) => {}
            Err(e) if e.is_fatal() => {
                self.undo_start(job_id, job.status)?;
                warn!(job_id = %job_id, error = %e, "provider rejected first collection, start undone");
                return Err(SchedulerError::Configuration(e));
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "route fetch failed, waiting for next cycle");
            }
        }
        self.require_job(job_id)
    }

    /// Cancel the timer and mark the job completed. Safe to repeat.
    pub fn stop_job(&self, job_id: Uuid) -> Result<(), SchedulerError> {
        let cancelled = self.deactivate(job_id, JobStatus::Completed)?;
        info!(job_id = %job_id, timer_cancelled = cancelled, "job stopped");
        Ok(())
    }

    /// Like `stop_job`, but the job is expected to resume.
    pub fn pause_job(&self, job_id: Uuid) -> Result<(), SchedulerError> {
        let cancelled = self.deactivate(job_id, JobStatus::Paused)?;
        info!(job_id = %job_id, timer_cancelled = cancelled, "job paused");
        Ok(())
    }

    /// Restart a paused job. Any other status is left as is.
    pub async fn resume_job(&self, job_id: Uuid) -> Result<Job, SchedulerError> {
        let job = self.require_job(job_id)?;
        if job.status != JobStatus::Paused {
            debug!(job_id = %job_id, status = %job.status, "resume ignored, job not paused");
            return Ok(job);
        }
        self.start_job(job_id).await
    }

    /// Cancel any live timer, then remove the job and its snapshots.
    pub fn delete_job(&self, job_id: Uuid) -> Result<(), SchedulerError> {
        let deleted = {
            let mut timers = self.inner.timers();
            remove_timer(&mut timers, job_id);
            self.store().delete_job(job_id)?
        };
        if !deleted {
            return Err(SchedulerError::NotFound(job_id));
        }
        info!(job_id = %job_id, "job deleted");
        Ok(())
    }

    /// Re-register timers for every job persisted as running.
    ///
    /// Called once at process startup. Status is not rewritten; each job
    /// gets one immediate cycle, as with `start_job`.
    pub async fn restore_running_jobs(&self) -> Result<usize, SchedulerError> {
        let jobs = self.store().list_running()?;
        if jobs.is_empty() {
            info!("no running jobs to restore");
            return Ok(0);
        }

        self.inner
            .routes
            .ensure_configured()
            .map_err(SchedulerError::Configuration)?;

        for job in &jobs {
            let period = self.register_timer(job);
            info!(
                job_id = %job.id,
                route = %job.label(),
                interval_secs = period.as_secs(),
                "job restored"
            );
        }

        futures::future::join_all(jobs.iter().map(|job| self.run_cycle(job.id))).await;
        Ok(jobs.len())
    }

    pub fn list_active_job_ids(&self) -> HashSet<Uuid> {
        self.inner
            .timers()
            .iter()
            .filter(|(_, timer)| !timer.handle.is_finished())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Cancel every timer without touching persisted status, so the next
    /// boot restores the same jobs.
    pub fn shutdown(&self) {
        let mut timers = self.inner.timers();
        let count = timers.len();
        for (_, timer) in timers.drain() {
            timer.handle.abort();
        }
        info!(timers = count, "scheduler shut down");
    }

    fn require_job(&self, job_id: Uuid) -> Result<Job, SchedulerError> {
        self.store()
            .get_job(job_id)?
            .ok_or(SchedulerError::NotFound(job_id))
    }

    /// Cancel the timer and write the new status as one step, so a
    /// concurrent start cannot leave a timer behind a non-running status.
    fn deactivate(&self, job_id: Uuid, status: JobStatus) -> Result<bool, SchedulerError> {
        let mut timers = self.inner.timers();
        let cancelled = remove_timer(&mut timers, job_id);
        self.store().set_status(job_id, status)?;
        Ok(cancelled)
    }

    /// Roll back a start whose first collection was rejected, unless the
    /// job has been paused, stopped or deleted meanwhile.
    fn undo_start(&self, job_id: Uuid, previous: JobStatus) -> Result<(), SchedulerError> {
        let mut timers = self.inner.timers();
        remove_timer(&mut timers, job_id);
        if let Some(current) = self.store().get_job(job_id)? {
            if current.status == JobStatus::Running {
                self.store().set_status(job_id, previous)?;
            }
        }
        Ok(())
    }

    fn register_timer(&self, job: &Job) -> Duration {
        let period = self.cycle_interval(job);
        self.install_timer(&mut self.inner.timers(), job, period)
    }

    /// Replace any timer for the job with a new one whose first tick is
    /// `first_tick` from now. Returns the period.
    fn install_timer(&self, timers: &mut Registry, job: &Job, first_tick: Duration) -> Duration {
        let job_id = job.id;
        let period = self.cycle_interval(job);
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);

        remove_timer(timers, job_id);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                Scheduler { inner }.run_cycle(job_id).await;
            }
        });

        timers.insert(job_id, Timer { handle, period });
        period
    }
}

fn remove_timer(timers: &mut Registry, job_id: Uuid) -> bool {
    match timers.remove(&job_id) {
        Some(timer) => {
            timer.handle.abort();
            true
        }
        None => false,
    }
}
