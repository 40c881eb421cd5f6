// ABOUTME: SQLite-backed job store: job configuration, status and snapshot time series
// ABOUTME: Every operation is a short synchronous single-row (or single-job) statement

pub mod models;
pub mod schema;

pub use models::{
    cycle_from_parts, Job, JobStatus, JobUpdate, NewJob, NewSnapshot, Snapshot,
    DEFAULT_DURATION_DAYS, DEFAULT_OWNER, MAX_CYCLE, MAX_DURATION_DAYS,
};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

use schema::init_schema;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job not found: {0}")]
    NotFound(Uuid),
    #[error("invalid job: {0}")]
    Validation(String),
    #[error("job is running; stop or pause it before changing {}", .fields.join(", "))]
    EditWhileRunning { fields: Vec<&'static str> },
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("failed to serialize route details: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("failed to prepare database location: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

const JOB_COLUMNS: &str = "id, owner, title, origin_name, destination_name, origin, destination,
     mode, avoid_highways, avoid_tolls, alternate_routes, cycle_seconds, start_time, end_time,
     duration_days, status, created_at, updated_at";

#[derive(Clone)]
pub struct JobStore {
    conn: Arc<Mutex<Connection>>,
}

impl JobStore {
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // a panic mid-statement leaves nothing half-written, the connection is still usable
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn create_job(&self, new: NewJob, now: DateTime<Utc>) -> StoreResult<Job> {
        let job = new
            .into_job(Uuid::new_v4(), now)
            .map_err(StoreError::Validation)?;

        self.conn().execute(
            &format!(
                "INSERT INTO jobs ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
                JOB_COLUMNS
            ),
            params![
                job.id.to_string(),
                job.owner,
                job.title,
                job.origin_name,
                job.destination_name,
                job.origin,
                job.destination,
                job.mode.as_str(),
                job.avoid_highways,
                job.avoid_tolls,
                i64::from(job.alternate_routes),
                secs(job.cycle),
                ts(job.start_time),
                job.end_time.map(ts),
                i64::from(job.duration_days),
                job.status.as_str(),
                ts(job.created_at),
                ts(job.updated_at),
            ],
        )?;

        Ok(job)
    }

    pub fn get_job(&self, id: Uuid) -> StoreResult<Option<Job>> {
        let job = self
            .conn()
            .query_row(
                &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
                [id.to_string()],
                job_from_row,
            )
            .optional()?;
        Ok(job)
    }

    /// Jobs newest first, optionally restricted to one owner.
    pub fn list_jobs(&self, owner: Option<&str>) -> StoreResult<Vec<Job>> {
        let conn = self.conn();
        let jobs = match owner {
            Some(owner) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM jobs WHERE owner = ?1 ORDER BY created_at DESC",
                    JOB_COLUMNS
                ))?;
                let rows = stmt.query_map([owner], job_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM jobs ORDER BY created_at DESC",
                    JOB_COLUMNS
                ))?;
                let rows = stmt.query_map([], job_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(jobs)
    }

    pub fn list_running(&self) -> StoreResult<Vec<Job>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM jobs WHERE status = ?1 ORDER BY created_at ASC",
            JOB_COLUMNS
        ))?;
        let rows = stmt.query_map([JobStatus::Running.as_str()], job_from_row)?;
        let jobs = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(jobs)
    }

    /// Apply a partial edit. A running job only accepts display fields.
    pub fn update_job(&self, id: Uuid, update: JobUpdate, now: DateTime<Utc>) -> StoreResult<Job> {
        let mut job = self.get_job(id)?.ok_or(StoreError::NotFound(id))?;

        if job.status == JobStatus::Running {
            let fields = update.schedule_fields();
            if !fields.is_empty() {
                return Err(StoreError::EditWhileRunning { fields });
            }
        }
        if update.is_empty() {
            return Ok(job);
        }

        update.apply(&mut job).map_err(StoreError::Validation)?;
        job.updated_at = now;

        self.conn().execute(
            "UPDATE jobs SET title = ?2, origin_name = ?3, destination_name = ?4, origin = ?5,
                 destination = ?6, mode = ?7, avoid_highways = ?8, avoid_tolls = ?9,
                 cycle_seconds = ?10, start_time = ?11, end_time = ?12, duration_days = ?13,
                 updated_at = ?14
             WHERE id = ?1",
            params![
                id.to_string(),
                job.title,
                job.origin_name,
                job.destination_name,
                job.origin,
                job.destination,
                job.mode.as_str(),
                job.avoid_highways,
                job.avoid_tolls,
                secs(job.cycle),
                ts(job.start_time),
                job.end_time.map(ts),
                i64::from(job.duration_days),
                ts(job.updated_at),
            ],
        )?;

        Ok(job)
    }

    pub fn set_status(&self, id: Uuid, status: JobStatus) -> StoreResult<()> {
        let changed = self.conn().execute(
            "UPDATE jobs SET status = ?2 WHERE id = ?1",
            params![id.to_string(), status.as_str()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    pub fn touch_updated_at(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        let changed = self.conn().execute(
            "UPDATE jobs SET updated_at = ?2 WHERE id = ?1",
            params![id.to_string(), ts(at)],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    pub fn insert_snapshot(&self, snapshot: &NewSnapshot) -> StoreResult<Uuid> {
        let id = Uuid::new_v4();
        let details = serde_json::to_string(&snapshot.route_details)?;

        self.conn().execute(
            "INSERT INTO snapshots (id, job_id, route_index, collected_at, duration_seconds,
                 distance_meters, route_details)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id.to_string(),
                snapshot.job_id.to_string(),
                i64::from(snapshot.route_index),
                ts(snapshot.collected_at),
                snapshot.duration_seconds,
                snapshot.distance_meters,
                details,
            ],
        )?;

        Ok(id)
    }

    /// Snapshots for a job in collection order.
    pub fn list_snapshots(&self, job_id: Uuid) -> StoreResult<Vec<Snapshot>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, job_id, route_index, collected_at, duration_seconds, distance_meters,
                    route_details
             FROM snapshots WHERE job_id = ?1
             ORDER BY collected_at ASC, route_index ASC",
        )?;
        let rows = stmt.query_map([job_id.to_string()], snapshot_from_row)?;
        let snapshots = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(snapshots)
    }

    pub fn count_snapshots(&self, job_id: Uuid) -> StoreResult<usize> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM snapshots WHERE job_id = ?1",
            [job_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Remove a job and all of its snapshots. Returns false if it did not exist.
    pub fn delete_job(&self, id: Uuid) -> StoreResult<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM snapshots WHERE job_id = ?1", [id.to_string()])?;
        let removed = tx.execute("DELETE FROM jobs WHERE id = ?1", [id.to_string()])?;
        tx.commit()?;
        Ok(removed > 0)
    }
}

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn secs(d: Duration) -> i64 {
    i64::try_from(d.as_secs()).unwrap_or(i64::MAX)
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn uuid_at(row: &Row, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw).map_err(|e| conversion_error(idx, e))
}

fn time_at(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn opt_time_at(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        Some(_) => time_at(row, idx).map(Some),
        None => Ok(None),
    }
}

fn parsed_at<T: std::str::FromStr<Err = String>>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| {
        conversion_error(idx, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    })
}

fn job_from_row(row: &Row) -> rusqlite::Result<Job> {
    let alternate_routes: i64 = row.get(10)?;
    let cycle_seconds: i64 = row.get(11)?;
    let duration_days: i64 = row.get(14)?;

    Ok(Job {
        id: uuid_at(row, 0)?,
        owner: row.get(1)?,
        title: row.get(2)?,
        origin_name: row.get(3)?,
        destination_name: row.get(4)?,
        origin: row.get(5)?,
        destination: row.get(6)?,
        mode: parsed_at(row, 7)?,
        avoid_highways: row.get(8)?,
        avoid_tolls: row.get(9)?,
        alternate_routes: alternate_routes.clamp(0, i64::from(u8::MAX)) as u8,
        cycle: Duration::from_secs(cycle_seconds.max(0) as u64),
        start_time: time_at(row, 12)?,
        end_time: opt_time_at(row, 13)?,
        duration_days: duration_days.clamp(0, i64::from(u32::MAX)) as u32,
        status: parsed_at(row, 15)?,
        created_at: time_at(row, 16)?,
        updated_at: time_at(row, 17)?,
    })
}

fn snapshot_from_row(row: &Row) -> rusqlite::Result<Snapshot> {
    let route_index: i64 = row.get(2)?;
    let details: Option<String> = row.get(6)?;
    let route_details = details
        .map(|raw| serde_json::from_str(&raw).map_err(|e| conversion_error(6, e)))
        .transpose()?;

    Ok(Snapshot {
        id: uuid_at(row, 0)?,
        job_id: uuid_at(row, 1)?,
        route_index: route_index.max(0) as u32,
        collected_at: time_at(row, 3)?,
        duration_seconds: row.get(4)?,
        distance_meters: row.get(5)?,
        route_details,
    })
}
