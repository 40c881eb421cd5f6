// ABOUTME: Job and snapshot records plus the request types used to create and edit jobs
// ABOUTME: Jobs carry one typed cycle duration; legacy minutes/seconds are folded in at creation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::directions::models::{RouteOptions, TravelMode, MAX_ALTERNATE_ROUTES};

pub const DEFAULT_CYCLE_MINUTES: u64 = 60;
pub const DEFAULT_DURATION_DAYS: u32 = 7;
pub const DEFAULT_OWNER: &str = "anonymous";
/// Longest collection window expressible through `duration_days`.
pub const MAX_DURATION_DAYS: u32 = 36_500;
/// Longest accepted cycle.
pub const MAX_CYCLE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Completed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "paused" => Ok(JobStatus::Paused),
            "completed" => Ok(JobStatus::Completed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub owner: String,
    pub title: Option<String>,
    pub origin_name: Option<String>,
    pub destination_name: Option<String>,
    pub origin: String,
    pub destination: String,
    pub mode: TravelMode,
    pub avoid_highways: bool,
    pub avoid_tolls: bool,
    /// Deprecated; new jobs collect only the primary route.
    pub alternate_routes: u8,
    #[serde(with = "duration_secs")]
    pub cycle: Duration,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_days: u32,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub fn route_options(&self) -> RouteOptions {
        RouteOptions {
            mode: self.mode,
            avoid_highways: self.avoid_highways,
            avoid_tolls: self.avoid_tolls,
            alternatives: self.alternate_routes,
        }
    }

    /// End of the collection window: the explicit end time, or
    /// `duration_days` after the job's start time. `None` when that lies
    /// beyond the representable calendar, i.e. the window never closes.
    pub fn window_end(&self) -> Option<DateTime<Utc>> {
        match self.end_time {
            Some(end) => Some(end),
            None => self
                .start_time
                .checked_add_signed(chrono::Duration::days(i64::from(self.duration_days))),
        }
    }

    fn validate_schedule(&self) -> Result<(), String> {
        if self.duration_days > MAX_DURATION_DAYS {
            return Err(format!(
                "duration_days must be at most {}",
                MAX_DURATION_DAYS
            ));
        }
        if self.cycle > MAX_CYCLE {
            return Err(format!(
                "cycle must be at most {} seconds",
                MAX_CYCLE.as_secs()
            ));
        }
        if let Some(end) = self.end_time {
            if end <= self.start_time {
                return Err("end_time must be after start_time".to_string());
            }
        }
        Ok(())
    }

    pub fn label(&self) -> String {
        match &self.title {
            Some(title) => title.clone(),
            None => format!(
                "{} -> {}",
                self.origin_name.as_deref().unwrap_or(&self.origin),
                self.destination_name.as_deref().unwrap_or(&self.destination)
            ),
        }
    }
}

/// Fold the legacy minutes/seconds pair into one duration.
///
/// A positive seconds value wins; otherwise minutes (at least one) are used.
pub fn cycle_from_parts(minutes: Option<u64>, seconds: Option<u64>) -> Duration {
    match seconds {
        Some(s) if s > 0 => Duration::from_secs(s),
        _ => Duration::from_secs(
            minutes
                .unwrap_or(DEFAULT_CYCLE_MINUTES)
                .max(1)
                .saturating_mul(60),
        ),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewJob {
    pub owner: Option<String>,
    pub title: Option<String>,
    pub origin_name: Option<String>,
    pub destination_name: Option<String>,
    pub origin: String,
    pub destination: String,
    pub mode: TravelMode,
    pub avoid_highways: bool,
    pub avoid_tolls: bool,
    pub alternate_routes: u8,
    pub cycle_minutes: Option<u64>,
    pub cycle_seconds: Option<u64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_days: Option<u32>,
}

impl NewJob {
    pub fn new(origin: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
            ..Default::default()
        }
    }

    pub(crate) fn into_job(self, id: Uuid, now: DateTime<Utc>) -> Result<Job, String> {
        let origin = self.origin.trim().to_string();
        let destination = self.destination.trim().to_string();
        if origin.is_empty() || destination.is_empty() {
            return Err("origin and destination are required".to_string());
        }

        let start_time = self.start_time.unwrap_or(now);
        let job = Job {
            id,
            owner: clean(self.owner).unwrap_or_else(|| DEFAULT_OWNER.to_string()),
            title: clean(self.title),
            origin_name: clean(self.origin_name),
            destination_name: clean(self.destination_name),
            origin,
            destination,
            mode: self.mode,
            avoid_highways: self.avoid_highways,
            avoid_tolls: self.avoid_tolls,
            alternate_routes: self.alternate_routes.min(MAX_ALTERNATE_ROUTES),
            cycle: cycle_from_parts(self.cycle_minutes, self.cycle_seconds),
            start_time,
            end_time: self.end_time,
            duration_days: self.duration_days.unwrap_or(DEFAULT_DURATION_DAYS),
            status: JobStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        job.validate_schedule()?;
        Ok(job)
    }
}

/// Partial edit. Display fields set to a blank string are cleared.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JobUpdate {
    pub title: Option<String>,
    pub origin_name: Option<String>,
    pub destination_name: Option<String>,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub mode: Option<TravelMode>,
    pub avoid_highways: Option<bool>,
    pub avoid_tolls: Option<bool>,
    pub cycle_minutes: Option<u64>,
    pub cycle_seconds: Option<u64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_days: Option<u32>,
}

impl JobUpdate {
    /// Fields a running timer has already captured and must not change.
    pub fn schedule_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        let mut check = |set: bool, name: &'static str| {
            if set {
                fields.push(name);
            }
        };
        check(self.origin.is_some(), "origin");
        check(self.destination.is_some(), "destination");
        check(self.mode.is_some(), "mode");
        check(self.avoid_highways.is_some(), "avoid_highways");
        check(self.avoid_tolls.is_some(), "avoid_tolls");
        check(self.cycle_minutes.is_some(), "cycle_minutes");
        check(self.cycle_seconds.is_some(), "cycle_seconds");
        check(self.start_time.is_some(), "start_time");
        check(self.end_time.is_some(), "end_time");
        check(self.duration_days.is_some(), "duration_days");
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.origin_name.is_none()
            && self.destination_name.is_none()
            && self.schedule_fields().is_empty()
    }

    pub(crate) fn apply(self, job: &mut Job) -> Result<(), String> {
        if let Some(title) = self.title {
            job.title = clean(Some(title));
        }
        if let Some(name) = self.origin_name {
            job.origin_name = clean(Some(name));
        }
        if let Some(name) = self.destination_name {
            job.destination_name = clean(Some(name));
        }
        if let Some(origin) = self.origin {
            job.origin = required(origin, "origin")?;
        }
        if let Some(destination) = self.destination {
            job.destination = required(destination, "destination")?;
        }
        if let Some(mode) = self.mode {
            job.mode = mode;
        }
        if let Some(flag) = self.avoid_highways {
            job.avoid_highways = flag;
        }
        if let Some(flag) = self.avoid_tolls {
            job.avoid_tolls = flag;
        }
        if self.cycle_minutes.is_some() || self.cycle_seconds.is_some() {
            job.cycle = cycle_from_parts(self.cycle_minutes, self.cycle_seconds);
        }
        if let Some(start) = self.start_time {
            job.start_time = start;
        }
        if let Some(end) = self.end_time {
            job.end_time = Some(end);
        }
        if let Some(days) = self.duration_days {
            job.duration_days = days;
        }
        job.validate_schedule()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub id: Uuid,
    pub job_id: Uuid,
    pub route_index: u32,
    pub collected_at: DateTime<Utc>,
    pub duration_seconds: Option<i64>,
    pub distance_meters: Option<i64>,
    pub route_details: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct NewSnapshot {
    pub job_id: Uuid,
    pub route_index: u32,
    pub collected_at: DateTime<Utc>,
    pub duration_seconds: Option<i64>,
    pub distance_meters: Option<i64>,
    pub route_details: serde_json::Value,
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(value: String, field: &str) -> Result<String, String> {
    clean(Some(value)).ok_or_else(|| format!("{} must not be empty", field))
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job(now: DateTime<Utc>) -> Job {
        NewJob::new("A", "B").into_job(Uuid::new_v4(), now).unwrap()
    }

    #[test]
    fn test_cycle_seconds_override_minutes() {
        assert_eq!(cycle_from_parts(Some(5), Some(30)), Duration::from_secs(30));
        assert_eq!(cycle_from_parts(Some(5), Some(0)), Duration::from_secs(300));
        assert_eq!(cycle_from_parts(Some(0), None), Duration::from_secs(60));
        assert_eq!(cycle_from_parts(None, None), Duration::from_secs(3600));
    }

    #[test]
    fn test_new_job_defaults() {
        let now = Utc::now();
        let job = sample_job(now);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.owner, DEFAULT_OWNER);
        assert_eq!(job.mode, TravelMode::Driving);
        assert_eq!(job.duration_days, DEFAULT_DURATION_DAYS);
        assert_eq!(job.start_time, now);
        assert_eq!(job.created_at, job.updated_at);
    }

    #[test]
    fn test_new_job_requires_endpoints() {
        let err = NewJob::new("  ", "B")
            .into_job(Uuid::new_v4(), Utc::now())
            .unwrap_err();
        assert!(err.contains("required"));
    }

    #[test]
    fn test_blank_display_names_become_none() {
        let mut new = NewJob::new("A", "B");
        new.title = Some("   ".to_string());
        new.origin_name = Some(" Home ".to_string());
        let job = new.into_job(Uuid::new_v4(), Utc::now()).unwrap();
        assert_eq!(job.title, None);
        assert_eq!(job.origin_name.as_deref(), Some("Home"));
    }

    #[test]
    fn test_window_end_prefers_explicit_end_time() {
        let now = Utc::now();
        let mut job = sample_job(now);
        job.duration_days = 2;
        assert_eq!(job.window_end(), Some(now + chrono::Duration::days(2)));

        let end = now + chrono::Duration::hours(3);
        job.end_time = Some(end);
        assert_eq!(job.window_end(), Some(end));
    }

    #[test]
    fn test_window_end_past_calendar_is_open() {
        let mut job = sample_job(Utc::now());
        job.duration_days = u32::MAX;
        assert_eq!(job.window_end(), None);
    }

    #[test]
    fn test_oversized_schedule_is_rejected() {
        let mut new = NewJob::new("A", "B");
        new.duration_days = Some(u32::MAX);
        let err = new.into_job(Uuid::new_v4(), Utc::now()).unwrap_err();
        assert!(err.contains("duration_days"));

        let mut new = NewJob::new("A", "B");
        new.cycle_minutes = Some(u64::MAX);
        let err = new.into_job(Uuid::new_v4(), Utc::now()).unwrap_err();
        assert!(err.contains("cycle"));

        let mut job = sample_job(Utc::now());
        let update = JobUpdate {
            duration_days: Some(MAX_DURATION_DAYS + 1),
            ..Default::default()
        };
        assert!(update.apply(&mut job).is_err());
    }

    #[test]
    fn test_cycle_minutes_saturate() {
        assert_eq!(
            cycle_from_parts(Some(u64::MAX), None),
            Duration::from_secs(u64::MAX)
        );
    }

    #[test]
    fn test_update_reports_schedule_fields() {
        let update = JobUpdate {
            title: Some("Commute".to_string()),
            mode: Some(TravelMode::Transit),
            cycle_seconds: Some(30),
            ..Default::default()
        };
        assert_eq!(update.schedule_fields(), vec!["mode", "cycle_seconds"]);
        assert!(!update.is_empty());
        assert!(JobUpdate::default().is_empty());
    }

    #[test]
    fn test_update_rejects_end_before_start() {
        let now = Utc::now();
        let mut job = sample_job(now);
        let update = JobUpdate {
            end_time: Some(now - chrono::Duration::hours(1)),
            ..Default::default()
        };
        assert!(update.apply(&mut job).is_err());
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Paused,
            JobStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
    }
}
