// ABOUTME: Library root for routewatch, a scheduled travel-time collector
// ABOUTME: Polls a directions provider per job and stores the measurements in SQLite

pub mod config;
pub mod directions;
pub mod error;
pub mod export;
pub mod scheduler;
pub mod store;

pub use config::Config;
pub use directions::{DirectionsClient, DirectionsError, RouteSource};
pub use error::SchedulerError;
pub use scheduler::Scheduler;
pub use store::{Job, JobStatus, JobStore, NewJob, Snapshot};
