// ABOUTME: SQLite schema for jobs and their snapshot time series
// ABOUTME: Applied idempotently every time a store is opened

use rusqlite::Connection;

pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    owner TEXT NOT NULL DEFAULT 'anonymous',
    title TEXT,
    origin_name TEXT,
    destination_name TEXT,
    origin TEXT NOT NULL,
    destination TEXT NOT NULL,
    mode TEXT NOT NULL DEFAULT 'driving',
    avoid_highways INTEGER NOT NULL DEFAULT 0,
    avoid_tolls INTEGER NOT NULL DEFAULT 0,
    alternate_routes INTEGER NOT NULL DEFAULT 0,
    cycle_seconds INTEGER NOT NULL DEFAULT 3600,
    start_time TEXT NOT NULL,
    end_time TEXT,
    duration_days INTEGER NOT NULL DEFAULT 7,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS snapshots (
    id TEXT PRIMARY KEY,
    job_id TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
    route_index INTEGER NOT NULL DEFAULT 0,
    collected_at TEXT NOT NULL,
    duration_seconds INTEGER,
    distance_meters INTEGER,
    route_details TEXT
);

CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
CREATE INDEX IF NOT EXISTS idx_jobs_owner_created ON jobs(owner, created_at);
CREATE INDEX IF NOT EXISTS idx_snapshots_job_collected ON snapshots(job_id, collected_at);
"#;
