// ABOUTME: Command-line entry point and composition root for routewatch
// ABOUTME: Wires config, store, directions client and scheduler; `serve` runs the collector daemon

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use routewatch::directions::{RouteOptions, TravelMode};
use routewatch::export::{self, ExportFormat};
use routewatch::store::JobUpdate;
use routewatch::{Config, DirectionsClient, Job, JobStore, NewJob, Scheduler};

#[derive(Parser)]
#[command(name = "routewatch")]
#[command(about = "Collect travel time and distance for routes on a schedule", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (defaults to ./routewatch.toml when present)
    #[arg(long, global = true, env = "ROUTEWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Restore running jobs and keep collecting until Ctrl-C; picks up
    /// start/stop/pause/delete issued from other processes
    Serve,
    /// Create a new collection job (status: pending)
    Create(CreateArgs),
    /// List jobs
    List {
        /// Show jobs of every owner
        #[arg(long)]
        all: bool,
    },
    /// Show one job as JSON
    Show { id: Uuid },
    /// Edit a job; running jobs accept display fields only
    Edit(EditArgs),
    /// Delete a job and all of its snapshots
    Delete { id: Uuid },
    /// Start collecting (runs the first cycle immediately)
    Start { id: Uuid },
    /// Stop collecting and mark the job completed
    Stop { id: Uuid },
    /// Pause collecting
    Pause { id: Uuid },
    /// Resume a paused job
    Resume { id: Uuid },
    /// Print collected snapshots
    Snapshots { id: Uuid },
    /// Export a job's time series
    Export {
        id: Uuid,
        #[arg(long, default_value = "json")]
        format: ExportFormat,
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Look up the current best route without storing anything
    Preview {
        origin: String,
        destination: String,
        #[arg(long, default_value = "driving")]
        mode: TravelMode,
        #[arg(long)]
        avoid_highways: bool,
        #[arg(long)]
        avoid_tolls: bool,
    },
}

#[derive(clap::Args)]
struct CreateArgs {
    /// Address or "lat,lng"
    #[arg(long)]
    origin: String,
    /// Address or "lat,lng"
    #[arg(long)]
    destination: String,
    #[arg(long, default_value = "driving")]
    mode: TravelMode,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    origin_name: Option<String>,
    #[arg(long)]
    destination_name: Option<String>,
    #[arg(long, conflicts_with = "cycle_seconds")]
    cycle_minutes: Option<u64>,
    #[arg(long)]
    cycle_seconds: Option<u64>,
    /// RFC 3339 start of the collection window (defaults to now)
    #[arg(long)]
    start_time: Option<DateTime<Utc>>,
    /// RFC 3339 end of the collection window
    #[arg(long, conflicts_with = "duration_days")]
    end_time: Option<DateTime<Utc>>,
    #[arg(long)]
    duration_days: Option<u32>,
    #[arg(long)]
    avoid_highways: bool,
    #[arg(long)]
    avoid_tolls: bool,
}

#[derive(clap::Args)]
struct EditArgs {
    id: Uuid,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    origin_name: Option<String>,
    #[arg(long)]
    destination_name: Option<String>,
    #[arg(long)]
    origin: Option<String>,
    #[arg(long)]
    destination: Option<String>,
    #[arg(long)]
    mode: Option<TravelMode>,
    #[arg(long)]
    avoid_highways: Option<bool>,
    #[arg(long)]
    avoid_tolls: Option<bool>,
    #[arg(long)]
    cycle_minutes: Option<u64>,
    #[arg(long)]
    cycle_seconds: Option<u64>,
    #[arg(long)]
    start_time: Option<DateTime<Utc>>,
    #[arg(long)]
    end_time: Option<DateTime<Utc>>,
    #[arg(long)]
    duration_days: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let config = Config::load(cli.config.as_deref())?;
    let store = JobStore::open(&config.database.path).with_context(|| {
        format!(
            "Failed to open job store at {}",
            config.database.path.display()
        )
    })?;
    let client = Arc::new(DirectionsClient::new(&config.provider)?);
    let scheduler = Scheduler::new(
        store.clone(),
        client.clone(),
        Duration::from_secs(config.scheduler.min_cycle_secs),
    );

    match cli.command {
        Commands::Serve => {
            scheduler
                .run_until(
                    Duration::from_secs(config.scheduler.reconcile_secs),
                    shutdown_signal(),
                )
                .await
                .context("Failed to restore running jobs")?;
        }
        Commands::Create(args) => {
            let job = store.create_job(new_job(args, &config), scheduler.now())?;
            info!(job_id = %job.id, "job created");
            print_json(&job)?;
        }
        Commands::List { all } => {
            let owner = if all { None } else { Some(config.owner()) };
            for job in store.list_jobs(owner)? {
                print_job_line(&job);
            }
        }
        Commands::Show { id } => print_json(&require_job(&store, id)?)?,
        Commands::Edit(args) => {
            let id = args.id;
            let job = store.update_job(id, job_update(args), scheduler.now())?;
            print_json(&job)?;
        }
        Commands::Delete { id } => scheduler.delete_job(id)?,
        Commands::Start { id } => {
            let job = scheduler.start_job(id).await?;
            print_job_line(&job);
        }
        Commands::Stop { id } => scheduler.stop_job(id)?,
        Commands::Pause { id } => scheduler.pause_job(id)?,
        Commands::Resume { id } => print_job_line(&scheduler.resume_job(id).await?),
        Commands::Snapshots { id } => {
            require_job(&store, id)?;
            for s in store.list_snapshots(id)? {
                println!(
                    "{}  route {}  {:>6}s  {:>8}m",
                    s.collected_at.to_rfc3339(),
                    s.route_index,
                    s.duration_seconds.map(|v| v.to_string()).unwrap_or_else(|| "-".into()),
                    s.distance_meters.map(|v| v.to_string()).unwrap_or_else(|| "-".into()),
                );
            }
        }
        Commands::Export { id, format, output } => {
            let job = require_job(&store, id)?;
            let snapshots = store.list_snapshots(id)?;
            let rendered = export::render(format, &job, &snapshots)
                .context("Failed to render export")?;
            match output {
                Some(path) => {
                    std::fs::write(&path, rendered)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    info!(path = %path.display(), rows = snapshots.len(), "export written");
                }
                None => print!("{}", rendered),
            }
        }
        Commands::Preview {
            origin,
            destination,
            mode,
            avoid_highways,
            avoid_tolls,
        } => {
            let options = RouteOptions {
                mode,
                avoid_highways,
                avoid_tolls,
                alternatives: 0,
            };
            match client
                .fetch_primary_route(&origin, &destination, &options)
                .await?
            {
                Some(route) => print_json(&route)?,
                None => bail!(
                    "Route not found. Check that {} and {} are valid addresses",
                    origin,
                    destination
                ),
            }
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => warn!(error = %e, "failed to listen for Ctrl-C, shutting down"),
    }
}

fn new_job(args: CreateArgs, config: &Config) -> NewJob {
    NewJob {
        owner: Some(config.owner().to_string()),
        title: args.title,
        origin_name: args.origin_name,
        destination_name: args.destination_name,
        origin: args.origin,
        destination: args.destination,
        mode: args.mode,
        avoid_highways: args.avoid_highways,
        avoid_tolls: args.avoid_tolls,
        alternate_routes: 0,
        cycle_minutes: args.cycle_minutes,
        cycle_seconds: args.cycle_seconds,
        start_time: args.start_time,
        end_time: args.end_time,
        duration_days: Some(
            args.duration_days
                .unwrap_or(config.scheduler.default_duration_days),
        ),
    }
}

fn job_update(args: EditArgs) -> JobUpdate {
    JobUpdate {
        title: args.title,
        origin_name: args.origin_name,
        destination_name: args.destination_name,
        origin: args.origin,
        destination: args.destination,
        mode: args.mode,
        avoid_highways: args.avoid_highways,
        avoid_tolls: args.avoid_tolls,
        cycle_minutes: args.cycle_minutes,
        cycle_seconds: args.cycle_seconds,
        start_time: args.start_time,
        end_time: args.end_time,
        duration_days: args.duration_days,
    }
}

fn require_job(store: &JobStore, id: Uuid) -> Result<Job> {
    match store.get_job(id)? {
        Some(job) => Ok(job),
        None => bail!("Job not found: {}", id),
    }
}

fn print_job_line(job: &Job) {
    println!(
        "{}  {:<9}  every {:>5}s  {}",
        job.id,
        job.status.as_str(),
        job.cycle.as_secs(),
        job.label()
    );
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let raw = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", raw);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_create_defaults_duration_from_config() {
        let cli = Cli::try_parse_from([
            "routewatch",
            "create",
            "--origin",
            "A",
            "--destination",
            "40.7,-74.0",
            "--cycle-seconds",
            "30",
            "--mode",
            "walking",
        ])
        .unwrap();
        let Commands::Create(args) = cli.command else {
            panic!("expected create");
        };

        let new = new_job(args, &Config::default());
        assert_eq!(new.duration_days, Some(7));
        assert_eq!(new.mode, TravelMode::Walking);
        assert_eq!(new.cycle_seconds, Some(30));
        assert_eq!(new.owner.as_deref(), Some("anonymous"));
    }

    #[test]
    fn test_cycle_units_conflict() {
        let parsed = Cli::try_parse_from([
            "routewatch",
            "create",
            "--origin",
            "A",
            "--destination",
            "B",
            "--cycle-minutes",
            "5",
            "--cycle-seconds",
            "30",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_export_format_flag() {
        let id = Uuid::new_v4().to_string();
        let cli =
            Cli::try_parse_from(["routewatch", "export", id.as_str(), "--format", "csv"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Export {
                format: ExportFormat::Csv,
                ..
            }
        ));
    }
}
