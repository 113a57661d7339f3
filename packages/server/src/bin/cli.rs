//! `cli`: a small operator tool exposing the Scheduler Control Plane's
//! one-shot/DB-backed operations for manual operation and scripting.
//! Registering a live cron repeat (`scheduleRecurring`, `listSchedules`,
//! `stopSchedule`) requires a `CronRegistry` running inside a long-lived
//! process, which this short-lived CLI is not; those stay the `server`
//! binary's responsibility. See DESIGN.md.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use server_core::config::Config;
use server_core::jobs::model::{JobPriority, JobStatus};
use server_core::jobs::store::PostgresJobStore;
use server_core::persistence::{LinkagePersistenceLayer, PersistenceLayer};
use server_core::scheduler::{
    ControlPlane, RunRefillNowInput, ScheduleCallInput, ScheduleDelayedOptions,
    SchedulerControlPlane,
};

#[derive(Parser)]
#[command(name = "cli", about = "Operator CLI for the call orchestration engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enqueue a place-call job immediately.
    ScheduleImmediate {
        #[arg(long)]
        to: String,
        #[arg(long)]
        message: Option<String>,
        #[arg(long)]
        lead_id: Option<Uuid>,
        #[arg(long, default_value = "normal")]
        priority: PriorityArg,
        #[arg(long)]
        speak_first: bool,
        #[arg(long)]
        initial_message: Option<String>,
    },
    /// Enqueue a place-call job after a delay.
    ScheduleDelayed {
        #[arg(long)]
        to: String,
        #[arg(long)]
        message: Option<String>,
        #[arg(long)]
        lead_id: Option<Uuid>,
        #[arg(long, default_value = "normal")]
        priority: PriorityArg,
        #[arg(long)]
        delay_ms: i64,
    },
    /// Run a one-shot refill-from-leads pass right now.
    RunRefillNow {
        #[arg(long)]
        message: Option<String>,
        #[arg(long, default_value = "normal")]
        priority: PriorityArg,
        #[arg(long, default_value_t = 50)]
        lead_limit: i64,
    },
    /// Print aggregate job counts by status.
    Stats,
    /// List jobs in a given state.
    List {
        #[arg(long)]
        state: StateArg,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Print a single job by id.
    Get {
        #[arg(long)]
        job_id: Uuid,
    },
    /// Cancel a pending job.
    Cancel {
        #[arg(long)]
        job_id: Uuid,
    },
    /// Reset a failed job back to pending.
    Retry {
        #[arg(long)]
        job_id: Uuid,
    },
    /// Sweep terminal jobs past the retention policy.
    Clean,
    /// Pause dispatch; in-flight jobs still run to completion.
    Pause,
    /// Resume dispatch.
    Resume,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum PriorityArg {
    Critical,
    High,
    Normal,
    Low,
}

impl From<PriorityArg> for JobPriority {
    fn from(p: PriorityArg) -> Self {
        match p {
            PriorityArg::Critical => JobPriority::Critical,
            PriorityArg::High => JobPriority::High,
            PriorityArg::Normal => JobPriority::Normal,
            PriorityArg::Low => JobPriority::Low,
        }
    }
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum StateArg {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl From<StateArg> for JobStatus {
    fn from(s: StateArg) -> Self {
        match s {
            StateArg::Pending => JobStatus::Pending,
            StateArg::Running => JobStatus::Running,
            StateArg::Succeeded => JobStatus::Succeeded,
            StateArg::Failed => JobStatus::Failed,
            StateArg::Cancelled => JobStatus::Cancelled,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    let store = Arc::new(PostgresJobStore::new(pool.clone()));
    let persistence: Arc<dyn PersistenceLayer> =
        Arc::new(LinkagePersistenceLayer::new(pool));
    let control_plane = ControlPlane::new();
    let sc = SchedulerControlPlane::new(store, persistence, control_plane).await?;

    match cli.command {
        Command::ScheduleImmediate {
            to,
            message,
            lead_id,
            priority,
            speak_first,
            initial_message,
        } => {
            let job_id = sc
                .schedule_immediate(ScheduleCallInput {
                    to,
                    message,
                    lead_id,
                    priority: priority.into(),
                    record: false,
                    speak_first,
                    initial_message,
                })
                .await?;
            println!("scheduled job {job_id}");
        }
        Command::ScheduleDelayed {
            to,
            message,
            lead_id,
            priority,
            delay_ms,
        } => {
            let job_id = sc
                .schedule_delayed(
                    ScheduleCallInput {
                        to,
                        message,
                        lead_id,
                        priority: priority.into(),
                        record: false,
                        speak_first: false,
                        initial_message: None,
                    },
                    ScheduleDelayedOptions {
                        delay_ms: Some(delay_ms),
                        schedule_at: None,
                    },
                )
                .await?;
            println!("scheduled job {job_id} (delayed {delay_ms}ms)");
        }
        Command::RunRefillNow {
            message,
            priority,
            lead_limit,
        } => {
            let scheduled = sc
                .run_refill_now(RunRefillNowInput {
                    message,
                    priority: priority.into(),
                    lead_limit,
                })
                .await?;
            println!("{{\"scheduled\":{scheduled}}}");
        }
        Command::Stats => {
            let stats = sc.stats().await?;
            println!("{stats:#?}");
        }
        Command::List { state, limit } => {
            let jobs = sc.list_by_state(state.into(), limit).await?;
            for job in jobs {
                println!("{} {} {:?} attempts={}", job.id, job.job_type, job.status, job.attempts);
            }
        }
        Command::Get { job_id } => match sc.get_job(job_id).await? {
            Some(job) => println!("{job:#?}"),
            None => println!("no such job: {job_id}"),
        },
        Command::Cancel { job_id } => {
            let cancelled = sc.cancel(job_id).await?;
            println!("cancelled={cancelled}");
        }
        Command::Retry { job_id } => {
            let retried = sc.retry(job_id).await?;
            println!("retried={retried}");
        }
        Command::Clean => {
            let removed = sc.clean(&config).await?;
            println!("removed={removed}");
        }
        Command::Pause => {
            sc.pause().await?;
            println!("paused");
        }
        Command::Resume => {
            sc.resume().await?;
            println!("resumed");
        }
    }

    Ok(())
}
