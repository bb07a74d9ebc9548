//! Operator CLI: trigger compilations, inspect jobs, sweep stale rows.
//!
//! Exit codes: 0 dispatched (or success), 1 failed, 2 already compiled,
//! 3 no submissions, 4 a job for the week is still in progress.

use std::process::ExitCode;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};

use weave_models::{GroupId, JobId, MusicTrackId};
use weave_queue::JobQueue;
use weave_worker::{init_tracing, Services, TriggerOutcome, WorkerConfig};

const EXIT_FAILED: u8 = 1;
const EXIT_ALREADY_COMPILED: u8 = 2;
const EXIT_NO_SUBMISSIONS: u8 = 3;
const EXIT_IN_PROGRESS: u8 = 4;

#[derive(Parser)]
#[command(name = "weave", about = "Weekly group video compilations", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile one group's week
    Compile {
        #[arg(long)]
        group: i64,
        /// First day of the week (YYYY-MM-DD); defaults to the current week
        #[arg(long)]
        week_start: Option<NaiveDate>,
        #[arg(long)]
        music_track: Option<i64>,
    },
    /// Compile the current week for every active group
    Schedule,
    /// Show a job and its download link
    Status {
        #[arg(long)]
        job: i64,
    },
    /// Fail jobs stuck longer than WORKER_STALE_AFTER_SECS
    Sweep,
}

#[tokio::main]
async fn main() -> ExitCode {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(EXIT_FAILED)
        }
    }
}

async fn run(command: Command) -> anyhow::Result<u8> {
    let config = WorkerConfig::from_env()?;
    let services = Services::connect(config).await?;

    match command {
        Command::Compile {
            group,
            week_start,
            music_track,
        } => {
            let queue = Arc::new(JobQueue::from_env()?);
            queue.init().await?;
            let trigger = services
                .trigger(queue)
                .with_submission_precheck(Arc::clone(&services.submissions));

            let outcome = trigger
                .trigger_manual(GroupId(group), week_start, music_track.map(MusicTrackId), Utc::now())
                .await?;
            Ok(report(GroupId(group), &outcome))
        }
        Command::Schedule => {
            let queue = Arc::new(JobQueue::from_env()?);
            queue.init().await?;
            let report = services.trigger(queue).trigger_scheduled(Utc::now()).await?;

            println!("window {}", report.window);
            for (group_id, result) in &report.results {
                match result {
                    Ok(outcome) => println!("group {}: {}", group_id, outcome.as_str()),
                    Err(e) => println!("group {}: failed ({})", group_id, e),
                }
            }
            println!("{} dispatched, {} failed", report.dispatched(), report.failed());
            Ok(if report.failed() > 0 { EXIT_FAILED } else { 0 })
        }
        Command::Status { job } => {
            let view = services.status().status(JobId(job)).await?;
            println!("{}", serde_json::to_string_pretty(&view)?);
            Ok(0)
        }
        Command::Sweep => {
            let recovered = services.sweeper().sweep(Utc::now()).await?;
            println!("{} stale jobs failed", recovered);
            Ok(0)
        }
    }
}

fn report(group_id: GroupId, outcome: &TriggerOutcome) -> u8 {
    match outcome {
        TriggerOutcome::Dispatched { job_id, message_id } => {
            println!("dispatched job {} for group {} (message {})", job_id, group_id, message_id);
        }
        TriggerOutcome::AlreadyCompiled { job_id } => {
            println!("group {} already compiled (job {})", group_id, display_id(*job_id));
        }
        TriggerOutcome::InProgress { job_id, status } => {
            println!(
                "group {} already has a {} job (job {})",
                group_id,
                status,
                display_id(*job_id)
            );
        }
        TriggerOutcome::NoSubmissions => {
            println!("group {} has no submissions this week", group_id);
        }
    }
    exit_code(outcome)
}

fn exit_code(outcome: &TriggerOutcome) -> u8 {
    match outcome {
        TriggerOutcome::Dispatched { .. } => 0,
        TriggerOutcome::AlreadyCompiled { .. } => EXIT_ALREADY_COMPILED,
        TriggerOutcome::InProgress { .. } => EXIT_IN_PROGRESS,
        TriggerOutcome::NoSubmissions => EXIT_NO_SUBMISSIONS,
    }
}

fn display_id(id: Option<JobId>) -> String {
    id.map(|id| id.to_string()).unwrap_or_else(|| "unknown".to_string())
}
