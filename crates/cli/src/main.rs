// crates/cli/src/main.rs
//! Operator CLI for the forgeview job engine.
//!
//! Talks to a running engine bridge: submit a job and watch it to a
//! terminal state, check or cancel an existing one. Lifecycle events flow
//! from the manager's callbacks over a channel and print as they arrive.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::debug;

use forgeview_bridge::BridgeConfig;
use forgeview_jobs::{JobCallbacks, JobManager, PollConfig};
use forgeview_types::{Job, JobStatus};

#[derive(Parser)]
#[command(name = "forgeview", about = "Drive engine bridge jobs from the terminal")]
struct Cli {
    /// Bridge base URL. Falls back to FORGEVIEW_BRIDGE_URL, then the local default.
    #[arg(long)]
    bridge_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Submit a job and watch it to a terminal state.
    Start {
        /// Operation kind, e.g. "screenshot" or "batch_screenshot".
        job_type: String,
        /// Submission parameters as inline JSON.
        #[arg(long, default_value = "{}")]
        params: String,
        /// Tag the job with a panel session id.
        #[arg(long)]
        session: Option<String>,
        /// Return right after submission instead of watching.
        #[arg(long)]
        no_watch: bool,
    },
    /// One-shot status check for a job id.
    Status { job_id: String },
    /// Attach a polling loop to an existing job id and watch it.
    Watch { job_id: String },
    /// Cancel a job.
    Cancel { job_id: String },
}

/// What the watch loop consumes; produced by the manager callbacks.
enum JobEvent {
    Updated(Job),
    Finished(Job),
    GaveUp(String),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut bridge = BridgeConfig::default();
    if let Some(url) = cli.bridge_url {
        bridge.base_url = url;
    }
    debug!(base_url = %bridge.base_url, "connecting to bridge");

    let manager =
        JobManager::new(&bridge, PollConfig::default()).context("building bridge client")?;

    match cli.command {
        Command::Start {
            job_type,
            params,
            session,
            no_watch,
        } => {
            let params: serde_json::Value =
                serde_json::from_str(&params).context("--params must be valid JSON")?;

            let events = install_event_hooks(&manager);
            let Some(job) = manager
                .start_job_in_session(&job_type, params, session.as_deref())
                .await
            else {
                bail!("job submission failed");
            };
            println!("submitted {} ({})", job.job_id, job.job_type);

            if !no_watch {
                watch(events).await?;
            }
        }
        Command::Status { job_id } => match manager.get_job_status(&job_id).await {
            Some(job) => print_job(&job),
            None => bail!("no status available for {job_id}"),
        },
        Command::Watch { job_id } => {
            let events = install_event_hooks(&manager);
            manager.watch_job(&job_id);
            watch(events).await?;
        }
        Command::Cancel { job_id } => {
            if manager.cancel_job(&job_id).await {
                println!("cancelled {job_id}");
            } else {
                println!("bridge declined to cancel {job_id}; local tracking stopped");
            }
        }
    }

    Ok(())
}

/// Wire the manager's callbacks to a channel the watch loop can drain.
fn install_event_hooks(manager: &JobManager) -> mpsc::UnboundedReceiver<JobEvent> {
    let (tx, rx) = mpsc::unbounded_channel();

    let updated = tx.clone();
    let completed = tx.clone();
    let failed = tx.clone();
    manager.set_callbacks(JobCallbacks {
        on_job_updated: Some(Arc::new(move |job| {
            let _ = updated.send(JobEvent::Updated(job.clone()));
        })),
        on_job_completed: Some(Arc::new(move |job| {
            let _ = completed.send(JobEvent::Finished(job.clone()));
        })),
        on_job_failed: Some(Arc::new(move |job| {
            let _ = failed.send(JobEvent::Finished(job.clone()));
        })),
        on_error: Some(Arc::new(move |message| {
            let _ = tx.send(JobEvent::GaveUp(message.to_string()));
        })),
        ..JobCallbacks::default()
    });

    rx
}

async fn watch(mut events: mpsc::UnboundedReceiver<JobEvent>) -> Result<()> {
    while let Some(event) = events.recv().await {
        match event {
            JobEvent::Updated(job) => match job.progress {
                Some(progress) => println!("  {} {progress}%", job.status),
                None => println!("  {}", job.status),
            },
            JobEvent::Finished(job) => {
                print_job(&job);
                if job.status != JobStatus::Completed {
                    bail!("job {} ended as {}", job.job_id, job.status);
                }
                return Ok(());
            }
            JobEvent::GaveUp(message) => bail!("{message}"),
        }
    }
    bail!("event channel closed before the job finished")
}

fn print_job(job: &Job) {
    println!("{} ({}) — {}", job.job_id, job.job_type, job.status);
    if let Some(progress) = job.progress {
        println!("  progress: {progress}%");
    }
    if let Some(error) = &job.error {
        println!("  error: {error}");
    }
    if let Some(result) = &job.result {
        if let Some(filename) = &result.filename {
            println!("  file: {filename}");
        }
        if let Some(size) = result.file_size {
            println!("  size: {size} bytes");
        }
        if let Some(url) = job.download_url() {
            println!("  download: {url}");
        }
    }
}
