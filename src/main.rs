//! shorts-cutter - turn long videos and stream VODs into short clips
//!
//! Entry point: loads configuration, installs logging and runs one command.

use anyhow::Result;
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{Level, info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use shorts_cutter::cli::{Args, Commands};
use shorts_cutter::config::Config;
use shorts_cutter::dispatch::{RedisQueue, Worker};
use shorts_cutter::error::CutterError;
use shorts_cutter::model::JobStatus;
use shorts_cutter::setup::SetupManager;
use shorts_cutter::store::{JsonStore, Store};
use shorts_cutter::workflow::Workflow;

const LOG_FILE: &str = "shorts-cutter.log";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new("config.toml").exists() {
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };
    config.apply_env();

    // Setup logging to both console and file
    setup_logging(&config.log_dir(), args.verbose)?;
    info!("Storage root: {}", config.storage.root.display());

    let store: Arc<dyn Store> = Arc::new(JsonStore::open(config.db_dir())?);

    match args.command {
        Commands::InitConfig { output } => {
            Config::default().save_to_file(&output)?;
            println!("Wrote default configuration to {}", output.display());
        }
        Commands::Setup => {
            let setup = SetupManager::new(&config)?;
            let downloader = setup.locate_downloader().await?;
            println!("Downloader: {:?}", downloader);

            let workflow = Workflow::new(&config, store)?;
            workflow.check_tools().await?;
            println!("ffmpeg/ffprobe: available");
        }
        Commands::Ingest { url, clip_length } => {
            let workflow = Workflow::new(&config, store.clone())?;
            workflow.check_tools().await?;

            let job = workflow.ingest_project(&url, clip_length).await?;
            println!("Job {} created for {}", job.id, job.source_url);

            if config.queue.redis_url.is_some() {
                println!("Queued on '{}'; run `shorts-cutter worker` to process it", config.queue.name);
            } else {
                workflow.wait().await;
                print_job(store.as_ref(), &job.id).await?;
            }
        }
        Commands::Worker => {
            let Some(redis_url) = config.queue.redis_url.clone() else {
                return Err(CutterError::Config(
                    "worker needs queue.redis_url (or REDIS_URL) to be set".to_string(),
                )
                .into());
            };
            let workflow = Workflow::new(&config, store)?;
            workflow.check_tools().await?;

            let queue = RedisQueue::open(&redis_url, &config.queue.name)?;
            Worker::new(queue, workflow.pipeline()).run().await?;
        }
        Commands::Status { job_id } => {
            print_job(store.as_ref(), &job_id).await?;
        }
        Commands::Clips { job_id } => {
            let clips = store.list_clips(&job_id).await?;
            if clips.is_empty() {
                println!("No clips for job {}", job_id);
            } else {
                println!("{:<4} {:<10} {:<10} {:<10} {:<60}", "#", "Start", "Length", "Status", "Title");
                println!("{}", "-".repeat(96));
                for clip in clips {
                    println!(
                        "{:<4} {:<10} {:<10} {:<10} {:<60}",
                        clip.index + 1,
                        format_seconds(clip.start_sec),
                        format_seconds(clip.duration_sec),
                        format!("{:?}", clip.status).to_lowercase(),
                        clip.title
                    );
                    println!("     {}", clip.file_path.display());
                }
            }
        }
    }

    Ok(())
}

async fn print_job(store: &dyn Store, job_id: &str) -> Result<()> {
    let job = store.get_job(job_id).await?;
    println!("Job:     {}", job.id);
    println!("Source:  {}", job.source_url);
    println!("Status:  {}", job.status);
    if let Some(error) = &job.error {
        println!("Error:   {}", error);
    }
    if job.status == JobStatus::Done {
        let clips = store.list_clips(job_id).await?;
        println!("Clips:   {}", clips.len());
    }
    if job.status == JobStatus::Processing {
        warn!("Job {} is still processing", job.id);
    }
    Ok(())
}

/// Setup logging to both console and file
fn setup_logging(log_dir: &Path, verbose: bool) -> Result<()> {
    std::fs::create_dir_all(log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(log_dir, LOG_FILE);
    let (non_blocking_file, _guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(_guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}", log_level, log_dir.join(LOG_FILE).display());

    Ok(())
}

/// Format seconds as `m:ss.s`
fn format_seconds(seconds: f64) -> String {
    let minutes = (seconds / 60.0).floor();
    format!("{}:{:04.1}", minutes as u64, seconds - minutes * 60.0)
}
