//! Subgen - Sidecar Subtitle Generation
//!
//! Command-line entry point: loads configuration, installs logging and runs
//! the subtitle pipeline for one file or for the monitored libraries.

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use subgen::catalog::{LibraryScanner, MediaItem};
use subgen::cli::{Args, Commands};
use subgen::config::Config;
use subgen::error::SubgenError;
use subgen::media::FfmpegExtractor;
use subgen::pipeline::SubtitlePipeline;
use subgen::transcribe::{openai::OpenAiWhisperProvider, whisper_cpp::WhisperCppProvider};

const EXIT_CANCELLED: i32 = 130;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The guard flushes the file writer; it must outlive the run
    let log_guard = setup_logging(args.verbose)?;

    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new("subgen.toml").exists() {
                info!("Found subgen.toml in current directory, loading...");
                Config::from_file("subgen.toml")?
            } else {
                Config::default()
            }
        }
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling");
                cancel.cancel();
            }
        });
    }

    let result = match args.command {
        Commands::Generate { input, item_id, language, provider, json } => {
            if let Some(provider) = provider {
                config.provider.selected = provider;
            }
            let item = match item_id {
                Some(id) => MediaItem::new(id, input),
                None => MediaItem::from_path(input),
            };

            let pipeline = SubtitlePipeline::new(config)?;
            info!("Using {} provider", pipeline.provider_name());
            pipeline
                .run(&item, language.as_deref(), &cancel.child_token())
                .await
                .and_then(|outcome| {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&outcome)?);
                    } else {
                        println!("{:?}", outcome);
                    }
                    Ok(())
                })
        }
        Commands::Batch { library, language, provider, force, json } => {
            if !config.pipeline.auto_generate && !force {
                warn!("Automatic generation is disabled in the configuration; use --force to run anyway");
                return Ok(());
            }
            if let Some(provider) = provider {
                config.provider.selected = provider;
            }

            let libraries: Vec<_> = match &library {
                Some(id) => config
                    .pipeline
                    .libraries
                    .iter()
                    .filter(|lib| &lib.id == id)
                    .cloned()
                    .collect(),
                None => config.pipeline.monitored().into_iter().cloned().collect(),
            };
            if libraries.is_empty() {
                return Err(SubgenError::Config("No matching libraries configured".to_string()).into());
            }

            let items: Vec<MediaItem> = libraries
                .into_iter()
                .flat_map(|lib| LibraryScanner::new(lib).items().collect::<Vec<_>>())
                .collect();
            info!("Found {} media files to process", items.len());

            let progress = ProgressBar::new(items.len() as u64);
            progress.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                    .progress_chars("#>-"),
            );

            let pipeline = Arc::new(SubtitlePipeline::new(config)?);
            let report = pipeline
                .run_batch(items, language, cancel.clone(), progress.clone())
                .await;
            progress.finish_and_clear();

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Generated: {}  Skipped: {}  Already running: {}  Failed: {}  Cancelled: {}",
                    report.generated,
                    report.skipped,
                    report.already_running,
                    report.failed,
                    report.cancelled
                );
                for failure in &report.failures {
                    println!("  {}: {}", failure.item_id, failure.error);
                }
            }

            if cancel.is_cancelled() {
                Err(SubgenError::Cancelled)
            } else {
                Ok(())
            }
        }
        Commands::Tools => {
            let ffmpeg = FfmpegExtractor::new(config.media.clone());
            let whisper_cpp = WhisperCppProvider::new(config.provider.whisper_cpp.clone());
            let openai = OpenAiWhisperProvider::new(config.provider.openai_whisper.clone());

            println!("{:<16} {}", "Tool", "Executable");
            println!("{}", "-".repeat(60));
            print_tool("ffmpeg", ffmpeg.locate().await);
            print_tool("whisper.cpp", whisper_cpp.locate().await);
            print_tool("openai-whisper", openai.locate().await);
            Ok(())
        }
        Commands::InitConfig { output } => {
            Config::default().save_to_file(&output)?;
            println!("Wrote default configuration to {}", output.display());
            Ok(())
        }
    };

    match result {
        Ok(()) => {
            info!("Subgen completed successfully");
            Ok(())
        }
        Err(e) if e.is_cancelled() => {
            warn!("Cancelled by request");
            drop(log_guard);
            std::process::exit(EXIT_CANCELLED);
        }
        Err(e) => Err(e.into()),
    }
}

fn print_tool(name: &str, located: subgen::error::Result<subgen::locator::ExecutableHandle>) {
    match located {
        Ok(handle) => println!("{:<16} {}", name, handle.program.display()),
        Err(_) => println!("{:<16} not found", name),
    }
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_dir = std::env::current_dir()?.join(".subgen").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "subgen.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
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

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("subgen.log").display()
    );

    Ok(guard)
}
