mod config;
mod engine;
mod store;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use facegate_core::{CascadeDetector, Frame, Profile, Verifier};

use crate::config::Config;
use crate::engine::{spawn_engine, EngineHandle};

#[derive(Parser)]
#[command(name = "facegate", about = "Face enrollment and verification", version)]
struct Cli {
    /// Path to a TOML config file (overrides FACEGATE_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a new identity from an image
    Enroll {
        /// Identity handle (trimmed, case-sensitive)
        identity: String,
        /// Image containing exactly one face
        image: PathBuf,
        /// Full name stored with the identity
        #[arg(long)]
        name: Option<String>,
        /// Email stored with the identity
        #[arg(long)]
        email: Option<String>,
    },
    /// Verify the face in an image against enrolled identities
    Verify {
        image: PathBuf,
    },
    /// Remove an enrolled identity
    Remove {
        identity: String,
    },
    /// List enrolled identities
    List,
    /// Show recent authentication attempts, newest first
    History {
        /// Number of records (default from config)
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show enrollment and attempt totals
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    tracing::debug!(db = %config.db_path.display(), threshold = config.match_threshold, "configuration loaded");

    let (gallery, audit) = store::open(&config.db_path)
        .with_context(|| format!("failed to open database {}", config.db_path.display()))?;
    let detector = CascadeDetector::load(&config.detector_model_path())?;
    let verifier = Verifier::new(gallery, audit, detector).with_config(config.verifier_config());
    let (handle, thread) = spawn_engine(verifier)?;

    let result = run(&handle, cli.command, &config).await;

    // Let an in-flight (possibly cancelled) request finish before exiting.
    drop(handle);
    tokio::task::spawn_blocking(move || thread.join())
        .await?
        .map_err(|_| anyhow::anyhow!("engine thread panicked"))?;

    result
}

async fn run(handle: &EngineHandle, command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Enroll {
            identity,
            image,
            name,
            email,
        } => {
            let frame = load_frame(&image)?;
            let profile = Profile {
                full_name: name,
                email,
            };
            let enrolled = tokio::select! {
                res = handle.enroll(identity, profile, frame) => res?,
                _ = tokio::signal::ctrl_c() => anyhow::bail!("enrollment cancelled"),
            };
            print_json(&enrolled)
        }
        Commands::Verify { image } => {
            let frame = load_frame(&image)?;
            let decision = tokio::select! {
                res = handle.authenticate(frame) => res?,
                _ = tokio::signal::ctrl_c() => anyhow::bail!("verification cancelled"),
            };
            print_json(&decision)?;
            decision.ensure_accepted()?;
            Ok(())
        }
        Commands::Remove { identity } => {
            let removed = handle.remove(identity.clone()).await?;
            if !removed {
                anyhow::bail!("identity '{}' is not enrolled", identity.trim());
            }
            print_json(&serde_json::json!({ "removed": identity.trim() }))
        }
        Commands::List => print_json(&handle.identities().await?),
        Commands::History { limit } => {
            let limit = limit.unwrap_or(config.history_limit);
            print_json(&handle.history(limit).await?)
        }
        Commands::Stats => print_json(&handle.stats().await?),
    }
}

fn load_frame(path: &Path) -> Result<Frame> {
    Frame::open(path).with_context(|| format!("failed to load image {}", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
