//! Triage Desk - file, triage and manage citizen complaints

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use complaint_triage::backend::OpenAiBackend;
use complaint_triage::{MemoryStore, TriageConfig, TriagePipeline};
use triage_desk::{
    config::{Args, Command},
    db::{MongoClient, MongoTriageStore},
    Backing, Desk,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Logs go to stderr; stdout carries the command's JSON
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("triage_desk={},complaint_triage={}", log_level, log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(78);
    }

    let config = load_config(&args)?;

    if let Command::ShowConfig = args.command {
        print!("{}", config.to_yaml()?);
        return Ok(());
    }

    info!(
        oracle = %args.oracle_base_url,
        model = %args.oracle_model,
        max_attempts = config.retry.max_attempts,
        claim_mode = ?config.assignment.claim_mode,
        "Starting triage desk"
    );

    let backend = OpenAiBackend::new(
        &args.oracle_base_url,
        &args.oracle_model,
        args.api_key(),
        config.oracle.timeout(),
    )?;

    let backing = connect_store(&args).await;
    let pipeline = Arc::new(TriagePipeline::new(
        backing.store(),
        Arc::new(backend),
        config,
    ));
    let desk = Desk::new(pipeline, backing);

    match desk.execute(&args.actor.identity(), args.command.clone()).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(e.exit_code());
        }
    }
}

/// Triage configuration from TRIAGE_CONFIG, or the built-in defaults.
fn load_config(args: &Args) -> anyhow::Result<TriageConfig> {
    let Some(path) = &args.triage_config else {
        return Ok(TriageConfig::default());
    };

    let yaml = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read triage config {}", path.display()))?;
    let config = TriageConfig::from_yaml(&yaml)
        .with_context(|| format!("Invalid triage config {}", path.display()))?;

    info!("Loaded triage config from {}", path.display());
    Ok(config)
}

/// Connect to MongoDB; dev mode falls back to an in-memory store.
async fn connect_store(args: &Args) -> Backing {
    let connected = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => MongoTriageStore::new(&client).await,
        Err(e) => Err(e),
    };

    match connected {
        Ok(store) => Backing::Mongo(Arc::new(store)),
        Err(e) => {
            if args.dev_mode {
                warn!("MongoDB unavailable (dev mode, continuing in memory): {}", e);
                Backing::Memory(Arc::new(MemoryStore::new()))
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(e.exit_code());
            }
        }
    }
}
