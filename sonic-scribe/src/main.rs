//! sonic-scribe - audio/MIDI to score transcription
//!
//! `serve` hosts transcription sessions over HTTP (upload page, SSE, views,
//! downloads). `convert` runs one session headlessly on a local file.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};

use sonic_common::config::{load_config, TomlConfig};
use sonic_common::events::SessionPhase;
use sonic_scribe::intake::UploadedFile;
use sonic_scribe::model::PitchTrackerEngine;
use sonic_scribe::presenter::{export_midi, export_musicxml};
use sonic_scribe::session::SessionController;
use sonic_scribe::AppState;

/// Command-line arguments for sonic-scribe
#[derive(Parser, Debug)]
#[command(name = "sonic-scribe")]
#[command(about = "Transcribe audio and MIDI files into scores")]
#[command(version)]
struct Args {
    /// Config file (overrides SONIC_CONFIG and the default locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, env = "SONIC_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long, env = "SONIC_PORT")]
        port: Option<u16>,
    },

    /// Transcribe one file and write the results
    Convert {
        /// Audio or MIDI file
        input: PathBuf,

        /// MusicXML output path (default: INPUT with .xml extension)
        #[arg(long)]
        musicxml: Option<PathBuf>,

        /// MIDI output path
        #[arg(long)]
        midi: Option<PathBuf>,

        /// NoteSequence JSON output path
        #[arg(long)]
        json: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load before tracing so the configured level can apply
    let config = load_config(args.config.as_deref());

    let level = args
        .log_level
        .clone()
        .or_else(|| config.as_ref().ok().map(|c| c.logging.level.clone()))
        .unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&level)),
        )
        .init();

    info!("Starting sonic-scribe {}", sonic_scribe::build_info());

    let config = config.context("Failed to load configuration")?;

    match args.command {
        Command::Serve { host, port } => serve(config, host, port).await,
        Command::Convert {
            input,
            musicxml,
            midi,
            json,
        } => convert(config, &input, musicxml, midi, json).await,
    }
}

async fn serve(mut config: TomlConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    let config_idle = config.server.session_idle_seconds;
    let engine = Arc::new(PitchTrackerEngine::new(config.model.clone()));
    let state = AppState::new(config, engine);
    let sessions = state.sessions.clone();
    let idle_sweep = match config_idle {
        0 => None,
        secs => Some(sessions.spawn_idle_sweep(Duration::from_secs(secs))),
    };
    let app = sonic_scribe::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(sweep) = idle_sweep {
        sweep.abort();
    }
    sessions.close_all().await;
    info!("Server shutdown complete");
    Ok(())
}

async fn convert(
    config: TomlConfig,
    input: &Path,
    musicxml: Option<PathBuf>,
    midi: Option<PathBuf>,
    json: Option<PathBuf>,
) -> Result<()> {
    let musicxml = match (&musicxml, &midi, &json) {
        (None, None, None) => Some(input.with_extension("xml")),
        _ => musicxml,
    };

    let extension_rule = config.intake.extension_rule;
    let engine = Arc::new(PitchTrackerEngine::new(config.model.clone()));
    let state = AppState::new(config, engine);

    let session = SessionController::new(state.producers.clone(), extension_rule, state.event_bus.clone());
    session
        .mount()
        .await
        .await
        .context("Session initialization task failed")?;
    if !state.loader.is_ready() {
        bail!("Transcription model failed to initialize");
    }

    session.select_file(UploadedFile::from_path(input)).await;
    let phase = session.wait_until_settled().await;
    let snapshot = session.snapshot().await;

    if phase == SessionPhase::Error {
        if let Some(failure) = snapshot.last_error {
            error!(kind = %failure.kind, "{}", failure.message);
            bail!("{}: {}", failure.kind, failure.message);
        }
        bail!("Transcription failed");
    }

    let seq = session.note_sequence().await;
    info!(
        file = %input.display(),
        notes = snapshot.note_count.unwrap_or(0),
        producer = ?snapshot.producer,
        "Conversion complete"
    );

    if let Some(path) = musicxml {
        if let Some(download) = export_musicxml(seq.as_deref()) {
            download
                .save(&path)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote MusicXML to {}", path.display());
        }
    }
    if let Some(path) = midi {
        if let Some(download) = export_midi(seq.as_deref()).context("MIDI encoding failed")? {
            download
                .save(&path)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote MIDI to {}", path.display());
        }
    }
    if let Some(path) = json {
        if let Some(seq) = seq.as_deref() {
            let content = serde_json::to_string_pretty(seq).context("Failed to serialize notes")?;
            tokio::fs::write(&path, content)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!("Wrote note sequence to {}", path.display());
        }
    }

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
