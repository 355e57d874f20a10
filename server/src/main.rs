// Quillpad Server - Main Entry Point
//
// Bootstrap only: environment loading, logging, CLI dispatch. Handlers,
// rooms and the OT engine live in the library modules.

pub use quillpad_server::*;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::{Error as DotenvError, dotenv, from_filename};
use quillpad_core::config::AppConfig;
use std::{
    path::{Path, PathBuf},
    sync::OnceLock,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_appender::non_blocking;
use tracing_subscriber::EnvFilter;

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

static TRACING_GUARD: OnceLock<non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(author, version, about = "Quillpad collaborative editing server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the server
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_status = load_env_file();
    let config = AppConfig::load()?;
    init_tracing(&config);
    report_env_status(&env_status);

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => run_serve(config).await,
    }
}

async fn run_serve(config: AppConfig) -> anyhow::Result<()> {
    info!(
        bind_address = %config.bind_address,
        node_env = ?config.node_env,
        client_url = config.client_url.as_deref().unwrap_or("<mirror>"),
        store_uri = config.store_uri.as_deref().unwrap_or("<memory>"),
        bus_host = config.bus.host.as_deref().unwrap_or("<in-process>"),
        "starting server"
    );

    let bind_address = config.bind_address;
    let state = build_state(config);
    info!(server_id = %state.server_id, "server identity assigned");

    let app = router::build_router(state);

    let listener = TcpListener::bind(bind_address)
        .await
        .context("failed to bind socket")?;
    let actual_addr = listener
        .local_addr()
        .context("failed to read local address")?;

    info!("listening on {actual_addr}");

    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!(?err, "server terminated with error");
    }

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let default_level = if config.node_env.is_development() {
        "debug"
    } else {
        "info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // Logs go to stdout unless a log directory is configured, in which case
    // a non-blocking daily-rolling JSON file takes over.
    let log_dir = std::env::var("QUILLPAD_LOG_DIR").ok().filter(|d| !d.trim().is_empty());

    match log_dir {
        Some(dir) => {
            if let Err(err) = std::fs::create_dir_all(&dir) {
                eprintln!("failed to create log dir '{dir}': {err}");
                std::process::exit(1);
            }
            let file_appender = tracing_appender::rolling::daily(&dir, "server.log");
            let (writer, guard) = non_blocking(file_appender);
            if tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_ansi(false)
                .json()
                .with_writer(writer)
                .try_init()
                .is_ok()
            {
                let _ = TRACING_GUARD.set(guard);
            }
        }
        None => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .try_init();
        }
    }
}

enum EnvLoadStatus {
    Loaded(PathBuf),
    NotFound,
    Failed(DotenvError),
}

fn load_env_file() -> EnvLoadStatus {
    if let Ok(env_file) = std::env::var("QUILLPAD_ENV_FILE") {
        let trimmed = env_file.trim();
        if !trimmed.is_empty() {
            let path = PathBuf::from(trimmed);
            return match from_filename(&path) {
                Ok(_) => {
                    let display_path = make_relative(&path).unwrap_or_else(|| path.clone());
                    EnvLoadStatus::Loaded(display_path)
                }
                Err(err) => EnvLoadStatus::Failed(err),
            };
        }
    }

    match dotenv() {
        Ok(path) => {
            let display_path = make_relative(&path).unwrap_or_else(|| path.clone());
            EnvLoadStatus::Loaded(display_path)
        }
        Err(DotenvError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            EnvLoadStatus::NotFound
        }
        Err(err) => EnvLoadStatus::Failed(err),
    }
}

fn report_env_status(status: &EnvLoadStatus) {
    match status {
        EnvLoadStatus::Loaded(path) => {
            info!("Loaded environment variables from {}", path.display());
        }
        EnvLoadStatus::NotFound => {
            info!("No .env file found; using process environment only");
        }
        EnvLoadStatus::Failed(err) => {
            warn!("Failed to load .env file: {err:?}");
        }
    }
}

fn make_relative(path: &Path) -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    path.strip_prefix(&cwd).map(|p| p.to_path_buf()).ok()
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut int = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

        tokio::select! {
            _ = term.recv() => {},
            _ = int.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
