//! Code-Master server binary.
//!
//! Accepts TCP connections, assigns each one a player id, and feeds all
//! of them into a single coordinator task.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use codemaster_core::config::{default_alphabet, GameConfig};
use codemaster_server::connection;
use codemaster_server::coordinator::GameCoordinator;
use codemaster_server::recorder::{JsonFileRecorder, MatchRecorder};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "codemaster-server")]
#[command(about = "Authoritative server for the Code-Master code-guessing game")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Bind address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Bind port
    #[arg(long, default_value = "8888")]
    port: u16,

    /// Lobby admit lower bound
    #[arg(long, default_value = "2")]
    min_players: usize,

    /// Lobby admit upper bound
    #[arg(long, default_value = "4")]
    max_players: usize,

    /// Positions in the secret code
    #[arg(long, default_value = "4")]
    code_length: usize,

    /// Per-player attempt budget
    #[arg(long, default_value = "10")]
    allowed_attempts: u32,

    /// Symbols secret codes are drawn from (default: A-Z plus 0-9)
    #[arg(long)]
    alphabet: Option<String>,

    /// Directory match records are written to
    #[arg(long, default_value = "game_results")]
    records_dir: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Run the game server (the default)
    Run,

    /// Print recent match records
    History {
        /// How many records to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = GameConfig {
        code_length: cli.code_length,
        allowed_attempts: cli.allowed_attempts,
        min_players: cli.min_players,
        max_players: cli.max_players,
        alphabet: cli
            .alphabet
            .map(|s| s.to_uppercase().chars().collect())
            .unwrap_or_else(default_alphabet),
    };
    config.validate().context("invalid configuration")?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_server(&cli.host, cli.port, config, cli.records_dir).await,
        Command::History { limit } => show_history(cli.records_dir, limit),
    }
}

async fn run_server(
    host: &str,
    port: u16,
    config: GameConfig,
    records_dir: PathBuf,
) -> anyhow::Result<()> {
    let recorder = JsonFileRecorder::new(&records_dir)
        .with_context(|| format!("opening records directory {}", records_dir.display()))?;

    let (events_tx, events_rx) = mpsc::channel(256);
    let coordinator = GameCoordinator::new(config, Box::new(recorder));
    tokio::spawn(coordinator.run(events_rx));

    let listener = TcpListener::bind((host, port))
        .await
        .with_context(|| format!("binding {host}:{port}"))?;
    info!("listening on {}:{}", host, port);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        let id = Uuid::new_v4();
                        debug!("accepted {} as player {}", addr, id);
                        connection::spawn(stream, id, events_tx.clone()).await;
                    }
                    Err(e) => {
                        error!("accept failed: {}", e);
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }
    Ok(())
}

fn show_history(records_dir: PathBuf, limit: usize) -> anyhow::Result<()> {
    let recorder = JsonFileRecorder::new(&records_dir)
        .with_context(|| format!("opening records directory {}", records_dir.display()))?;
    let records = recorder.recent(limit)?;

    if records.is_empty() {
        println!("no recorded matches");
        return Ok(());
    }

    for record in records {
        let winner = record
            .winner
            .map(|id| id.to_string())
            .unwrap_or_else(|| "None".into());
        println!(
            "{}  {} .. {}  code: {}  winner: {}",
            record.game_id,
            record.start_time.to_rfc3339(),
            record.end_time.to_rfc3339(),
            record.secret_code,
            winner,
        );
        for player in record.players {
            println!("    {}  attempts: {}", player.id, player.attempts);
        }
    }
    Ok(())
}
