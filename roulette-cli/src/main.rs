mod commands;
mod config;

use clap::{Parser, Subcommand};
use commands::Session;
use roulette_core::RouletteError;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "roulette")]
#[command(about = "Operator console for the round-based roulette settlement engine")]
#[command(version)]
struct Cli {
    /// Data directory for the engine database and config
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Participant accounts
    #[command(subcommand)]
    Participant(commands::ParticipantCommands),

    /// House reserve management
    #[command(subcommand)]
    Pool(commands::PoolCommands),

    /// Round lifecycle and bets
    #[command(subcommand)]
    Round(commands::RoundCommands),

    /// Operator seed helpers
    #[command(subcommand)]
    Secret(commands::SecretCommands),

    /// Audit log inspection and replay
    #[command(subcommand)]
    Audit(commands::AuditCommands),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "roulette={},roulette_table={},roulette_core={}",
            log_level, log_level, log_level
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Get data directory
    let data_dir = cli.data_dir.unwrap_or_else(|| {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("roulette")
    });

    tokio::fs::create_dir_all(&data_dir).await?;

    let session = Session::open(&data_dir).await?;

    // Execute command
    let result = match cli.command {
        Commands::Participant(cmd) => commands::handle_participant_command(cmd, &session).await,
        Commands::Pool(cmd) => commands::handle_pool_command(cmd, &session).await,
        Commands::Round(cmd) => commands::handle_round_command(cmd, &session).await,
        Commands::Secret(cmd) => commands::handle_secret_command(cmd),
        Commands::Audit(cmd) => commands::handle_audit_command(cmd, &session).await,
    };

    // failed reveals still cancel and refund, so persist either way
    if let Err(e) = session.save().await {
        eprintln!("Error: failed to persist engine state: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = result {
        match e {
            RouletteError::RoundNotFound(id) => {
                eprintln!("Error: Round {} not found", id);
                eprintln!("Use 'roulette round list' to see rounds");
            }
            RouletteError::ParticipantNotFound(id) => {
                eprintln!("Error: Participant {} not found", id);
                eprintln!("Use 'roulette participant list' to see participants");
            }
            RouletteError::InsufficientFunds { need, available } => {
                eprintln!("Error: Insufficient funds");
                eprintln!("Need: {} units, Available: {} units", need, available);
            }
            RouletteError::Insolvency {
                requested,
                available,
            } => {
                eprintln!("Error: Bet rejected by admission control");
                eprintln!("Obligation: {} units, Room left: {} units", requested, available);
            }
            RouletteError::CommitMismatch(id) => {
                eprintln!("Error: Seed does not match the commitment for round {}", id);
                eprintln!("The round was cancelled, all bets refunded and flagged for audit review");
            }
            RouletteError::RevealTimeout(id) => {
                eprintln!("Error: Reveal deadline for round {} has passed", id);
                eprintln!("The round was cancelled and all bets refunded");
            }
            RouletteError::AuditMismatch(msg) => {
                eprintln!("Error: Audit verification FAILED: {}", msg);
            }
            _ => {
                eprintln!("Error: {}", e);
            }
        }
        std::process::exit(1);
    }

    Ok(())
}
