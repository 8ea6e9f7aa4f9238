use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

/// Log filter override, e.g. `CASETRAIL_LOG=casetrail_core=debug`.
const LOG_ENV: &str = "CASETRAIL_LOG";

#[derive(Parser)]
#[command(name = "casetrail-cli", version, about = "Casetrail training CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score calculations
    Score {
        #[command(subcommand)]
        action: commands::score::ScoreAction,
    },
    /// Timed challenge simulation
    Challenge {
        #[command(subcommand)]
        action: commands::challenge::ChallengeAction,
    },
    /// Module catalog queries
    Catalog {
        #[command(subcommand)]
        action: commands::catalog::CatalogAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Score { action } => commands::score::run(action),
        Commands::Challenge { action } => commands::challenge::run(action),
        Commands::Catalog { action } => commands::catalog::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
