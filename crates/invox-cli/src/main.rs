//! CLI application for invoice extraction and review.

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use commands::{batch, config, process, records};

/// Invoice extraction - turn scanned invoices into reviewed records
#[derive(Parser)]
#[command(name = "invox")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a single invoice file
    Process(process::ProcessArgs),

    /// Ingest multiple invoice files
    Batch(batch::BatchArgs),

    /// List stored invoices
    List(records::ListArgs),

    /// Show one stored invoice
    Show(records::ShowArgs),

    /// Approve a pending invoice
    Approve(records::ReviewArgs),

    /// Reject a pending invoice
    Reject(records::ReviewArgs),

    /// Manage configuration
    Config(config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up logging based on verbosity; RUST_LOG wins when set
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Process(args) => process::run(args, config_path).await,
        Commands::Batch(args) => batch::run(args, config_path).await,
        Commands::List(args) => records::list(args, config_path),
        Commands::Show(args) => records::show(args, config_path),
        Commands::Approve(args) => records::approve(args, config_path),
        Commands::Reject(args) => records::reject(args, config_path),
        Commands::Config(args) => config::run(args, config_path),
    }
}
