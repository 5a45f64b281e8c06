use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod catalog;
mod commands;

#[derive(Parser)]
#[command(name = "cadence", version, about = "Cadence daily request scheduler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build today's plan from the catalog
    Generate {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show readiness of every planned task
    Status {
        /// Print statuses as JSON
        #[arg(long)]
        json: bool,
    },
    /// Re-evaluate the plan on every tick and report state changes
    Watch {
        /// Stop after this many ticks
        #[arg(long)]
        ticks: Option<u64>,
    },
    /// Mark one item of a planned task as done
    Complete {
        /// Account ID
        account: String,
        /// Item index within the account's task
        item: usize,
        /// Batch index
        #[arg(long, default_value = "0")]
        batch: usize,
    },
    /// List groups completed today
    Ledger {
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Generate { json } => commands::plan::generate(json),
        Commands::Status { json } => commands::plan::status(json),
        Commands::Watch { ticks } => commands::watch::run(ticks),
        Commands::Complete {
            account,
            item,
            batch,
        } => commands::complete::run(&account, item, batch),
        Commands::Ledger { json } => commands::complete::ledger(json),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
