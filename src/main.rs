use std::path::PathBuf;

use clap::{Parser, Subcommand};
use iskobot_rag::Result;
use iskobot_rag::commands::{DomainArg, run_query, run_refresh, run_upsert, show_config};

#[derive(Parser)]
#[command(name = "iskobot-rag")]
#[command(about = "Retrieval engine for the IskoBot scholarship and university advisor")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query a domain and print the top matching documents
    Query {
        /// Which record table to search
        #[arg(value_enum)]
        domain: DomainArg,
        /// The question to answer
        question: String,
        /// Optional path to a student profile JSON file for query enhancement
        #[arg(long)]
        profile: Option<PathBuf>,
    },
    /// Rebuild a domain's index from the latest records
    Refresh {
        #[arg(value_enum)]
        domain: DomainArg,
    },
    /// Insert or update a record from a JSON file
    Upsert {
        #[arg(value_enum)]
        domain: DomainArg,
        /// Path to the record JSON file
        #[arg(long)]
        file: PathBuf,
    },
    /// Show the active configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Query {
            domain,
            question,
            profile,
        } => run_query(domain, &question, profile.as_deref()).await?,
        Commands::Refresh { domain } => run_refresh(domain).await?,
        Commands::Upsert { domain, file } => run_upsert(domain, &file).await?,
        Commands::Config => show_config()?,
    }

    Ok(())
}
