use clap::{Parser, Subcommand};
use std::sync::Arc;
use textbook_rag::Result;
use textbook_rag::commands::{ingest, serve, show_config};
use textbook_rag::config::{self, Config};

#[derive(Parser)]
#[command(name = "textbook-rag")]
#[command(about = "Question answering over a markdown textbook with retrieval-augmented generation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the vector collection from the markdown documents
    Ingest,
    /// Start the chat HTTP service
    Serve,
    /// Show the effective configuration with secrets masked
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let lookup = |name: &str| std::env::var(name).ok();
    let config_path = config::config_file_path(lookup)?;
    let config = Config::from_sources(config_path.as_deref(), lookup)?;

    match cli.command {
        Commands::Config => {
            show_config(&config, config_path.as_deref());
        }
        Commands::Ingest => {
            config.validate()?;
            ingest(Arc::new(config)).await?;
        }
        Commands::Serve => {
            config.validate()?;
            serve(Arc::new(config)).await?;
        }
    }

    Ok(())
}
