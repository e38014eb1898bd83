use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod progress;

use commands::{OutputFormat, SourceArgs};

#[derive(Parser, Debug)]
#[command(name = "prism-tap")]
#[command(about = "Read documents from Elasticsearch as tuples")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print one tuple per matching document
    Read {
        #[command(flatten)]
        source: SourceArgs,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Stop after this many tuples
        #[arg(long)]
        limit: Option<usize>,

        /// Print the column names before the first tuple (text format)
        #[arg(long)]
        header: bool,

        /// Disable the progress bar on stderr
        #[arg(long)]
        no_progress: bool,
    },

    /// Print the resolved tuple columns
    Columns {
        #[command(flatten)]
        source: SourceArgs,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Read {
            source,
            format,
            limit,
            header,
            no_progress,
        } => {
            let options = commands::ReadOptions {
                format,
                limit,
                header,
                no_progress,
            };
            commands::run_read(source, options).await?;
        }
        Commands::Columns { source, format } => {
            commands::run_columns(source, format).await?;
        }
    }

    Ok(())
}
