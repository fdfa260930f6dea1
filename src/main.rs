use std::io;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rowsearch::commands::{build_index, configure, open_engine, run_chat, run_query};
use rowsearch::config::Config;

#[derive(Parser)]
#[command(name = "rowsearch")]
#[command(about = "Semantic search over tabular records using vector embeddings")]
#[command(version)]
struct Cli {
    /// Configuration directory (defaults to ~/.rowsearch)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write, show and check the configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
        /// Check that the embedding provider is reachable
        #[arg(long)]
        check: bool,
    },
    /// Embed every row of the data file and publish the index
    Build {
        /// Delimited data file with a header row
        #[arg(long)]
        data: Option<PathBuf>,
        /// Where to write the index
        #[arg(long)]
        index: Option<PathBuf>,
        /// Texts per embedding request (at most the configured batch size)
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Run a single query against the index
    Query {
        /// Free-text query
        text: String,
        /// Number of results
        #[arg(short, long)]
        k: Option<usize>,
        /// Index file to query
        #[arg(long)]
        index: Option<PathBuf>,
    },
    /// Interactive query loop
    Chat {
        /// Number of results per query
        #[arg(short, long)]
        k: Option<usize>,
        /// Index file to query
        #[arg(long)]
        index: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => Config::config_dir()?,
    };
    let config = Config::load(&config_dir)?;

    match cli.command {
        Commands::Config { show, check } => {
            configure(&config, show, check)?;
        }
        Commands::Build {
            data,
            index,
            batch_size,
        } => {
            build_index(&config, data.as_deref(), index.as_deref(), batch_size)?;
        }
        Commands::Query { text, k, index } => {
            let engine = open_engine(&config, index.as_deref())?;
            let k = k.unwrap_or(config.index.default_k);
            run_query(&engine, &text, k, &mut io::stdout().lock())?;
        }
        Commands::Chat { k, index } => {
            let engine = open_engine(&config, index.as_deref())?;
            let k = k.unwrap_or(config.index.default_k);
            run_chat(&engine, k, io::stdin().lock(), &mut io::stdout().lock())?;
        }
    }

    Ok(())
}
