use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use podfeed::{validate_feed, FeedCache, FeedParser, ParserConfig};

#[derive(Parser, Debug)]
#[command(name = "podfeed", about = "Fetch and inspect podcast feeds", version)]
struct Args {
    /// Parser configuration file (TOML); defaults apply when absent
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Permit localhost and private-network feed URLs
    #[arg(long)]
    allow_private_hosts: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the normalized feed as JSON
    Parse {
        /// Feed URL
        url: String,
    },
    /// Print the validation report as JSON
    Validate {
        /// Feed URL
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ParserConfig::load(path)
            .with_context(|| format!("Failed to load config from '{}'", path.display()))?,
        None => ParserConfig::default(),
    };
    if args.allow_private_hosts {
        config.allow_private_hosts = true;
    }

    let cache = Arc::new(FeedCache::new(config.cache_max_age()));
    let parser = FeedParser::new(&config, cache).context("Failed to build HTTP client")?;

    let output = match &args.command {
        Command::Parse { url } => {
            let feed = parser.parse_feed(url).await?;
            serde_json::to_string_pretty(&feed)?
        }
        Command::Validate { url } => {
            let feed = parser.parse_feed(url).await?;
            serde_json::to_string_pretty(&validate_feed(&feed))?
        }
    };
    println!("{output}");

    Ok(())
}
