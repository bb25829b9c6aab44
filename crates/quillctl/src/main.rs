//! Quill command-line client

mod handler;
mod render;
mod shell;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use quillapi::{ApiClient, ClientStorage};
use quillcache::{CacheConfig, QueryCache};
use tokio::io::BufReader;
use tracing::{error, info};

use crate::handler::{Command, CommandHandler};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Backend base URL
    #[arg(long, env = "QUILL_API_BASE_URL")]
    api_url: String,

    /// Data directory holding storage.json
    #[arg(short, long, default_value = "./data", env = "QUILL_DATA_DIR")]
    data: PathBuf,

    /// Cache capacity (number of projections)
    #[arg(short, long, default_value_t = 256)]
    capacity: usize,

    /// Seconds before a cached projection is refetched
    #[arg(long, default_value_t = 30)]
    stale_secs: u64,

    /// Extra attempts for a failed read
    #[arg(long, default_value_t = 1)]
    retry: u32,

    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    fn cache_config(&self) -> Result<CacheConfig> {
        if self.capacity == 0 {
            bail!("--capacity must be greater than 0");
        }
        Ok(CacheConfig {
            capacity: self.capacity,
            stale_time: Duration::from_secs(self.stale_secs),
            retry: self.retry,
        })
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing; stdout carries command output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        eprintln!("{}", report(&e));
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    if !args.api_url.starts_with("http://") && !args.api_url.starts_with("https://") {
        bail!("API base URL must start with http:// or https://, got {}", args.api_url);
    }

    let storage = ClientStorage::open(&args.data)
        .with_context(|| format!("opening client storage in {}", args.data.display()))?;
    let client = ApiClient::with_timeout(
        args.api_url.as_str(),
        Arc::new(storage),
        Duration::from_secs(args.timeout_secs),
    )?;
    let cache = QueryCache::new(args.cache_config()?);

    info!("quillctl v{} against {}", env!("CARGO_PKG_VERSION"), client.base_url());
    let handler = CommandHandler::new(Arc::new(client), cache);

    match args.command {
        Command::Shell => {
            let stdin = BufReader::new(tokio::io::stdin());
            shell::run(&handler, stdin, tokio::io::stdout()).await
        }
        command => {
            println!("{}", handler.handle(command).await?);
            Ok(())
        }
    }
}

/// User-facing rendering of a failed command
pub(crate) fn report(err: &anyhow::Error) -> String {
    match err.downcast_ref::<quillapi::Error>() {
        Some(quillapi::Error::Unauthorized) => {
            format!("error: {:#}\nhint: run `quillctl login <email>` first", err)
        }
        _ => format!("error: {:#}", err),
    }
}
