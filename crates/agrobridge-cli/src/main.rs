mod browse;
mod db;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "agrobridge-cli")]
#[command(about = "AgroBridge marketplace command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance.
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Page through a category the way the buyer feed does and print it.
    Browse {
        category: String,
        /// Buyer longitude; defaults to AGROBRIDGE_FALLBACK_LNG.
        #[arg(long, allow_hyphen_values = true, requires = "lat")]
        lng: Option<f64>,
        /// Buyer latitude; defaults to AGROBRIDGE_FALLBACK_LAT.
        #[arg(long, allow_hyphen_values = true, requires = "lng")]
        lat: Option<f64>,
        /// Marketplace API base URL; defaults to AGROBRIDGE_API_URL.
        #[arg(long)]
        api_url: Option<String>,
        /// Keep records without an identity under a synthetic one.
        #[arg(long)]
        synthesize_ids: bool,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    Ping,
    Migrate,
    /// Upsert the listings from a catalog YAML file.
    Seed {
        /// Defaults to AGROBRIDGE_CATALOG_PATH.
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
}

/// `RUST_LOG` when it parses, otherwise the configured level.
fn log_filter(rust_log: Option<&str>, configured: &str) -> anyhow::Result<EnvFilter> {
    match rust_log.map(EnvFilter::try_new) {
        Some(Ok(filter)) => Ok(filter),
        _ => Ok(EnvFilter::try_new(configured)?),
    }
}

/// Installs the global subscriber once the command's config is loaded.
pub(crate) fn init_tracing(configured_level: &str) -> anyhow::Result<()> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let env_filter = log_filter(rust_log.as_deref(), configured_level)?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Db { command }) => db::run(command).await?,
        Some(Commands::Browse {
            category,
            lng,
            lat,
            api_url,
            synthesize_ids,
        }) => {
            let args = browse::BrowseArgs {
                category,
                location: lng.zip(lat),
                api_url,
                synthesize_ids,
            };
            browse::run(args).await?;
        }
        None => println!("agrobridge-cli: try `db` or `browse`; see --help"),
    }

    Ok(())
}
