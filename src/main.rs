//! Database bootstrap entrypoint: opens (or creates) the SQLite
//! database, applies the schema, seeds commission settings and places
//! the configured root member if it exists.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use referral_matrix::{build_pool, Config, MatrixEngine};

#[derive(Parser)]
#[command(name = "referral-matrix", about = "Initialize a referral-matrix database")]
struct Args {
    /// SQLite database path (created if missing)
    database: String,

    /// TOML configuration file; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load(path).context("loading config")?,
        None => Config::default(),
    };

    let pool = build_pool(&args.database).context("opening database")?;
    let engine = MatrixEngine::new(pool, config);

    engine
        .ensure_commission_settings_seeded()
        .context("seeding commission settings")?;

    if let Some(root_id) = engine.config().root_member_id.clone() {
        match engine.get_member(&root_id)? {
            Some(_) => {
                engine.place_member(&root_id, None).context("placing root")?;
                info!(root = %root_id, "Root member placed");
            }
            None => {
                info!(root = %root_id, "Configured root member does not exist yet");
            }
        }
    }

    info!(database = %args.database, "Database ready");
    Ok(())
}
