//! One-shot reaper sweep for operators.
//!
//! Connects to the database, terminates every non-terminal session older
//! than the threshold, prints what it found and what it terminated, and
//! exits successfully either way: an empty sweep is a healthy sweep.

use anyhow::Result;
use clap::Parser;

use beacon_core::config::Config;
use beacon_core::repositories::postgres::PgStore;
use beacon_core::services::reaper::{self, DEFAULT_THRESHOLD_MINUTES};

#[derive(Parser)]
#[command(name = "reaper")]
#[command(about = "Force-terminate live sessions stuck past an age threshold")]
struct Cli {
    /// Age in minutes before a non-terminal session counts as stale.
    #[arg(long, default_value_t = DEFAULT_THRESHOLD_MINUTES)]
    threshold_minutes: i64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        )
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_env()?;
    let pool = beacon_core::db::create_pool(&config.database_url).await?;
    beacon_core::db::run_migrations(&pool).await?;
    let store = PgStore::new(pool);

    let report =
        reaper::reap(&store, chrono::Duration::minutes(cli.threshold_minutes)).await?;

    println!(
        "Found {} stale session(s), terminated {}",
        report.stale, report.terminated
    );

    Ok(())
}
