use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

/// Load MicroArt calibration offsets into Postgres (KL_DATABASE_URL).
///
/// Existing ids are never overwritten.
#[derive(Parser)]
#[command(name = "offsets-ingest", version)]
struct Cli {
    /// Calibration CSV export
    path: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = kl_cli::parse_or_exit();
    kl_cli::init_runtime_env();

    let pool = kl_db::connect_from_env().await?;
    kl_db::migrate(&pool).await?;

    let r = kl_db::ingest_offsets_csv(&pool, &cli.path).await?;
    println!(
        "rows_read={} skipped_missing_cell={} rejected_bad_number={} inserted={} already_present={}",
        r.rows_read, r.skipped_missing_cell, r.rejected_bad_number, r.inserted, r.already_present
    );

    Ok(())
}
