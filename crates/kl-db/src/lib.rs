use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

mod offsets;

pub use offsets::{
    ingest_offsets_csv, insert_offsets, parse_offsets_csv, OffsetRow, OffsetRowProblem,
    OffsetsIngestReport, ParsedOffsets,
};

pub const ENV_DB_URL: &str = "KL_DATABASE_URL";

/// Connect to Postgres using KL_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}
