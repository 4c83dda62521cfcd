// DB-backed test, skipped if KL_DATABASE_URL is not set.

use anyhow::Result;

const HEADER: &str = "ID,time,devEUI,deviceName,in6,in18,in36,moist_open_6,moist_open_18,moist_open_36,moist_sub_6,moist_sub_18,moist_sub_36\n";

#[tokio::test]
async fn offsets_ingest_inserts_new_ids_and_keeps_existing() -> Result<()> {
    let url = match std::env::var(kl_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: KL_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await?;
    kl_db::migrate(&pool).await?;

    // Unique ids so reruns against the same database stay independent.
    let nonce = std::process::id();
    let a = format!("scenario-{nonce}-a");
    let b = format!("scenario-{nonce}-b");

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("calibration-data.csv");

    std::fs::write(
        &path,
        format!(
            "{HEADER}{a},100,AABB,n1,x,y,z,1,2,3,4,5,6\n\
             {b},100,CCDD,n2,x,y,z,1,2,3,4,5,6\n\
             skip-me,100,EEFF,,x,y,z,1,2,3,4,5,6\n\
             bad-num,soon,EEFF,n3,x,y,z,1,2,3,4,5,6\n"
        ),
    )?;

    let first = kl_db::ingest_offsets_csv(&pool, &path).await?;
    assert_eq!(first.rows_read, 4);
    assert_eq!(first.skipped_missing_cell, 1);
    assert_eq!(first.rejected_bad_number, 1);
    assert_eq!(first.inserted, 2);
    assert_eq!(first.already_present, 0);

    // Same id with different values: the stored row must not change.
    std::fs::write(
        &path,
        format!("{HEADER}{a},999,AABB,n1,x,y,z,9,9,9,9,9,9\n"),
    )?;
    let second = kl_db::ingest_offsets_csv(&pool, &path).await?;
    assert_eq!(second.inserted, 0);
    assert_eq!(second.already_present, 1);

    let (time,): (f64,) = sqlx::query_as("select time from microart_offsets where id = $1")
        .bind(&a)
        .fetch_one(&pool)
        .await?;
    assert_eq!(time, 100.0);

    sqlx::query("delete from microart_offsets where id = any($1)")
        .bind(vec![a, b])
        .execute(&pool)
        .await?;

    Ok(())
}

#[tokio::test]
async fn migrate_is_idempotent() -> Result<()> {
    let url = match std::env::var(kl_db::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: KL_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await?;
    kl_db::migrate(&pool).await?;
    kl_db::migrate(&pool).await?;

    let (exists,): (bool,) = sqlx::query_as(
        "select exists (select 1 from information_schema.tables where table_name = 'microart_offsets')",
    )
    .fetch_one(&pool)
    .await?;
    assert!(exists);
    Ok(())
}
