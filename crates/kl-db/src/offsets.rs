//! Calibration CSV -> `microart_offsets`.
//!
//! Row policy:
//! - any empty cell: skipped (counted, warned)
//! - a numeric cell that is not an `f64`: rejected (counted, warned)
//! - id already stored: left untouched (`ON CONFLICT (id) DO NOTHING`)

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, warn};

/// One calibration record as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct OffsetRow {
    pub id: String,
    pub time: f64,
    pub dev_eui: String,
    pub device_name: String,
    pub in6: String,
    pub in18: String,
    pub in36: String,
    pub moist_open_6: f64,
    pub moist_open_18: f64,
    pub moist_open_36: f64,
    pub moist_sub_6: f64,
    pub moist_sub_18: f64,
    pub moist_sub_36: f64,
}

/// CSV shape. Every cell is read as text so an empty cell can be told apart
/// from a malformed number.
#[derive(Debug, Deserialize)]
struct RawOffsetRow {
    #[serde(rename = "ID")]
    id: String,
    time: String,
    #[serde(rename = "devEUI")]
    dev_eui: String,
    #[serde(rename = "deviceName")]
    device_name: String,
    in6: String,
    in18: String,
    in36: String,
    moist_open_6: String,
    moist_open_18: String,
    moist_open_36: String,
    moist_sub_6: String,
    moist_sub_18: String,
    moist_sub_36: String,
}

impl RawOffsetRow {
    fn cells(&self) -> [&str; 13] {
        [
            &self.id,
            &self.time,
            &self.dev_eui,
            &self.device_name,
            &self.in6,
            &self.in18,
            &self.in36,
            &self.moist_open_6,
            &self.moist_open_18,
            &self.moist_open_36,
            &self.moist_sub_6,
            &self.moist_sub_18,
            &self.moist_sub_36,
        ]
    }

    fn has_empty_cell(&self) -> bool {
        self.cells().iter().any(|c| c.trim().is_empty())
    }

    fn into_row(self) -> Result<OffsetRow, String> {
        Ok(OffsetRow {
            time: num("time", &self.time)?,
            moist_open_6: num("moist_open_6", &self.moist_open_6)?,
            moist_open_18: num("moist_open_18", &self.moist_open_18)?,
            moist_open_36: num("moist_open_36", &self.moist_open_36)?,
            moist_sub_6: num("moist_sub_6", &self.moist_sub_6)?,
            moist_sub_18: num("moist_sub_18", &self.moist_sub_18)?,
            moist_sub_36: num("moist_sub_36", &self.moist_sub_36)?,
            id: self.id.trim().to_string(),
            dev_eui: self.dev_eui.trim().to_string(),
            device_name: self.device_name.trim().to_string(),
            in6: self.in6.trim().to_string(),
            in18: self.in18.trim().to_string(),
            in36: self.in36.trim().to_string(),
        })
    }
}

const COLUMNS: [&str; 13] = [
    "ID",
    "time",
    "devEUI",
    "deviceName",
    "in6",
    "in18",
    "in36",
    "moist_open_6",
    "moist_open_18",
    "moist_open_36",
    "moist_sub_6",
    "moist_sub_18",
    "moist_sub_36",
];

fn num(column: &str, cell: &str) -> Result<f64, String> {
    let v: f64 = cell
        .trim()
        .parse()
        .map_err(|_| format!("{column}: '{cell}' is not a number"))?;
    if !v.is_finite() {
        return Err(format!("{column}: '{cell}' is not finite"));
    }
    Ok(v)
}

/// A skipped or rejected calibration row. `line` is where the record starts
/// in the file (header is line 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetRowProblem {
    pub line: u64,
    pub reason: String,
}

/// Result of parsing a calibration CSV, before touching the database.
#[derive(Debug, Default)]
pub struct ParsedOffsets {
    pub rows: Vec<OffsetRow>,
    pub rows_read: u64,
    pub skipped_missing_cell: u64,
    pub rejected_bad_number: u64,
    /// Skipped and rejected rows in file order.
    pub problems: Vec<OffsetRowProblem>,
}

/// Counts for one ingest run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OffsetsIngestReport {
    pub rows_read: u64,
    pub skipped_missing_cell: u64,
    pub rejected_bad_number: u64,
    pub inserted: u64,
    pub already_present: u64,
}

/// Parse calibration CSV text. Only a missing column is an error; bad rows
/// are counted.
pub fn parse_offsets_csv(text: &str) -> Result<ParsedOffsets> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = rdr
        .headers()
        .context("calibration csv header unreadable")?
        .clone();
    if let Some(missing) = COLUMNS.iter().find(|c| !headers.iter().any(|h| h == **c)) {
        anyhow::bail!("calibration csv missing required column '{missing}'");
    }

    let mut out = ParsedOffsets::default();

    for (i, rec) in rdr.records().enumerate() {
        out.rows_read += 1;

        let rec = match rec {
            Ok(r) => r,
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(i as u64 + 2);
                return Err(e).with_context(|| format!("calibration csv unreadable at line {line}"));
            }
        };
        // Quoted cells may span lines; the record knows where it started.
        let line = rec.position().map(|p| p.line()).unwrap_or(i as u64 + 2);

        let raw: RawOffsetRow = match rec.deserialize(Some(&headers)) {
            Ok(r) => r,
            // Short rows fail to deserialize; they are missing cells.
            Err(e) => {
                warn!(line, error = %e, "missing a cell, skipping row");
                out.skipped_missing_cell += 1;
                out.problems.push(OffsetRowProblem {
                    line,
                    reason: "missing a cell".to_string(),
                });
                continue;
            }
        };

        if raw.has_empty_cell() {
            warn!(line, id = %raw.id, "missing a cell, skipping row");
            out.skipped_missing_cell += 1;
            out.problems.push(OffsetRowProblem {
                line,
                reason: "missing a cell".to_string(),
            });
            continue;
        }

        match raw.into_row() {
            Ok(row) => out.rows.push(row),
            Err(reason) => {
                warn!(line, %reason, "rejecting calibration row");
                out.rejected_bad_number += 1;
                out.problems.push(OffsetRowProblem { line, reason });
            }
        }
    }

    Ok(out)
}

/// Insert rows one by one; ids already stored are left as they are.
/// Returns `(inserted, already_present)`.
pub async fn insert_offsets(pool: &PgPool, rows: &[OffsetRow]) -> Result<(u64, u64)> {
    let mut inserted = 0u64;
    let mut already_present = 0u64;

    for r in rows {
        let res = sqlx::query(
            r#"
            insert into microart_offsets (
                id, time, deveui, devicename, in6, in18, in36,
                moist_open_6, moist_open_18, moist_open_36,
                moist_sub_6, moist_sub_18, moist_sub_36
            )
            values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            on conflict (id) do nothing
            "#,
        )
        .bind(&r.id)
        .bind(r.time)
        .bind(&r.dev_eui)
        .bind(&r.device_name)
        .bind(&r.in6)
        .bind(&r.in18)
        .bind(&r.in36)
        .bind(r.moist_open_6)
        .bind(r.moist_open_18)
        .bind(r.moist_open_36)
        .bind(r.moist_sub_6)
        .bind(r.moist_sub_18)
        .bind(r.moist_sub_36)
        .execute(pool)
        .await
        .with_context(|| format!("insert microart_offsets id={} failed", r.id))?;

        if res.rows_affected() == 1 {
            inserted += 1;
        } else {
            already_present += 1;
        }
    }

    Ok((inserted, already_present))
}

/// Read the calibration CSV at `path` and store new rows.
pub async fn ingest_offsets_csv(pool: &PgPool, path: &Path) -> Result<OffsetsIngestReport> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read calibration csv failed: {}", path.display()))?;

    let parsed = parse_offsets_csv(&text)?;
    let (inserted, already_present) = insert_offsets(pool, &parsed.rows).await?;

    let report = OffsetsIngestReport {
        rows_read: parsed.rows_read,
        skipped_missing_cell: parsed.skipped_missing_cell,
        rejected_bad_number: parsed.rejected_bad_number,
        inserted,
        already_present,
    };
    info!(
        rows_read = report.rows_read,
        skipped = report.skipped_missing_cell,
        rejected = report.rejected_bad_number,
        inserted = report.inserted,
        already_present = report.already_present,
        "calibration ingestion complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "ID,time,devEUI,deviceName,in6,in18,in36,moist_open_6,moist_open_18,moist_open_36,moist_sub_6,moist_sub_18,moist_sub_36\n";

    #[test]
    fn parses_complete_rows() {
        let text = format!("{HEADER}u1,1561000000.5,AABB,E00A1B2,a,b,c,1,2,3,4.5,5,6\n");
        let p = parse_offsets_csv(&text).unwrap();
        assert_eq!(p.rows_read, 1);
        assert_eq!(p.rows.len(), 1);
        let r = &p.rows[0];
        assert_eq!(r.id, "u1");
        assert_eq!(r.dev_eui, "AABB");
        assert_eq!(r.in18, "b");
        assert_eq!(r.time, 1561000000.5);
        assert_eq!(r.moist_sub_6, 4.5);
    }

    #[test]
    fn empty_cell_skips_row() {
        let text = format!(
            "{HEADER}u1,1,AABB,n,a,b,c,1,2,3,4,5,6\nu2,1,CCDD,n,,b,c,1,2,3,4,5,6\n"
        );
        let p = parse_offsets_csv(&text).unwrap();
        assert_eq!(p.rows_read, 2);
        assert_eq!(p.skipped_missing_cell, 1);
        assert_eq!(p.rows.len(), 1);
    }

    #[test]
    fn short_row_counts_as_missing_cell() {
        let text = format!("{HEADER}u1,1,AABB\n");
        let p = parse_offsets_csv(&text).unwrap();
        assert_eq!(p.skipped_missing_cell, 1);
        assert!(p.rows.is_empty());
    }

    #[test]
    fn bad_number_rejects_row() {
        let text = format!("{HEADER}u1,yesterday,AABB,n,a,b,c,1,2,3,4,5,6\nu2,1,AABB,n,a,b,c,1,2,NaN,4,5,6\n");
        let p = parse_offsets_csv(&text).unwrap();
        assert_eq!(p.rejected_bad_number, 2);
        assert!(p.rows.is_empty());
    }

    #[test]
    fn problem_lines_follow_multiline_quoted_cells() {
        let text = format!(
            "{HEADER}u1,1,AABB,\"jig\nnote\",a,b,c,1,2,3,4,5,6\nu2,later,CCDD,n,a,b,c,1,2,3,4,5,6\nu3,1,EEFF,n,,b,c,1,2,3,4,5,6\n"
        );
        let p = parse_offsets_csv(&text).unwrap();
        assert_eq!(p.rows.len(), 1);
        assert_eq!(p.rows[0].device_name, "jig\nnote");
        let lines: Vec<u64> = p.problems.iter().map(|x| x.line).collect();
        assert_eq!(lines, vec![4, 5]);
        assert!(p.problems[0].reason.contains("time"));
    }

    #[test]
    fn missing_column_is_an_error() {
        let err = parse_offsets_csv("ID,time\nu1,1\n").unwrap_err().to_string();
        assert!(err.contains("devEUI"), "got: {err}");
    }
}
