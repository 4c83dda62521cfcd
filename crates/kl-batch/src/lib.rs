//! Manufacturing batch reader.
//!
//! Turns a jig CSV export into [`KeyRow`]s for `kl_reconcile::build_device_map`.
//! This is the read side only. It does not deduplicate and does not drop
//! embedded header rows; both belong to the loader.
//!
//! ## CSV column contract
//!
//! | Column   | Example                            | Notes                     |
//! |----------|------------------------------------|---------------------------|
//! | `devEUI` | `70B3D5E75E00A1B2`                 | required, hex digits only |
//! | `nwkKey` | `2B7E151628AED2A6ABF7158809CF4F3C` | required, non-empty       |
//!
//! Other columns are ignored. Header lookup ignores case and surrounding
//! whitespace. Jig files sometimes carry NUL bytes; they are removed before
//! parsing.

use std::fmt;
use std::path::Path;

use kl_reconcile::{is_embedded_header, KeyRow, ReconcileError, DEV_EUI_HEADER, NWK_KEY_HEADER};
use tracing::warn;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Structural errors: the batch cannot be read at all.
#[derive(Debug)]
pub enum BatchError {
    /// File could not be opened or read.
    Io(String),
    /// The first line is missing a required column.
    MissingHeader(&'static str),
    /// The header line itself could not be decoded.
    Header(String),
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchError::Io(msg) => write!(f, "batch io error: {msg}"),
            BatchError::MissingHeader(col) => {
                write!(f, "batch missing required header column: '{col}'")
            }
            BatchError::Header(msg) => write!(f, "batch header unreadable: {msg}"),
        }
    }
}

impl std::error::Error for BatchError {}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Rows accepted from a batch plus the per-row rejections.
#[derive(Debug, Default)]
pub struct Batch {
    /// Accepted rows in file order.
    pub rows: Vec<KeyRow>,
    /// One [`ReconcileError::InputFormat`] per skipped record.
    pub rejected: Vec<ReconcileError>,
}

impl Batch {
    pub fn records_read(&self) -> usize {
        self.rows.len() + self.rejected.len()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Read the batch at `path`. See [`parse_batch_bytes`].
pub fn read_batch_file(path: &Path) -> Result<Batch, BatchError> {
    let raw = std::fs::read(path)
        .map_err(|e| BatchError::Io(format!("read '{}': {e}", path.display())))?;
    parse_batch_bytes(&raw)
}

/// Parse a batch from raw bytes.
///
/// Malformed records (missing field, empty or non-hex devEUI, empty nwkKey,
/// invalid UTF-8) are skipped with a warning and listed in [`Batch::rejected`]. Only
/// header problems are returned as `Err`.
pub fn parse_batch_bytes(raw: &[u8]) -> Result<Batch, BatchError> {
    let clean: Vec<u8> = raw.iter().copied().filter(|b| *b != 0).collect();

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(clean.as_slice());

    let headers = rdr
        .headers()
        .map_err(|e| BatchError::Header(e.to_string()))?
        .clone();

    if headers.is_empty() {
        return Ok(Batch::default());
    }

    let dev_idx = column_index(&headers, DEV_EUI_HEADER)?;
    let key_idx = column_index(&headers, NWK_KEY_HEADER)?;

    let mut out = Batch::default();

    for (i, rec) in rdr.records().enumerate() {
        // Header is line 1; fall back to record order when csv has no position.
        let fallback_line = i + 2;

        let rec = match rec {
            Ok(r) => r,
            Err(e) => {
                let line = e
                    .position()
                    .map(|p| p.line() as usize)
                    .unwrap_or(fallback_line);
                reject(&mut out, line, format!("unreadable record: {e}"));
                continue;
            }
        };

        let line = rec
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(fallback_line);

        if rec.iter().all(str::is_empty) {
            continue;
        }

        let dev_eui = rec.get(dev_idx).unwrap_or("");
        let nwk_key = rec.get(key_idx).unwrap_or("");

        if dev_eui.is_empty() {
            reject(&mut out, line, format!("empty or missing '{DEV_EUI_HEADER}'"));
            continue;
        }
        if nwk_key.is_empty() {
            reject(&mut out, line, format!("empty or missing '{NWK_KEY_HEADER}'"));
            continue;
        }
        // Repeated header lines pass through; the loader drops them.
        if !is_embedded_header(dev_eui) && !dev_eui.bytes().all(|b| b.is_ascii_hexdigit()) {
            reject(&mut out, line, format!("'{DEV_EUI_HEADER}' is not hex: {dev_eui:?}"));
            continue;
        }

        out.rows.push(KeyRow::new(dev_eui, nwk_key));
    }

    Ok(out)
}

fn column_index(headers: &csv::StringRecord, name: &'static str) -> Result<usize, BatchError> {
    headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(name))
        .ok_or(BatchError::MissingHeader(name))
}

fn reject(out: &mut Batch, row: usize, reason: String) {
    let err = ReconcileError::InputFormat { row, reason };
    warn!("skipping {}", err);
    out.rejected.push(err);
}
