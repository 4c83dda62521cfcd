//! Shared startup for the `keyload` and `offsets-ingest` binaries.

use clap::error::ErrorKind;
use clap::Parser;

/// Exit status for a malformed command line.
pub const EXIT_USAGE: i32 = 1;

/// Parse argv, or print usage and exit.
///
/// `--help` / `--version` exit 0; any other parse error prints the usage to
/// stderr and exits [`EXIT_USAGE`] (clap's own default is 2).
pub fn parse_or_exit<T: Parser>() -> T {
    match T::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => EXIT_USAGE,
            };
            // Printing can only fail if stdio is gone; the exit code still reports.
            let _ = e.print();
            std::process::exit(code);
        }
    }
}

/// Load `.env.local` when present, then install the fmt subscriber
/// (`RUST_LOG` overrides the `info` default).
pub fn init_runtime_env() {
    let _ = dotenvy::from_filename(".env.local");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
