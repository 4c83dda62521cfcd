use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use kl_config::registry::RegistrySettings;
use kl_config::secrets::resolve_registry_credentials;
use kl_config::UnusedKeyPolicy;
use kl_reconcile::{build_device_map, reconcile, report_multiple_keys, ErrorPolicy, ReconcileOptions};
use kl_registry::LoraServerRegistry;
use tracing::{info, warn};

/// Check a manufacturing key batch against the LoRa network server.
///
/// Dry run unless --write is given.
#[derive(Parser)]
#[command(name = "keyload", version)]
struct Cli {
    /// Jig CSV export with devEUI and nwkKey columns
    batch: PathBuf,

    /// Create missing devices and provision/overwrite keys
    #[arg(long, default_value_t = false)]
    write: bool,

    /// Layered config paths in merge order
    #[arg(long = "config", default_value = "config/keyload.yaml")]
    config_paths: Vec<String>,

    /// Stop at the first device whose registry calls fail
    #[arg(long, default_value_t = false)]
    fail_fast: bool,

    /// Write the full reconcile report as JSON to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = kl_cli::parse_or_exit();
    kl_cli::init_runtime_env();

    let path_refs: Vec<&str> = cli.config_paths.iter().map(|s| s.as_str()).collect();
    let loaded = kl_config::load_layered_yaml(&path_refs)?;
    info!(config_hash = %loaded.config_hash, "config loaded");

    let unused = kl_config::report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    for p in &unused.unused_leaf_pointers {
        warn!(pointer = %p, "unused config key");
    }

    let settings = RegistrySettings::from_config_json(&loaded.config_json)?;
    let creds = resolve_registry_credentials(&loaded.config_json)?;

    let batch = kl_batch::read_batch_file(&cli.batch)?;
    info!(
        rows = batch.rows.len(),
        rejected = batch.rejected.len(),
        "batch read from {}",
        cli.batch.display()
    );

    let devices = build_device_map(batch.rows);
    report_multiple_keys(&devices);

    let registry = LoraServerRegistry::login(&settings, &creds)
        .await
        .context("registry login failed")?;
    info!(base_url = registry.base_url(), "registry session open");

    let opts = ReconcileOptions::default()
        .with_writes(cli.write)
        .with_error_policy(if cli.fail_fast {
            ErrorPolicy::FailFast
        } else {
            ErrorPolicy::Continue
        });

    let report = reconcile(&registry, &devices, &opts).await?;

    if let Some(path) = &cli.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)
            .with_context(|| format!("write report failed: {}", path.display()))?;
    }

    let s = &report.summary;
    println!(
        "devices={} missing_devices={} missing_keys={} mismatched={} ok={} ok_despite_multiple_keys={} writes_applied={} failed={}",
        s.devices,
        s.missing_devices,
        s.missing_keys,
        s.mismatched,
        s.ok,
        s.ok_despite_multiple_keys,
        s.writes_applied,
        s.failed
    );

    Ok(())
}
