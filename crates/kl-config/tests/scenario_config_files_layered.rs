use kl_config::registry::RegistrySettings;
use kl_config::{load_layered_yaml, report_unused_keys, UnusedKeyPolicy};

fn repo_config(name: &str) -> String {
    std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("config")
        .join(name)
        .to_string_lossy()
        .to_string()
}

#[test]
fn shipped_base_config_is_valid_and_fully_consumed() {
    let base = repo_config("keyload.yaml");
    let loaded = load_layered_yaml(&[base.as_str()]).expect("shipped config must load");

    let s = RegistrySettings::from_config_json(&loaded.config_json).unwrap();
    assert_eq!(s.application_id, 34);
    assert!(s.base_url.starts_with("https://"));

    let unused = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Fail).unwrap();
    assert!(unused.is_clean());
}

#[test]
fn file_overlay_overrides_base() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let overlay = dir.path().join("staging.yaml");
    std::fs::write(
        &overlay,
        "registry:\n  base_url: \"http://127.0.0.1:8080\"\n  accept_invalid_certs: false\n",
    )?;

    let base = repo_config("keyload.yaml");
    let overlay_s = overlay.to_string_lossy().to_string();
    let loaded = load_layered_yaml(&[base.as_str(), overlay_s.as_str()])?;
    let s = RegistrySettings::from_config_json(&loaded.config_json)?;

    assert_eq!(s.base_url, "http://127.0.0.1:8080");
    assert!(!s.accept_invalid_certs);
    assert_eq!(s.device_profile_id, "d0468204-0436-4275-b2a1-7967a41f5fa8");

    let base_only = load_layered_yaml(&[base.as_str()])?;
    assert_ne!(base_only.config_hash, loaded.config_hash);
    Ok(())
}

#[test]
fn missing_file_is_reported_with_path() {
    let err = load_layered_yaml(&["/nonexistent/keyload.yaml"]).unwrap_err();
    assert!(err.to_string().contains("/nonexistent/keyload.yaml"));
}
