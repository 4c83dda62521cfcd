use kl_reconcile::*;
use kl_testkit::MemoryRegistry;

#[tokio::test]
async fn scenario_key_mismatch_overwritten_when_writes_enabled() {
    let reg = MemoryRegistry::new().with_device("CCDD", Some("K0"));
    let devices = build_device_map(vec![KeyRow::new("CCDD", "K2")]);
    let opts = ReconcileOptions::default().with_writes(true);

    let report = reconcile(&reg, &devices, &opts).await.unwrap();

    assert_eq!(
        report.classification_of("CCDD"),
        Some(Classification::KeyMismatch)
    );
    assert_eq!(report.summary.mismatched, 1);
    assert_eq!(reg.stored_key("CCDD").as_deref(), Some("K2"));
    assert!(reg
        .calls()
        .iter()
        .any(|c| c.op == RegistryOp::OverwriteKey && c.dev_eui == "CCDD"));
}

#[tokio::test]
async fn scenario_key_mismatch_left_alone_when_writes_disabled() {
    let reg = MemoryRegistry::new().with_device("CCDD", Some("K0"));
    let devices = build_device_map(vec![KeyRow::new("CCDD", "K2")]);

    let report = reconcile(&reg, &devices, &ReconcileOptions::default())
        .await
        .unwrap();

    assert!(!report.writes_enabled);
    assert_eq!(
        report.classification_of("CCDD"),
        Some(Classification::KeyMismatch)
    );
    assert_eq!(report.outcomes[0].write, WriteAction::Suppressed);
    assert_eq!(reg.stored_key("CCDD").as_deref(), Some("K0"));
    assert_eq!(reg.write_count(), 0);
}

#[tokio::test]
async fn scenario_keyless_device_gets_provisioned_not_overwritten() {
    let reg = MemoryRegistry::new().with_device("1122", None);
    let devices = build_device_map(vec![KeyRow::new("1122", "K5")]);
    let opts = ReconcileOptions::default().with_writes(true);

    let report = reconcile(&reg, &devices, &opts).await.unwrap();

    assert_eq!(report.classification_of("1122"), Some(Classification::KeyMissing));
    assert_eq!(report.summary.missing_keys, 1);
    assert_eq!(reg.stored_key("1122").as_deref(), Some("K5"));
    let ops: Vec<RegistryOp> = reg.calls().into_iter().map(|c| c.op).collect();
    assert!(ops.contains(&RegistryOp::ProvisionKey));
    assert!(!ops.contains(&RegistryOp::OverwriteKey));
}
