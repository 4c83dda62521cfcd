use std::io::Write;

use kl_batch::{read_batch_file, BatchError};
use kl_reconcile::KeyRow;

#[test]
fn scenario_batch_file_read_from_disk() {
    let mut f = tempfile::NamedTempFile::new().expect("tempfile");
    f.write_all(b"devEUI,nwkKey\r\n70B3D5E75E00A1B2,K1\r\n70B3D5E75E00A1B3,K2\r\n")
        .unwrap();
    f.flush().unwrap();

    let batch = read_batch_file(f.path()).unwrap();

    assert_eq!(
        batch.rows,
        vec![
            KeyRow::new("70B3D5E75E00A1B2", "K1"),
            KeyRow::new("70B3D5E75E00A1B3", "K2"),
        ]
    );
    assert_eq!(batch.records_read(), 2);
}

#[test]
fn scenario_missing_batch_file_names_the_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("no_such_batch.csv");

    let err = read_batch_file(&path).unwrap_err();

    assert!(matches!(err, BatchError::Io(_)));
    assert!(err.to_string().contains("no_such_batch.csv"), "got: {err}");
}
