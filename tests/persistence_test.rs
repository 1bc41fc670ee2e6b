#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

const HEADER: &str = "kind,customer,pharmacy,body,media_url,status";

#[test]
fn test_rocksdb_persistence_recovery() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("test_db");

    // 1. First run: a customer places an order
    let mut csv1 = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv1, "{HEADER}").unwrap();
    writeln!(csv1, "message,+919999999999,+910000000001,Crocin x2").unwrap();

    let mut cmd1 = Command::new(cargo_bin!("rxflow"));
    cmd1.arg(csv1.path())
        .arg("--config")
        .arg("tests/fixtures/rxflow.toml")
        .arg("--db-path")
        .arg(&db_path);

    let output1 = cmd1.output().expect("Failed to execute command");
    assert!(output1.status.success());
    let stdout1 = String::from_utf8_lossy(&output1.stdout);
    assert!(stdout1.contains(",+919999999999,pending,Crocin x2,false,,,,"));

    // 2. Second run: the pharmacist reviews the order created in the first run
    let mut csv2 = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv2, "{HEADER}").unwrap();
    writeln!(csv2, "transition,+919999999999,+910000000001,,,under_review").unwrap();

    let mut cmd2 = Command::new(cargo_bin!("rxflow"));
    cmd2.arg(csv2.path())
        .arg("--config")
        .arg("tests/fixtures/rxflow.toml")
        .arg("--db-path")
        .arg(&db_path);

    let output2 = cmd2.output().expect("Failed to execute command");
    assert!(output2.status.success());
    let stdout2 = String::from_utf8_lossy(&output2.stdout);
    let stderr2 = String::from_utf8_lossy(&output2.stderr);

    // Same order, recovered and moved on
    assert!(!stderr2.contains("Error processing event"), "{stderr2}");
    assert!(stdout2.contains(",+919999999999,under_review,Crocin x2,false,,,,"));
    assert_eq!(stdout2.lines().count(), 2);
}
