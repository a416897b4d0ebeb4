#![cfg(feature = "storage-rocksdb")]

use assert_cmd::cargo_bin;
use std::io::Write;
use std::process::Command;
use tempfile::tempdir;

#[test]
fn test_rocksdb_persistence_recovery() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("ledger_db");

    // 1. First run: open an account and fund it.
    let mut script1 = tempfile::NamedTempFile::new().unwrap();
    writeln!(script1, "op,user,counterparty,amount,description").unwrap();
    writeln!(script1, "open,alice,,,").unwrap();
    writeln!(script1, "deposit,alice,,100.0,").unwrap();

    let mut cmd1 = Command::new(cargo_bin!("corebank"));
    cmd1.arg(script1.path()).arg("--db-path").arg(&db_path);

    let output1 = cmd1.output().expect("Failed to execute command");
    assert!(output1.status.success());
    let stdout1 = String::from_utf8_lossy(&output1.stdout);
    assert!(stdout1.contains("alice,110-"));
    assert!(stdout1.contains(",100.0,false"));

    // 2. Second run: same database, no open. The alias and the balance
    // must both have survived.
    let mut script2 = tempfile::NamedTempFile::new().unwrap();
    writeln!(script2, "op,user,counterparty,amount,description").unwrap();
    writeln!(script2, "deposit,alice,,50.0,").unwrap();

    let mut cmd2 = Command::new(cargo_bin!("corebank"));
    cmd2.arg(script2.path()).arg("--db-path").arg(&db_path);

    let output2 = cmd2.output().expect("Failed to execute command");
    assert!(output2.status.success());
    let stdout2 = String::from_utf8_lossy(&output2.stdout);
    assert!(stdout2.contains(",150.0,false"));
}

#[test]
fn test_rocksdb_preserves_frozen_state() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("frozen_db");

    let mut script1 = tempfile::NamedTempFile::new().unwrap();
    writeln!(script1, "op,user,counterparty,amount,description").unwrap();
    writeln!(script1, "open,bob,,,").unwrap();
    writeln!(script1, "deposit,bob,,20.0,").unwrap();
    writeln!(script1, "freeze,bob,,,").unwrap();

    let mut cmd1 = Command::new(cargo_bin!("corebank"));
    cmd1.arg(script1.path()).arg("--db-path").arg(&db_path);
    assert!(cmd1.output().unwrap().status.success());

    // Deposits against the recovered frozen account must still bounce.
    let mut script2 = tempfile::NamedTempFile::new().unwrap();
    writeln!(script2, "op,user,counterparty,amount,description").unwrap();
    writeln!(script2, "deposit,bob,,5.0,").unwrap();

    let mut cmd2 = Command::new(cargo_bin!("corebank"));
    cmd2.arg(script2.path()).arg("--db-path").arg(&db_path);

    let output2 = cmd2.output().unwrap();
    assert!(output2.status.success());
    let stdout2 = String::from_utf8_lossy(&output2.stdout);
    let stderr2 = String::from_utf8_lossy(&output2.stderr);
    assert!(stdout2.contains(",20.0,true"));
    assert!(stderr2.contains("Error processing operation"));
}
