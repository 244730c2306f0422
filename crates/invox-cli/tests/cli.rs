use std::path::Path;
use std::sync::Arc;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use invox_core::{InvoiceLedger, SqliteStore, StructuredInvoice};

/// Command isolated from the user's config, database, `.env` and API key.
fn invox(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("invox").unwrap();
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .env("INVOX_DATABASE", home.path().join("invoices.db"))
        .env("UPLOAD_DIR", home.path().join("uploads"))
        .env_remove("OPENAI_API_KEY")
        .env_remove("RUST_LOG");
    cmd
}

fn seed(db: &Path, vendor: &str) -> i64 {
    let ledger = InvoiceLedger::new(Arc::new(SqliteStore::open(db).unwrap()));
    let mut data = StructuredInvoice::new("ACME\nTotal 10.00");
    data.vendor_name = Some(vendor.to_string());
    ledger.ingest(&data, "scan.png").unwrap().id.0
}

#[test]
fn test_help_lists_commands() {
    let home = TempDir::new().unwrap();
    invox(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("process"))
        .stdout(predicate::str::contains("batch"))
        .stdout(predicate::str::contains("approve"))
        .stdout(predicate::str::contains("reject"));
}

#[test]
fn test_config_path_defaults_to_config_dir() {
    let home = TempDir::new().unwrap();
    invox(&home)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("invox/config.json"))
        .stdout(predicate::str::contains("not created"));
}

#[test]
fn test_config_init_then_get_and_set() {
    let home = TempDir::new().unwrap();
    invox(&home).args(["config", "init"]).assert().success();
    assert!(home.path().join("config/invox/config.json").exists());

    invox(&home)
        .args(["config", "get", "pdf.max_pages"])
        .assert()
        .success()
        .stdout(predicate::str::diff("10\n"));

    invox(&home)
        .args(["config", "set", "pdf.max_pages", "3"])
        .assert()
        .success();
    invox(&home)
        .args(["config", "get", "pdf.max_pages"])
        .assert()
        .success()
        .stdout(predicate::str::diff("3\n"));

    invox(&home)
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn test_config_get_unknown_key() {
    let home = TempDir::new().unwrap();
    invox(&home)
        .args(["config", "get", "ocr.nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration key not found"));
}

#[test]
fn test_explicit_config_must_exist() {
    let home = TempDir::new().unwrap();
    invox(&home)
        .args(["--config", "missing.json", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.json"));
}

#[test]
fn test_process_rejects_text_file() {
    let home = TempDir::new().unwrap();
    let notes = home.path().join("notes.txt");
    std::fs::write(&notes, "not an invoice").unwrap();

    invox(&home)
        .arg("process")
        .arg(&notes)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported media type"));

    assert!(!home.path().join("uploads").exists());
    assert!(!home.path().join("invoices.db").exists());
}

#[test]
fn test_process_requires_api_key() {
    let home = TempDir::new().unwrap();
    let scan = home.path().join("scan.png");
    std::fs::write(&scan, b"\x89PNG\r\n\x1a\n").unwrap();

    invox(&home)
        .arg("process")
        .arg(&scan)
        .assert()
        .failure()
        .stderr(predicate::str::contains("OPENAI_API_KEY"));
}

#[test]
fn test_process_missing_file() {
    let home = TempDir::new().unwrap();
    invox(&home)
        .args(["process", "nowhere.pdf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file not found"));
}

#[test]
fn test_batch_without_matches() {
    let home = TempDir::new().unwrap();
    std::fs::write(home.path().join("readme.txt"), "x").unwrap();

    invox(&home)
        .args(["batch", "*.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No matching files"));
}

#[test]
fn test_list_empty_database() {
    let home = TempDir::new().unwrap();
    invox(&home)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No invoices found"));

    invox(&home)
        .args(["list", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::diff("[]\n"));
}

#[test]
fn test_approve_unknown_id_fails() {
    let home = TempDir::new().unwrap();
    invox(&home)
        .args(["approve", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invoice 42 not found"));
}

#[test]
fn test_review_flow() {
    let home = TempDir::new().unwrap();
    let db = home.path().join("invoices.db");
    let first = seed(&db, "ACME Corp");
    let second = seed(&db, "Globex");

    invox(&home)
        .args(["list", "--status", "pending"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ACME Corp"))
        .stdout(predicate::str::contains("Globex"));

    invox(&home)
        .args(["approve", &first.to_string()])
        .assert()
        .success()
        .stdout(predicate::str::contains("approved"));
    invox(&home)
        .args(["reject", &second.to_string()])
        .assert()
        .success();

    invox(&home)
        .args(["list", "--status", "approved"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ACME Corp"))
        .stdout(predicate::str::contains("Globex").not());

    // Reviewed records stay where they are
    invox(&home)
        .args(["reject", &first.to_string()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot mark it rejected"));

    // A rejected record can still be approved
    invox(&home)
        .args(["approve", &second.to_string()])
        .assert()
        .success();
    invox(&home)
        .args(["list", "--status", "rejected", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::diff("[]\n"));

    invox(&home)
        .args(["show", &first.to_string()])
        .assert()
        .success()
        .stdout(predicate::str::contains("[approved]"))
        .stdout(predicate::str::contains("Missing total amount"));
}

#[test]
fn test_show_json() {
    let home = TempDir::new().unwrap();
    let id = seed(&home.path().join("invoices.db"), "ACME Corp");

    let output = invox(&home)
        .args(["show", &id.to_string(), "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let record: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(record["id"], id);
    assert_eq!(record["status"], "pending");
    assert_eq!(record["vendor_name"], "ACME Corp");
}
