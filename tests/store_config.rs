use std::collections::HashMap;
use std::path::Path;

use certdb::certdb::{CertStatus, CertificateRecord, StoreError, new_accessor};
use certdb::cli::{Cli, handle_command};
use certdb::config::DbConfig;
use chrono::{Duration, Utc};
use clap::Parser;

fn write_db_config(dir: &Path, database: &Path) -> std::path::PathBuf {
    let path = dir.join("db.json");
    let config = format!(
        r#"{{"driver": "sqlite3", "data_source": "{}"}}"#,
        database.display()
    );
    std::fs::write(&path, config).unwrap();
    path
}

#[tokio::test]
async fn test_sqlite_file_persists_between_accessors() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_db_config(dir.path(), &dir.path().join("certs.db"));
    let config = DbConfig::load_with_sources(&config_path, Some(HashMap::new())).unwrap();

    let record = CertificateRecord::new("5001", "ff01", Utc::now() + Duration::days(1))
        .with_ca_label("root");
    {
        let accessor = new_accessor(&config).await.unwrap();
        accessor.insert_certificate(&record).await.unwrap();
    }

    let accessor = new_accessor(&config).await.unwrap();
    let stored = accessor.get_certificate("5001", "ff01").await.unwrap();
    assert_eq!(stored.ca_label, "root");
    assert_eq!(stored.status, CertStatus::Good);
}

#[tokio::test]
async fn test_revoke_command_updates_store() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_db_config(dir.path(), &dir.path().join("certs.db"));
    let config = DbConfig::load_with_sources(&config_path, Some(HashMap::new())).unwrap();
    {
        let accessor = new_accessor(&config).await.unwrap();
        accessor
            .insert_certificate(&CertificateRecord::new(
                "77",
                "abcd",
                Utc::now() + Duration::days(1),
            ))
            .await
            .unwrap();
    }

    let cli = Cli::try_parse_from([
        "certdb",
        "revoke",
        "--db-config",
        config_path.to_str().unwrap(),
        "--serial",
        "77",
        "--aki",
        "abcd",
        "--reason",
        "superseded",
    ])
    .unwrap();
    handle_command(cli).await.unwrap();

    let accessor = new_accessor(&config).await.unwrap();
    let stored = accessor.get_certificate("77", "abcd").await.unwrap();
    assert_eq!(stored.status, CertStatus::Revoked);
    assert_eq!(stored.reason, 4);
    assert!(stored.revoked_at.is_some());
    assert_eq!(
        accessor
            .get_revoked_and_unexpired_certificates()
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_revoke_command_on_unknown_certificate_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = write_db_config(dir.path(), &dir.path().join("certs.db"));

    let cli = Cli::try_parse_from([
        "certdb",
        "revoke",
        "--db-config",
        config_path.to_str().unwrap(),
        "--serial",
        "1",
        "--aki",
        "2",
    ])
    .unwrap();
    let err = handle_command(cli).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<StoreError>(),
        Some(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_unknown_driver_in_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("db.toml");
    std::fs::write(&path, "driver = \"mysql\"\ndata_source = \"root@/certs\"\n").unwrap();

    let config = DbConfig::load_with_sources(&path, Some(HashMap::new())).unwrap();
    assert!(matches!(
        new_accessor(&config).await,
        Err(StoreError::Configuration(_))
    ));
}
