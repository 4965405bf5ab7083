use std::fs;

use pointstore::core::Error;
use pointstore::PointStoreConfig;
use tempfile::tempdir;

#[test]
fn loads_partial_file_with_defaults() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("pointstore.json");
    fs::write(
        &path,
        r#"{
            "ingest": { "spawn_threshold": 500, "batch_insert_size": 1000 },
            "migration": { "period_ms": 86400000, "aggregation_interval_ms": 60000 }
        }"#,
    )
    .expect("write config");

    let config = PointStoreConfig::load(&path).expect("load");
    assert_eq!(config.ingest.spawn_threshold, 500);
    assert_eq!(config.ingest.batch_insert_size, 1000);
    assert_eq!(config.ingest.max_instances, 5);
    assert_eq!(config.migration.period(), 86_400_000);
    assert_eq!(config.migration.read_chunk_size, 10_000);
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempdir().expect("tempdir");
    let err = PointStoreConfig::load(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, Error::Io(_)));
}

#[test]
fn malformed_file_is_json_error() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ ingest: ").expect("write config");
    assert!(matches!(PointStoreConfig::load(&path), Err(Error::Json(_))));
}

#[test]
fn saved_config_loads_back() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("pointstore.json");
    let mut config = PointStoreConfig::default();
    config.ingest.max_instances = 2;
    config.migration.migrate_from = Some(1_600_000_000_000);
    fs::write(&path, config.to_json().expect("json")).expect("write config");
    assert_eq!(PointStoreConfig::load(&path).expect("load"), config);
}
