use crate::cli::commands::run_list;
use apksweep_core::config::SweepConfig;
use tempfile::tempdir;

#[test]
fn list_handles_empty_and_populated_dirs() {
    let dir = tempdir().unwrap();
    let cfg = SweepConfig::default();
    run_list(&cfg, Some(dir.path().to_path_buf())).unwrap();

    std::fs::write(dir.path().join("app-0001.apk"), b"PK\x03\x04").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();
    run_list(&cfg, Some(dir.path().to_path_buf())).unwrap();
}

#[test]
fn list_fails_for_missing_dir() {
    let dir = tempdir().unwrap();
    let cfg = SweepConfig::default();
    assert!(run_list(&cfg, Some(dir.path().join("missing"))).is_err());
}
