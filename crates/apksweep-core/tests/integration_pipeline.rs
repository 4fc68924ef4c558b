//! Integration tests: local file server, full probe/download pipeline.
//!
//! All delays are zeroed so the suite runs in well under a second per test.

mod common;

use apksweep_core::config::SweepConfig;
use apksweep_core::fetch::FetchStatus;
use apksweep_core::pipeline::Pipeline;
use apksweep_core::probe::DetectionMethod;
use apksweep_core::target::CandidateId;
use common::file_server::{archive_body, FileServer, Resource};
use tempfile::tempdir;

fn fast_config(server: &FileServer, start: u32, end: u32) -> SweepConfig {
    let mut cfg = SweepConfig::default();
    cfg.target.url_template = server.url_template();
    cfg.target.start = start;
    cfg.target.end = end;
    cfg.probe.max_workers = 2;
    cfg.probe.jitter_min_ms = 0;
    cfg.probe.jitter_max_ms = 0;
    cfg.probe.head_timeout_secs = 5;
    cfg.probe.range_timeout_secs = 5;
    cfg.probe.soft_block_cooldown_secs = 0;
    cfg.probe.soft_block_timeout_secs = 5;
    cfg.download.jitter_min_ms = 0;
    cfg.download.jitter_max_ms = 0;
    cfg.download.soft_block_cooldown_min_secs = 0;
    cfg.download.soft_block_cooldown_max_secs = 0;
    cfg.download.backoff_min_secs = 0;
    cfg.download.backoff_max_secs = 0;
    cfg.download.timeout_secs = 10;
    cfg.download.connect_timeout_secs = 5;
    cfg
}

fn id(v: u32) -> CandidateId {
    CandidateId::new(v, 4)
}

#[test]
fn end_to_end_confirms_downloads_and_skips_on_rerun() {
    let body = archive_body(2048);
    let server = FileServer::start(vec![("/app-0001.apk", Resource::new(body.clone()))]);
    let dir = tempdir().unwrap();
    let cfg = fast_config(&server, 0, 3);

    let pipeline = Pipeline::new(cfg.clone(), dir.path(), None).unwrap();
    let report = pipeline.run().unwrap();
    assert_eq!(report.scanned, 4);
    assert_eq!(report.confirmed.len(), 1);
    let v = &report.confirmed[0];
    assert_eq!(v.id, id(1));
    assert_eq!(v.size, 2048);
    assert_eq!(v.detection_method, DetectionMethod::HeadGet);
    assert_eq!(report.downloads.downloaded, 1);
    assert_eq!(report.downloads.bytes_written, 2048);
    assert_eq!(report.files.len(), 1);
    assert_eq!(report.files[0].name, "app-0001.apk");
    assert_eq!(report.files[0].size, 2048);
    assert_eq!(std::fs::read(dir.path().join("app-0001.apk")).unwrap(), body);
    assert_eq!(server.full_gets("/app-0001.apk"), 1);

    // Second run: probes again but downloads nothing.
    let pipeline = Pipeline::new(cfg, dir.path(), None).unwrap();
    let report = pipeline.run().unwrap();
    assert_eq!(report.confirmed.len(), 1);
    assert_eq!(report.downloads.downloaded, 0);
    assert_eq!(report.downloads.already_present, 1);
    assert_eq!(server.full_gets("/app-0001.apk"), 1);
}

#[test]
fn head_403_falls_back_to_ranged_read() {
    let server = FileServer::start(vec![(
        "/app-0002.apk",
        Resource {
            body: archive_body(2048),
            head_forbidden: true,
            forbid_full_gets: 0,
            error_full_gets: 0,
        },
    )]);
    let dir = tempdir().unwrap();
    let pipeline = Pipeline::new(fast_config(&server, 0, 3), dir.path(), None).unwrap();

    let v = pipeline.probe_one(id(2));
    assert!(v.valid, "verdict: {:?}", v);
    assert!(v.soft_blocked);
    assert_eq!(v.detection_method, DetectionMethod::GetRange);
    assert_eq!(v.size, 2048);
    assert_eq!(server.heads("/app-0002.apk"), 1);
    assert_eq!(server.range_gets("/app-0002.apk"), 1);
}

#[test]
fn absent_and_non_archive_candidates_are_invalid_and_leave_no_file() {
    let server = FileServer::start(vec![(
        "/app-0000.apk",
        Resource::new(b"<html><body>soft 404</body></html>".to_vec()),
    )]);
    let dir = tempdir().unwrap();
    let pipeline = Pipeline::new(fast_config(&server, 0, 1), dir.path(), None).unwrap();

    let fake = pipeline.probe_one(id(0));
    assert!(!fake.valid);
    assert_eq!(fake.detection_method, DetectionMethod::None);
    assert!(fake.error.is_none());

    let missing = pipeline.probe_one(id(1));
    assert!(!missing.valid);
    assert!(missing.error.is_some(), "404 carries an error detail");

    let report = pipeline.run().unwrap();
    assert!(report.confirmed.is_empty());
    assert!(report.files.is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    assert_eq!(server.full_gets("/app-0000.apk"), 0);
}

#[test]
fn fetch_is_idempotent_without_network() {
    let server = FileServer::start(vec![("/app-0005.apk", Resource::new(archive_body(4096)))]);
    let dir = tempdir().unwrap();
    let pipeline = Pipeline::new(fast_config(&server, 0, 9), dir.path(), None).unwrap();

    let first = pipeline.fetch_one(id(5));
    assert!(first.success);
    assert_eq!(first.status, FetchStatus::Downloaded);
    assert_eq!(first.bytes_written, 4096);
    let requests = server.total_requests();

    let second = pipeline.fetch_one(id(5));
    assert!(second.success);
    assert_eq!(second.status, FetchStatus::AlreadyPresent);
    assert_eq!(second.bytes_written, 4096);
    assert_eq!(server.total_requests(), requests);
}

#[test]
fn signature_mismatch_deletes_file_and_is_not_retried() {
    let server = FileServer::start(vec![(
        "/app-0007.apk",
        Resource::new(b"this is not an archive at all".to_vec()),
    )]);
    let dir = tempdir().unwrap();
    let pipeline = Pipeline::new(fast_config(&server, 0, 9), dir.path(), None).unwrap();

    let outcome = pipeline.fetch_one(id(7));
    assert!(!outcome.success);
    assert_eq!(outcome.status, FetchStatus::Failed);
    assert!(!dir.path().join("app-0007.apk").exists());
    assert!(!dir.path().join("app-0007.apk.part").exists());
    assert_eq!(server.full_gets("/app-0007.apk"), 1);
}

#[test]
fn download_403_is_retried_after_cooldown() {
    let server = FileServer::start(vec![(
        "/app-0003.apk",
        Resource {
            body: archive_body(1500),
            head_forbidden: false,
            forbid_full_gets: 1,
            error_full_gets: 0,
        },
    )]);
    let dir = tempdir().unwrap();
    let pipeline = Pipeline::new(fast_config(&server, 0, 9), dir.path(), None).unwrap();

    let outcome = pipeline.fetch_one(id(3));
    assert!(outcome.success, "outcome: {:?}", outcome);
    assert_eq!(outcome.bytes_written, 1500);
    assert_eq!(server.full_gets("/app-0003.apk"), 2);
}

#[test]
fn download_gives_up_after_max_attempts() {
    let server = FileServer::start(vec![(
        "/app-0004.apk",
        Resource {
            body: archive_body(1500),
            head_forbidden: false,
            forbid_full_gets: usize::MAX,
            error_full_gets: 0,
        },
    )]);
    let dir = tempdir().unwrap();
    let pipeline = Pipeline::new(fast_config(&server, 0, 9), dir.path(), None).unwrap();

    let outcome = pipeline.fetch_one(id(4));
    assert!(!outcome.success);
    assert!(outcome.error.is_some());
    assert_eq!(server.full_gets("/app-0004.apk"), 3);
    assert!(!dir.path().join("app-0004.apk").exists());
    assert!(!dir.path().join("app-0004.apk.part").exists());
}

#[test]
fn unwritable_output_dir_aborts_before_any_request() {
    let server = FileServer::start(vec![("/app-0001.apk", Resource::new(archive_body(64)))]);
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").unwrap();

    let res = Pipeline::new(fast_config(&server, 0, 3), &blocker.join("out"), None);
    assert!(res.is_err());
    assert_eq!(server.total_requests(), 0);
}

#[tokio::test]
async fn events_report_scan_and_downloads() {
    use apksweep_core::scheduler::PipelineEvent;

    let server = FileServer::start(vec![("/app-0002.apk", Resource::new(archive_body(2048)))]);
    let dir = tempdir().unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::channel(256);
    let pipeline = Pipeline::new(fast_config(&server, 0, 3), dir.path(), Some(tx)).unwrap();
    let report = tokio::task::spawn_blocking(move || pipeline.run())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.downloads.downloaded, 1);

    let mut found = Vec::new();
    let mut downloaded = Vec::new();
    let mut finished = false;
    while let Some(ev) = rx.recv().await {
        match ev {
            PipelineEvent::Found(v) => found.push(v.id),
            PipelineEvent::Downloaded { id, bytes } => downloaded.push((id, bytes)),
            PipelineEvent::ScanFinished { scanned, .. } => {
                assert_eq!(scanned, 4);
                finished = true;
            }
            _ => {}
        }
    }
    assert!(finished);
    assert_eq!(found, vec![id(2)]);
    assert_eq!(downloaded, vec![(id(2), 2048)]);
}

#[test]
fn empty_body_is_retried_then_fails_without_a_file() {
    let server = FileServer::start(vec![("/app-0006.apk", Resource::new(Vec::new()))]);
    let dir = tempdir().unwrap();
    let pipeline = Pipeline::new(fast_config(&server, 0, 9), dir.path(), None).unwrap();

    let outcome = pipeline.fetch_one(id(6));
    assert!(!outcome.success);
    assert_eq!(outcome.status, FetchStatus::Failed);
    assert!(outcome.error.is_some());
    assert_eq!(server.full_gets("/app-0006.apk"), 3);
    assert!(!dir.path().join("app-0006.apk").exists());
    assert!(!dir.path().join("app-0006.apk.part").exists());
}

#[test]
fn server_error_recovers_through_backoff() {
    let server = FileServer::start(vec![(
        "/app-0008.apk",
        Resource {
            body: archive_body(1024),
            head_forbidden: false,
            forbid_full_gets: 0,
            error_full_gets: 1,
        },
    )]);
    let dir = tempdir().unwrap();
    let pipeline = Pipeline::new(fast_config(&server, 0, 9), dir.path(), None).unwrap();

    let outcome = pipeline.fetch_one(id(8));
    assert!(outcome.success, "outcome: {:?}", outcome);
    assert_eq!(outcome.status, FetchStatus::Downloaded);
    assert_eq!(outcome.bytes_written, 1024);
    assert_eq!(server.full_gets("/app-0008.apk"), 2);
}

#[test]
fn connection_refused_is_recorded_and_scan_continues() {
    // Bind then drop a listener so the port is known to be closed.
    let port = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    let server = FileServer::start(Vec::new());
    let mut cfg = fast_config(&server, 0, 2);
    cfg.target.url_template = format!("http://127.0.0.1:{}/app-%s.apk", port);
    let dir = tempdir().unwrap();
    let pipeline = Pipeline::new(cfg, dir.path(), None).unwrap();

    let v = pipeline.probe_one(id(0));
    assert!(!v.valid);
    assert_eq!(v.detection_method, DetectionMethod::None);
    assert!(v.error.is_some());

    let report = pipeline.run().unwrap();
    assert_eq!(report.scanned, 3);
    assert!(report.confirmed.is_empty());
    assert!(report.files.is_empty());
}

#[test]
fn listing_failure_does_not_fail_the_run() {
    let server = FileServer::start(Vec::new());
    let dir = tempdir().unwrap();
    let out = dir.path().join("out");
    let pipeline = Pipeline::new(fast_config(&server, 0, 1), &out, None).unwrap();
    std::fs::remove_dir(&out).unwrap();

    let report = pipeline.run().unwrap();
    assert_eq!(report.scanned, 2);
    assert!(report.files.is_empty());
}
