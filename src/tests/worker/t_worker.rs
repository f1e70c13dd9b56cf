use std::fs;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use indoc::indoc;

use crate::core::names::ModuleName;
use crate::core::types::Type;
use crate::services::worker::clock::Version;
use crate::services::worker::errors::{ErrorBundle, RequestError};
use crate::services::worker::requests::{Request, RequestId, RequestPayload, StageTag};
use crate::services::worker::uri::Uri;
use crate::services::worker::worker::{Worker, WorkerConfig};

enum Outcome {
    Success(ModuleName, Version, RequestPayload),
    Failure(RequestError),
}

fn request(uri: &Uri, stage: StageTag) -> (Request, mpsc::Receiver<Outcome>) {
    let (tx, rx) = mpsc::channel();
    let tx_err = tx.clone();
    let request = Request {
        uri: uri.clone(),
        stage,
        on_success: Box::new(move |name, version, payload| {
            let _ = tx.send(Outcome::Success(name, version, payload));
        }),
        on_error: Box::new(move |error| {
            let _ = tx_err.send(Outcome::Failure(error));
        }),
    };
    (request, rx)
}

fn recv(rx: &mpsc::Receiver<Outcome>) -> Outcome {
    rx.recv_timeout(Duration::from_secs(10))
        .expect("request should complete in time")
}

fn temp_dir(tag: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock should be monotonic")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("lumen_{tag}_{}_{}", std::process::id(), nanos));
    fs::create_dir_all(&dir).expect("failed to create temp dir");
    dir.canonicalize().expect("temp dir should canonicalize")
}

#[test]
fn request_started_before_open_is_satisfied_after_refresh() {
    let worker = Worker::new(WorkerConfig::default());
    let a = Uri::new("file:///proj/a.lm");

    let (req, rx) = request(&a, StageTag::Parsed);
    worker.start_request(RequestId(1), req);

    worker.update_file(&a, Version(1), "let x = 1");
    worker.refresh(None);

    let Outcome::Success(name, version, RequestPayload::Parsed(Some(tree))) = recv(&rx) else {
        panic!("expected a parsed payload");
    };
    assert_eq!(version, Version(1));
    assert_eq!(tree.lets.len(), 1);
    assert_eq!(worker.find_file(name), Some(a));
}

#[test]
fn cancelled_request_never_invokes_its_sinks() {
    let worker = Worker::new(WorkerConfig::default());
    let a = Uri::new("file:///proj/a.lm");

    let (req, rx) = request(&a, StageTag::Typed);
    worker.start_request(RequestId(2), req);
    assert!(worker.cancel_request(RequestId(2)));

    worker.update_file(&a, Version(1), "let x = 1");
    worker.refresh_and_wait(None);

    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    assert_eq!(worker.stats().requests_dispatched, 0);
}

#[test]
fn requests_against_a_closed_file_receive_not_open() {
    let worker = Worker::new(WorkerConfig::default());
    let a = Uri::new("file:///proj/a.lm");
    worker.update_file(&a, Version(1), "let x = 1");

    let (req, rx) = request(&a, StageTag::Errors);
    worker.start_request(RequestId(3), req);

    worker.close_file(&a);
    worker.refresh_and_wait(None);

    let Outcome::Failure(RequestError::FileNotOpen(uri)) = recv(&rx) else {
        panic!("expected a not-open failure");
    };
    assert_eq!(uri, a);
}

#[test]
fn typed_request_delivers_cross_file_payload() {
    let worker = Worker::new(WorkerConfig::default());
    let a = Uri::new("file:///proj/a.lm");
    let b = Uri::new("file:///proj/b.lm");
    worker.update_file(&b, Version(1), "let exported = 1");
    worker.update_file(
        &a,
        Version(1),
        indoc! {r#"
            import "./b" as b
            let use_it = b.exported + 1
        "#},
    );
    worker.refresh_and_wait(None);

    let (req, rx) = request(&a, StageTag::Typed);
    worker.start_request(RequestId(4), req);

    let Outcome::Success(_, version, RequestPayload::Typed(Some(payload))) = recv(&rx) else {
        panic!("expected a typed payload");
    };
    assert_eq!(version, Version(1));
    assert!(payload.signature.contains("use_it"));
    assert_eq!(payload.env.lookup("use_it"), Some(&Type::Int));

    // A dependency edit refreshes the payload a later request sees.
    worker.update_file(&b, Version(2), "let exported = 1\nlet extra = 2");
    worker.refresh_and_wait(None);
    let (req, rx) = request(&b, StageTag::Typed);
    worker.start_request(RequestId(5), req);
    let Outcome::Success(_, _, RequestPayload::Typed(Some(payload))) = recv(&rx) else {
        panic!("expected a typed payload for the dependency");
    };
    assert!(payload.signature.contains("extra"));
}

#[test]
fn changed_bundles_are_published_once() {
    let published: Arc<Mutex<Vec<(Uri, ErrorBundle)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = published.clone();
    let worker = Worker::new(WorkerConfig {
        library_paths: Vec::new(),
        publish: Some(Arc::new(move |uri, bundle| {
            sink.lock().expect("publish log").push((uri.clone(), bundle.clone()));
        })),
    });

    let a = Uri::new("file:///proj/a.lm");
    worker.update_file(&a, Version(1), "let x = missing");
    worker.refresh_and_wait(None);
    assert_eq!(published.lock().expect("publish log").len(), 1);

    worker.refresh_and_wait(None);
    assert_eq!(published.lock().expect("publish log").len(), 1);

    worker.update_file(&a, Version(2), "let x = 1");
    worker.refresh_and_wait(None);
    let log = published.lock().expect("publish log");
    assert_eq!(log.len(), 2);
    assert!(log[1].1.is_empty());
}

#[test]
fn update_config_supplies_library_paths() {
    let lib = temp_dir("cfg");
    fs::write(lib.join("util.lm"), "let item = 1").expect("write library module");

    let worker = Worker::new(WorkerConfig::default());
    worker.update_config(&[lib.clone()]);

    let a = Uri::new("file:///proj/a.lm");
    worker.update_file(
        &a,
        Version(1),
        indoc! {r#"
            import "util" as u
            let v = u.item + 1
        "#},
    );
    worker.refresh_and_wait(None);

    let bundle = worker.error_bundle(&a).expect("bundle");
    assert!(bundle.is_empty(), "unexpected diagnostics: {bundle:?}");

    let _ = fs::remove_dir_all(&lib);
}

#[test]
fn stats_track_pass_lifecycle() {
    let worker = Worker::new(WorkerConfig::default());
    let a = Uri::new("file:///proj/a.lm");
    worker.update_file(&a, Version(1), "let x = 1");
    worker.refresh_and_wait(None);

    let stats = worker.stats();
    assert!(stats.passes_started >= 1);
    assert!(stats.passes_completed >= 1);
    assert!(stats.files_recompiled >= 1);
}

#[test]
fn touch_file_marks_disk_entries_dirty() {
    let dir = temp_dir("touchw");
    let path = dir.join("t.lm");
    fs::write(&path, "let t = 1").expect("write source");
    let uri = Uri::from_path(&path);

    let worker = Worker::new(WorkerConfig::default());
    worker.touch_file(&uri);
    worker.refresh_and_wait(Some(uri.clone()));
    let first = worker.stats().files_recompiled;
    assert_eq!(first, 1);

    // No disk change, no touch: the content hash short-circuits.
    worker.refresh_and_wait(Some(uri.clone()));
    assert_eq!(worker.stats().files_recompiled, first);

    let _ = fs::remove_dir_all(&dir);
}
