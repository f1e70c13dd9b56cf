use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use indoc::indoc;
use parking_lot::{Condvar, Mutex};

use crate::core::api::ResolveError;
use crate::core::names::NameAlloc;
use crate::core::types::Type;
use crate::services::worker::clock::Version;
use crate::services::worker::contents::FileContents;
use crate::services::worker::errors::ErrorBundle;
use crate::services::worker::pipeline::CompilePass;
use crate::services::worker::refresh::CancelToken;
use crate::services::worker::requests::RequestQueues;
use crate::services::worker::state::{FileState, FileStore, OpenedFileState, WorkingMark};
use crate::services::worker::uri::Uri;
use crate::services::worker::worker::{PublishFn, WorkerShared, WorkerState, WorkerStats};

fn shared_with_publish(publish: PublishFn) -> Arc<WorkerShared> {
    Arc::new(WorkerShared {
        state: Mutex::new(WorkerState {
            clock: crate::services::worker::clock::Clock::default(),
            contents: HashMap::new(),
            files: FileStore::default(),
            requests: RequestQueues::default(),
            refresh_cell: None,
            current_pass: None,
            active_passes: 0,
            dispatch_busy: false,
            library_paths: Vec::new(),
            shutdown: false,
            stats: WorkerStats::default(),
        }),
        refresh_cv: Condvar::new(),
        ready_cv: Condvar::new(),
        idle_cv: Condvar::new(),
        names: NameAlloc::new(),
        publish,
    })
}

fn test_shared() -> Arc<WorkerShared> {
    shared_with_publish(Arc::new(|_, _| {}))
}

fn open(shared: &Arc<WorkerShared>, uri: &Uri, version: i32, text: &str) {
    let mut state = shared.state.lock();
    state
        .contents
        .insert(uri.clone(), FileContents::opened(Version(version), text));
    state.clock = state.clock.tick();
}

fn close(shared: &Arc<WorkerShared>, uri: &Uri) {
    let mut state = shared.state.lock();
    state.contents.remove(uri);
    state.clock = state.clock.tick();
}

fn touch(shared: &Arc<WorkerShared>, uri: &Uri) {
    let mut state = shared.state.lock();
    match state.contents.get_mut(uri) {
        Some(FileContents::OnDisk { dirty }) => *dirty = true,
        Some(FileContents::Opened { .. }) => {}
        None => {
            state
                .contents
                .insert(uri.clone(), FileContents::OnDisk { dirty: true });
        }
    }
    state.clock = state.clock.tick();
}

/// Run one pass synchronously on the test thread.
fn run_pass(shared: &Arc<WorkerShared>) {
    run_pass_with(shared, None);
}

fn run_pass_with(shared: &Arc<WorkerShared>, priority: Option<Uri>) {
    let base = {
        let mut state = shared.state.lock();
        state.active_passes += 1;
        state.clock
    };
    CompilePass::new(shared.clone(), base, priority, CancelToken::new()).run();
}

fn opened(shared: &Arc<WorkerShared>, uri: &Uri) -> OpenedFileState {
    match shared.state.lock().files.get(uri) {
        Some(FileState::Opened(state)) => state.clone(),
        other => panic!("expected opened state for {uri}, found {other:?}"),
    }
}

fn recompiled(shared: &Arc<WorkerShared>) -> u64 {
    shared.state.lock().stats.files_recompiled
}

fn assert_dep_clock_invariant(shared: &Arc<WorkerShared>) {
    let state = shared.state.lock();
    for (uri, file) in state.files.iter() {
        for (dep_uri, _) in &file.common().deps {
            let dep = state
                .files
                .get(dep_uri)
                .unwrap_or_else(|| panic!("dependency {dep_uri} of {uri} has no state"));
            assert!(
                file.common().compile_clock >= dep.common().compile_clock,
                "{uri} compiled at {} before its dependency {dep_uri} at {}",
                file.common().compile_clock,
                dep.common().compile_clock,
            );
        }
    }
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

const IMPORTER: &str = indoc! {r#"
    import "./b" as b
    let use_it = b.exported + 1
"#};

#[test]
fn cross_file_types_flow_through_imports() {
    let shared = test_shared();
    let a = Uri::new("file:///proj/a.lm");
    let b = Uri::new("file:///proj/b.lm");
    open(&shared, &b, 1, "let exported = 1");
    open(&shared, &a, 1, IMPORTER);

    run_pass(&shared);

    let a_state = opened(&shared, &a);
    assert!(a_state.errors.is_empty(), "bundle: {:?}", a_state.errors);
    let (_, typed) = a_state.typed.latest().expect("typed artifact");
    assert_eq!(typed.env.lookup("use_it"), Some(&Type::Int));
    assert!(a_state.common.deps.contains_key(&b));
    assert_dep_clock_invariant(&shared);
}

#[test]
fn dependency_edit_recompiles_the_importer() {
    let shared = test_shared();
    let a = Uri::new("file:///proj/a.lm");
    let b = Uri::new("file:///proj/b.lm");
    open(&shared, &b, 1, "let exported = 1");
    open(&shared, &a, 1, IMPORTER);
    run_pass(&shared);
    assert_eq!(recompiled(&shared), 2);
    let a_name = opened(&shared, &a).common.name;

    open(&shared, &b, 2, "let exported = 1\nlet extra = 2");
    run_pass(&shared);

    // Both the edited file and its importer recompiled, nothing else.
    assert_eq!(recompiled(&shared), 4);
    let b_state = opened(&shared, &b);
    let (_, resolved) = b_state.resolved.latest().expect("resolved artifact");
    assert!(resolved.signature.contains("extra"));
    assert_eq!(opened(&shared, &a).common.name, a_name);
    assert_dep_clock_invariant(&shared);
}

#[test]
fn missing_import_reports_exactly_one_error() {
    let shared = test_shared();
    let a = Uri::new("file:///proj/a.lm");
    open(
        &shared,
        &a,
        1,
        indoc! {r#"
            import "c" as c
            let v = c.item
        "#},
    );

    run_pass(&shared);

    let a_state = opened(&shared, &a);
    assert!(matches!(
        a_state.errors.resolve.as_slice(),
        [ResolveError::ImportNotFound(path, _)] if path == "c"
    ));
    // Resolution never succeeded, so no stage artifact exists to serve.
    assert!(a_state.resolved.latest().is_none());
    assert!(a_state.typed.latest().is_none());
}

#[test]
fn mutual_imports_both_report_a_cycle() {
    let shared = test_shared();
    let x = Uri::new("file:///proj/x.lm");
    let y = Uri::new("file:///proj/y.lm");
    open(
        &shared,
        &x,
        1,
        indoc! {r#"
            import "./y" as y
            let a = 1
        "#},
    );
    open(
        &shared,
        &y,
        1,
        indoc! {r#"
            import "./x" as x
            let b = 2
        "#},
    );

    run_pass(&shared);

    let base = shared.state.lock().clock;
    for uri in [&x, &y] {
        let state = opened(&shared, uri);
        assert!(
            state
                .errors
                .resolve
                .iter()
                .any(|error| matches!(error, ResolveError::ImportCycle(_))),
            "{uri} bundle lacks a cycle error: {:?}",
            state.errors
        );
        assert_eq!(state.common.mark, WorkingMark::Done(base));
    }
}

#[test]
fn unchanged_cycle_refresh_is_idempotent() {
    let shared = test_shared();
    let x = Uri::new("file:///proj/x.lm");
    let y = Uri::new("file:///proj/y.lm");
    open(
        &shared,
        &x,
        1,
        indoc! {r#"
            import "./y" as y
            let a = 1
        "#},
    );
    open(
        &shared,
        &y,
        1,
        indoc! {r#"
            import "./x" as x
            let b = 2
        "#},
    );
    run_pass(&shared);

    let before_x = opened(&shared, &x);
    let before_y = opened(&shared, &y);
    let before_recompiles = recompiled(&shared);

    // No edits in between: the cyclic back-edge must not re-enter the
    // mid-visit partner, and nothing may recompile.
    run_pass(&shared);

    assert_eq!(recompiled(&shared), before_recompiles);
    let base = shared.state.lock().clock;
    for (uri, before) in [(&x, before_x), (&y, before_y)] {
        let after = opened(&shared, uri);
        assert_eq!(after.common.mark, WorkingMark::Done(base));
        assert_eq!(after.common.compile_clock, before.common.compile_clock);
        assert_eq!(after.errors, before.errors);
        assert_eq!(
            after.parsed.latest().map(|(version, _)| version),
            before.parsed.latest().map(|(version, _)| version)
        );
        assert!(after.resolved.latest().is_none());
        assert!(
            after
                .errors
                .resolve
                .iter()
                .any(|error| matches!(error, ResolveError::ImportCycle(_))),
            "{uri} lost its cycle error: {:?}",
            after.errors
        );
    }
}

#[test]
fn unchanged_refresh_recompiles_nothing() {
    let shared = test_shared();
    let a = Uri::new("file:///proj/a.lm");
    let b = Uri::new("file:///proj/b.lm");
    open(&shared, &b, 1, "let exported = 1");
    open(&shared, &a, 1, IMPORTER);
    run_pass(&shared);

    let before_a = opened(&shared, &a);
    let before_recompiles = recompiled(&shared);

    run_pass(&shared);

    let after_a = opened(&shared, &a);
    assert_eq!(recompiled(&shared), before_recompiles);
    assert_eq!(after_a.common.compile_clock, before_a.common.compile_clock);
    assert_eq!(
        after_a.resolved.latest().map(|(version, _)| version),
        before_a.resolved.latest().map(|(version, _)| version)
    );
    assert_eq!(after_a.errors, before_a.errors);
}

#[test]
fn touch_with_unchanged_bytes_recompiles_once() {
    let dir = temp_dir("touch");
    let path = dir.join("d.lm");
    fs::write(&path, "let value = 1").expect("write source");
    let uri = Uri::from_path(&path);

    let shared = test_shared();
    run_pass_with(&shared, Some(uri.clone()));
    assert_eq!(recompiled(&shared), 1);

    // Two touches, one refresh: exactly one more recompile.
    touch(&shared, &uri);
    touch(&shared, &uri);
    run_pass_with(&shared, Some(uri.clone()));
    assert_eq!(recompiled(&shared), 2);

    // Dirty was cleared by the successful parse; an untouched refresh now
    // short-circuits on the content hash.
    run_pass_with(&shared, Some(uri.clone()));
    assert_eq!(recompiled(&shared), 2);
    {
        let state = shared.state.lock();
        assert!(matches!(
            state.contents.get(&uri),
            Some(FileContents::OnDisk { dirty: false })
        ));
    }

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn vanished_dependency_is_destroyed_and_reported() {
    let dir = temp_dir("vanish");
    let dep_path = dir.join("dep.lm");
    fs::write(&dep_path, "let gone = 1").expect("write dep");
    let dep_uri = Uri::from_path(&dep_path);

    let shared = test_shared();
    let a = Uri::from_path(&dir.join("a.lm"));
    open(
        &shared,
        &a,
        1,
        indoc! {r#"
            import "./dep" as dep
            let v = dep.gone
        "#},
    );
    run_pass(&shared);
    assert!(shared.state.lock().files.get(&dep_uri).is_some());
    assert!(opened(&shared, &a).errors.is_empty());

    fs::remove_file(&dep_path).expect("delete dep");
    run_pass(&shared);

    assert!(shared.state.lock().files.get(&dep_uri).is_none());
    let a_state = opened(&shared, &a);
    assert!(matches!(
        a_state.errors.resolve.as_slice(),
        [ResolveError::ImportNotFound(path, _)] if path == "./dep"
    ));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn close_file_demotes_to_disk_state() {
    let dir = temp_dir("demote");
    let path = dir.join("w.lm");
    fs::write(&path, "let w = 1").expect("write source");
    let uri = Uri::from_path(&path);

    let shared = test_shared();
    open(&shared, &uri, 1, "let w = 1");
    run_pass(&shared);
    let name = opened(&shared, &uri).common.name;

    close(&shared, &uri);
    run_pass_with(&shared, Some(uri.clone()));

    let state = shared.state.lock();
    let Some(FileState::Disk(disk)) = state.files.get(&uri) else {
        panic!("expected disk state after demotion");
    };
    assert_eq!(disk.common.name, name);
    assert!(disk.resolve_sig.as_ref().is_some_and(|sig| sig.contains("w")));
    assert!(disk.type_env.is_some());

    drop(state);
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn parse_failure_retains_prior_artifacts() {
    let shared = test_shared();
    let a = Uri::new("file:///proj/a.lm");
    open(&shared, &a, 1, "let x = 1");
    run_pass(&shared);
    assert_eq!(
        opened(&shared, &a).resolved.latest().map(|(v, _)| v),
        Some(Version(1))
    );

    open(&shared, &a, 2, "let x =");
    run_pass(&shared);

    let state = opened(&shared, &a);
    assert_eq!(state.last_parsed_version, Some(Version(2)));
    assert!(state.parsed.current_at(Version(2)).is_none());
    assert_eq!(state.parsed.latest().map(|(v, _)| v), Some(Version(1)));
    assert_eq!(state.resolved.latest().map(|(v, _)| v), Some(Version(1)));
    assert!(!state.errors.parse.is_empty());
    let base = shared.state.lock().clock;
    assert_eq!(state.common.mark, WorkingMark::Done(base));
    assert_eq!(state.common.compile_clock, base);
}

#[test]
fn publication_happens_only_when_the_bundle_changes() {
    let published: Arc<Mutex<Vec<(Uri, ErrorBundle)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = published.clone();
    let shared = shared_with_publish(Arc::new(move |uri, bundle| {
        sink.lock().push((uri.clone(), bundle.clone()));
    }));

    let a = Uri::new("file:///proj/a.lm");
    open(&shared, &a, 1, "let x = missing");
    run_pass(&shared);
    assert_eq!(published.lock().len(), 1);
    assert!(!published.lock()[0].1.is_empty());

    // Nothing changed: no republication.
    run_pass(&shared);
    assert_eq!(published.lock().len(), 1);

    open(&shared, &a, 2, "let x = 1");
    run_pass(&shared);
    let log = published.lock();
    assert_eq!(log.len(), 2);
    assert!(log[1].1.is_empty());
}

#[test]
fn priority_uri_is_visited_even_when_unopened() {
    let dir = temp_dir("priority");
    let path = dir.join("p.lm");
    fs::write(&path, "let p = 1").expect("write source");
    let uri = Uri::from_path(&path);

    let shared = test_shared();
    run_pass_with(&shared, Some(uri.clone()));

    let state = shared.state.lock();
    assert!(matches!(state.files.get(&uri), Some(FileState::Disk(_))));

    drop(state);
    let _ = fs::remove_dir_all(&dir);
}
