//! Worker facade and shared state.
//!
//! Every facade operation is one lock scope over [`WorkerState`]: observers
//! see either the pre- or the post-state of a call, never a mix. The facade
//! writes only contents, clock, trigger and request maps; file states are
//! written exclusively by compile passes.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::core::names::{ModuleName, NameAlloc};
use crate::services::worker::clock::{Clock, Version};
use crate::services::worker::contents::FileContents;
use crate::services::worker::errors::ErrorBundle;
use crate::services::worker::paths;
use crate::services::worker::refresh::{self, CancelToken};
use crate::services::worker::requests::{
    self, Request, RequestId, RequestQueues, Satisfiability, try_satisfy,
};
use crate::services::worker::state::FileStore;
use crate::services::worker::uri::Uri;

pub type PublishFn = Arc<dyn Fn(&Uri, &ErrorBundle) + Send + Sync>;

#[derive(Default)]
pub struct WorkerConfig {
    /// Extra library-path prefixes, searched before the environment's.
    pub library_paths: Vec<PathBuf>,
    /// Diagnostics push callback; invoked when a compile changes a bundle.
    pub publish: Option<PublishFn>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub passes_started: u64,
    pub passes_completed: u64,
    pub passes_cancelled: u64,
    pub files_recompiled: u64,
    pub requests_dispatched: u64,
}

pub(crate) struct WorkerState {
    pub clock: Clock,
    pub contents: HashMap<Uri, FileContents>,
    pub files: FileStore,
    pub requests: RequestQueues,
    /// Refresh trigger cell: `Some` when a refresh is wanted; the inner
    /// option is the surviving priority URI.
    pub refresh_cell: Option<Option<Uri>>,
    pub current_pass: Option<CancelToken>,
    pub active_passes: usize,
    pub dispatch_busy: bool,
    pub library_paths: Vec<PathBuf>,
    pub shutdown: bool,
    pub stats: WorkerStats,
}

pub(crate) struct WorkerShared {
    pub state: Mutex<WorkerState>,
    pub refresh_cv: Condvar,
    pub ready_cv: Condvar,
    pub idle_cv: Condvar,
    pub names: NameAlloc,
    pub publish: PublishFn,
}

impl WorkerShared {
    pub fn is_quiescent(state: &WorkerState) -> bool {
        state.refresh_cell.is_none()
            && state.active_passes == 0
            && !state.requests.has_ready()
            && !state.dispatch_busy
    }
}

pub struct Worker {
    shared: Arc<WorkerShared>,
    refresh_handle: Option<JoinHandle<()>>,
    dispatch_handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn new(config: WorkerConfig) -> Worker {
        let publish: PublishFn = config.publish.unwrap_or_else(|| Arc::new(|_, _| {}));
        let shared = Arc::new(WorkerShared {
            state: Mutex::new(WorkerState {
                clock: Clock::default(),
                contents: HashMap::new(),
                files: FileStore::default(),
                requests: RequestQueues::default(),
                refresh_cell: None,
                current_pass: None,
                active_passes: 0,
                dispatch_busy: false,
                library_paths: paths::library_paths(&config.library_paths),
                shutdown: false,
                stats: WorkerStats::default(),
            }),
            refresh_cv: Condvar::new(),
            ready_cv: Condvar::new(),
            idle_cv: Condvar::new(),
            names: NameAlloc::new(),
            publish,
        });

        let refresh_handle = spawn_named("lumen-refresh", {
            let shared = shared.clone();
            move || refresh::refresh_loop(shared)
        });
        let dispatch_handle = spawn_named("lumen-dispatch", {
            let shared = shared.clone();
            move || requests::dispatch_loop(shared)
        });

        Worker {
            shared,
            refresh_handle,
            dispatch_handle,
        }
    }

    /// Replace a file's contents with editor text at the given version.
    pub fn update_file(&self, uri: &Uri, version: Version, text: &str) {
        let mut state = self.shared.state.lock();
        state
            .contents
            .insert(uri.clone(), FileContents::opened(version, text));
        state.clock = state.clock.tick();
        debug!(%uri, %version, clock = %state.clock, "update_file");
    }

    /// Note that a file changed on disk outside the editor.
    pub fn touch_file(&self, uri: &Uri) {
        let mut state = self.shared.state.lock();
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
        debug!(%uri, clock = %state.clock, "touch_file");
    }

    /// Remove a file's editor contents; the file reverts to disk truth.
    pub fn close_file(&self, uri: &Uri) {
        let mut state = self.shared.state.lock();
        state.contents.remove(uri);
        state.clock = state.clock.tick();
        debug!(%uri, clock = %state.clock, "close_file");
    }

    /// URI owning a compiler-internal name, if any file state carries it.
    pub fn find_file(&self, name: ModuleName) -> Option<Uri> {
        self.shared.state.lock().files.uri_of(name).cloned()
    }

    /// Signal the refresh scheduler. A pending priority survives unless a
    /// newer non-null priority replaces it.
    pub fn refresh(&self, priority: Option<Uri>) {
        let mut state = self.shared.state.lock();
        let previous = state.refresh_cell.take().flatten();
        state.refresh_cell = Some(priority.or(previous));
        self.shared.refresh_cv.notify_one();
    }

    /// Recompute the library-path list from new extras plus discovery.
    pub fn update_config(&self, extra: &[PathBuf]) {
        let mut state = self.shared.state.lock();
        state.library_paths = paths::library_paths(extra);
        debug!(paths = state.library_paths.len(), "update_config");
    }

    pub fn start_request(&self, id: RequestId, request: Request) {
        let mut state = self.shared.state.lock();
        match try_satisfy(&state, &request) {
            Satisfiability::Ready(_, _, _) => {
                state.requests.insert_ready(id, request);
                self.shared.ready_cv.notify_one();
            }
            Satisfiability::NotOpen | Satisfiability::NotYet => {
                state.requests.insert_pending(id, request);
            }
        }
    }

    /// Remove a request from both stores. An execution already in flight on
    /// the dispatcher is not interrupted.
    pub fn cancel_request(&self, id: RequestId) -> bool {
        self.shared.state.lock().requests.cancel(id)
    }

    pub fn stats(&self) -> WorkerStats {
        self.shared.state.lock().stats
    }

    pub fn clock(&self) -> Clock {
        self.shared.state.lock().clock
    }

    /// Block until no refresh is pending, no pass is running, and the
    /// dispatcher has drained the ready store.
    pub fn wait_quiescent(&self) {
        let mut state = self.shared.state.lock();
        while !WorkerShared::is_quiescent(&state) {
            self.shared.idle_cv.wait(&mut state);
        }
    }

    /// Convenience for batch consumers: signal and wait out the pass.
    pub fn refresh_and_wait(&self, priority: Option<Uri>) {
        self.refresh(priority);
        self.wait_quiescent();
    }

    /// Error bundle last committed for an opened file.
    pub fn error_bundle(&self, uri: &Uri) -> Option<ErrorBundle> {
        let state = self.shared.state.lock();
        match state.files.get(uri) {
            Some(crate::services::worker::state::FileState::Opened(opened)) => {
                Some(opened.errors.clone())
            }
            _ => None,
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            if let Some(token) = state.current_pass.take() {
                token.cancel();
            }
            self.shared.refresh_cv.notify_all();
            self.shared.ready_cv.notify_all();
            self.shared.idle_cv.notify_all();
        }
        for handle in [self.refresh_handle.take(), self.dispatch_handle.take()]
            .into_iter()
            .flatten()
        {
            let _ = handle.join();
        }
    }
}

/// Spawn a labelled thread; the label shows up in panics and telemetry.
pub(crate) fn spawn_named<F>(name: &str, f: F) -> Option<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    match std::thread::Builder::new().name(name.to_string()).spawn(f) {
        Ok(handle) => Some(handle),
        Err(error) => {
            warn!(name, %error, "failed to spawn worker thread");
            None
        }
    }
}

#[cfg(test)]
#[path = "../../tests/worker/t_worker.rs"]
mod tests;
