//! Client requests waiting on file state.
//!
//! A request names a file, a stage, and two sinks. It sits in the pending
//! store until the file's state reaches a matching version, moves to the
//! ready store, and is executed by the dispatcher thread in request-id
//! order. Re-checking at dispatch time closes the window between enqueue
//! and execution.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use tracing::debug;

use crate::core::names::ModuleName;
use crate::core::tree::parsed::Module;
use crate::core::tree::resolved::ResolvedModule;
use crate::core::tree::typed::TypedModule;
use crate::core::types::{ModuleSignature, TypeEnv};
use crate::services::worker::clock::Version;
use crate::services::worker::errors::{ErrorBundle, RequestError};
use crate::services::worker::state::{FileState, WorkingMark};
use crate::services::worker::uri::Uri;
use crate::services::worker::worker::{WorkerShared, WorkerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl Display for RequestId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageTag {
    Parsed,
    Resolved,
    Typed,
    Errors,
}

#[derive(Debug, Clone)]
pub struct TypedPayload {
    pub signature: ModuleSignature,
    pub resolved: Arc<ResolvedModule>,
    pub env: TypeEnv,
    pub typed: Arc<TypedModule>,
}

/// Stage-specific request payload. `None` means the stage was reached for
/// the current version but produced nothing; diagnostics travel separately
/// through the error bundle.
#[derive(Debug, Clone)]
pub enum RequestPayload {
    Parsed(Option<Arc<Module>>),
    Resolved(Option<(ModuleSignature, Arc<ResolvedModule>)>),
    Typed(Option<TypedPayload>),
    Errors(ErrorBundle),
}

pub type SuccessSink = Box<dyn FnOnce(ModuleName, Version, RequestPayload) + Send>;
pub type ErrorSink = Box<dyn FnOnce(RequestError) + Send>;

pub struct Request {
    pub uri: Uri,
    pub stage: StageTag,
    pub on_success: SuccessSink,
    pub on_error: ErrorSink,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("uri", &self.uri)
            .field("stage", &self.stage)
            .finish_non_exhaustive()
    }
}

/// Outcome of probing a request against the current snapshot.
pub enum Satisfiability {
    /// The target has no open content; deliverable as an error.
    NotOpen,
    /// Not satisfiable yet; keep waiting.
    NotYet,
    Ready(ModuleName, Version, RequestPayload),
}

/// Pending requests indexed by id and by target URI, plus the id-ordered
/// ready store the dispatcher drains.
#[derive(Debug, Default)]
pub struct RequestQueues {
    pending: HashMap<RequestId, Request>,
    pending_by_uri: HashMap<Uri, BTreeSet<RequestId>>,
    ready: BTreeMap<RequestId, Request>,
}

impl RequestQueues {
    pub fn insert_pending(&mut self, id: RequestId, request: Request) {
        self.pending_by_uri
            .entry(request.uri.clone())
            .or_default()
            .insert(id);
        self.pending.insert(id, request);
    }

    pub fn insert_ready(&mut self, id: RequestId, request: Request) {
        self.ready.insert(id, request);
    }

    pub fn cancel(&mut self, id: RequestId) -> bool {
        let mut removed = self.ready.remove(&id).is_some();
        if let Some(request) = self.pending.remove(&id) {
            removed = true;
            if let Some(ids) = self.pending_by_uri.get_mut(&request.uri) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.pending_by_uri.remove(&request.uri);
                }
            }
        }
        removed
    }

    pub fn pop_ready(&mut self) -> Option<(RequestId, Request)> {
        let id = *self.ready.keys().next()?;
        let request = self.ready.remove(&id)?;
        Some((id, request))
    }

    pub fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    pub fn pending_ids_for(&self, uri: &Uri) -> Vec<RequestId> {
        self.pending_by_uri
            .get(uri)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn pending_uris(&self) -> Vec<Uri> {
        self.pending_by_uri.keys().cloned().collect()
    }

    pub fn take_pending(&mut self, id: RequestId) -> Option<Request> {
        let request = self.pending.remove(&id)?;
        if let Some(ids) = self.pending_by_uri.get_mut(&request.uri) {
            ids.remove(&id);
            if ids.is_empty() {
                self.pending_by_uri.remove(&request.uri);
            }
        }
        Some(request)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Probe one request against the current content and file-state snapshot.
pub(crate) fn try_satisfy(state: &WorkerState, request: &Request) -> Satisfiability {
    let Some(contents) = state.contents.get(&request.uri) else {
        return Satisfiability::NotOpen;
    };
    let Some(open_version) = contents.open_version() else {
        return Satisfiability::NotOpen;
    };
    let Some(file) = state.files.get(&request.uri) else {
        // Opened but never compiled; the next pass will create the state.
        return Satisfiability::NotYet;
    };
    let FileState::Opened(opened) = file else {
        return Satisfiability::NotYet;
    };

    let name = opened.common.name;
    match request.stage {
        StageTag::Parsed => {
            if let Some(tree) = opened.parsed.current_at(open_version) {
                Satisfiability::Ready(
                    name,
                    open_version,
                    RequestPayload::Parsed(Some(tree.clone())),
                )
            } else if opened.last_parsed_version == Some(open_version) {
                // Parsing was attempted at this version and produced no tree.
                Satisfiability::Ready(name, open_version, RequestPayload::Parsed(None))
            } else {
                Satisfiability::NotYet
            }
        }
        StageTag::Resolved => {
            if opened.common.mark != WorkingMark::Done(state.clock) {
                return Satisfiability::NotYet;
            }
            let payload = opened
                .resolved
                .current_at(open_version)
                .map(|artifact| (artifact.signature.clone(), artifact.module.clone()));
            Satisfiability::Ready(name, open_version, RequestPayload::Resolved(payload))
        }
        StageTag::Typed => {
            if opened.common.mark != WorkingMark::Done(state.clock) {
                return Satisfiability::NotYet;
            }
            let payload = match (
                opened.resolved.current_at(open_version),
                opened.typed.current_at(open_version),
            ) {
                (Some(resolved), Some(typed)) => Some(TypedPayload {
                    signature: resolved.signature.clone(),
                    resolved: resolved.module.clone(),
                    env: typed.env.clone(),
                    typed: typed.clone(),
                }),
                _ => None,
            };
            Satisfiability::Ready(name, open_version, RequestPayload::Typed(payload))
        }
        StageTag::Errors => {
            if opened.common.mark != WorkingMark::Done(state.clock) {
                return Satisfiability::NotYet;
            }
            Satisfiability::Ready(
                name,
                open_version,
                RequestPayload::Errors(opened.errors.clone()),
            )
        }
    }
}

/// Move every pending request for `uri` that became satisfiable (or
/// deliverable as not-open) into the ready store. Called with the state
/// lock held, right after a per-file commit.
pub(crate) fn queue_requests(state: &mut WorkerState, uri: &Uri) -> usize {
    let mut moved = 0;
    for id in state.requests.pending_ids_for(uri) {
        let Some(request) = state.requests.take_pending(id) else {
            continue;
        };
        match try_satisfy(state, &request) {
            Satisfiability::Ready(_, _, _) | Satisfiability::NotOpen => {
                state.requests.insert_ready(id, request);
                moved += 1;
            }
            Satisfiability::NotYet => {
                state.requests.insert_pending(id, request);
            }
        }
    }
    moved
}

/// Dispatcher thread body: drain the ready store in id order, re-checking
/// each request against current state before running its sink.
pub(crate) fn dispatch_loop(shared: Arc<WorkerShared>) {
    loop {
        let mut state = shared.state.lock();
        while !state.requests.has_ready() && !state.shutdown {
            shared.ready_cv.wait(&mut state);
        }
        if state.shutdown {
            return;
        }
        let Some((id, request)) = state.requests.pop_ready() else {
            continue;
        };

        match try_satisfy(&state, &request) {
            Satisfiability::Ready(name, version, payload) => {
                state.dispatch_busy = true;
                state.stats.requests_dispatched += 1;
                drop(state);
                debug!(%id, uri = %request.uri, "dispatching request");
                (request.on_success)(name, version, payload);
                let mut state = shared.state.lock();
                state.dispatch_busy = false;
                shared.idle_cv.notify_all();
            }
            Satisfiability::NotOpen => {
                state.dispatch_busy = true;
                drop(state);
                let uri = request.uri.clone();
                (request.on_error)(RequestError::FileNotOpen(uri));
                let mut state = shared.state.lock();
                state.dispatch_busy = false;
                shared.idle_cv.notify_all();
            }
            Satisfiability::NotYet => {
                // State moved backwards between enqueue and dequeue; the
                // request goes back to waiting.
                state.requests.insert_pending(id, request);
                shared.idle_cv.notify_all();
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/worker/t_requests.rs"]
mod tests;
