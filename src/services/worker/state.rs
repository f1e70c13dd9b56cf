//! Per-file compilation state.
//!
//! The worker keeps one `FileState` per known file, shaped by whether the
//! file is open in an editor. Opened files carry versioned stage artifacts
//! so a broken edit never destroys the last good result; disk files carry
//! the single most recent result plus the content hash that produced it.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::core::diag::Span;
use crate::core::names::ModuleName;
use crate::core::tree::parsed::Module;
use crate::core::tree::resolved::ResolvedModule;
use crate::core::tree::typed::TypedModule;
use crate::core::types::{ModuleSignature, TypeEnv};
use crate::services::worker::clock::{Clock, Version};
use crate::services::worker::errors::ErrorBundle;
use crate::services::worker::uri::Uri;

/// Why a file is (or last was) being visited by a compile pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkingMark {
    /// The visit that started at this clock completed.
    Done(Clock),
    /// Currently visited as a refresh root.
    WorkingRoot,
    /// Currently visited on behalf of an importer; the span is the import
    /// expression inside the importer.
    WorkingDep { importer: Uri, span: Span },
}

impl WorkingMark {
    pub fn is_done(&self) -> bool {
        matches!(self, WorkingMark::Done(_))
    }

    pub fn done_at(&self) -> Option<Clock> {
        match self {
            WorkingMark::Done(clock) => Some(*clock),
            _ => None,
        }
    }
}

/// The most recent version at which a stage succeeded, kept across later
/// failures so stale-but-consistent data can still be served.
#[derive(Debug, Clone)]
pub struct VersionedArtifact<T> {
    slot: Option<(Version, T)>,
}

impl<T> Default for VersionedArtifact<T> {
    fn default() -> Self {
        Self { slot: None }
    }
}

impl<T> VersionedArtifact<T> {
    /// The one predicate callers need: the payload, exactly when it was
    /// produced from the text at `version`.
    pub fn current_at(&self, version: Version) -> Option<&T> {
        match &self.slot {
            Some((at, payload)) if *at == version => Some(payload),
            _ => None,
        }
    }

    pub fn latest(&self) -> Option<(Version, &T)> {
        self.slot.as_ref().map(|(version, payload)| (*version, payload))
    }

    /// A newer success replaces; a failure never reaches this method.
    pub fn record(&mut self, version: Version, payload: T) {
        self.slot = Some((version, payload));
    }
}

/// Fields common to both file-state shapes.
#[derive(Debug, Clone)]
pub struct FileCommon {
    pub name: ModuleName,
    pub mark: WorkingMark,
    pub compile_clock: Clock,
    pub check_clock: Clock,
    /// Import edges captured at the last compile: target URI to the span of
    /// the import expression. Iteration order is the source order.
    pub deps: IndexMap<Uri, Span>,
}

impl FileCommon {
    pub fn new(name: ModuleName) -> Self {
        Self {
            name,
            mark: WorkingMark::WorkingRoot,
            compile_clock: Clock::default(),
            check_clock: Clock::default(),
            deps: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedArtifact {
    pub module: Arc<ResolvedModule>,
    pub signature: ModuleSignature,
}

#[derive(Debug, Clone)]
pub struct OpenedFileState {
    pub common: FileCommon,
    /// Version whose text was last handed to the parser, whether or not a
    /// tree came back.
    pub last_parsed_version: Option<Version>,
    pub parsed: VersionedArtifact<Arc<Module>>,
    pub resolved: VersionedArtifact<ResolvedArtifact>,
    pub typed: VersionedArtifact<Arc<TypedModule>>,
    pub errors: ErrorBundle,
}

impl OpenedFileState {
    pub fn new(name: ModuleName) -> Self {
        Self {
            common: FileCommon::new(name),
            last_parsed_version: None,
            parsed: VersionedArtifact::default(),
            resolved: VersionedArtifact::default(),
            typed: VersionedArtifact::default(),
            errors: ErrorBundle::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiskFileState {
    pub common: FileCommon,
    /// SHA-256 of the bytes last parsed; short-circuits an unchanged reread.
    pub disk_hash: Option<[u8; 32]>,
    pub parsed: Option<Arc<Module>>,
    pub resolve_sig: Option<ModuleSignature>,
    pub type_env: Option<TypeEnv>,
}

impl DiskFileState {
    pub fn new(name: ModuleName) -> Self {
        Self {
            common: FileCommon::new(name),
            disk_hash: None,
            parsed: None,
            resolve_sig: None,
            type_env: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum FileState {
    Opened(OpenedFileState),
    Disk(DiskFileState),
}

impl FileState {
    pub fn common(&self) -> &FileCommon {
        match self {
            FileState::Opened(state) => &state.common,
            FileState::Disk(state) => &state.common,
        }
    }

    pub fn common_mut(&mut self) -> &mut FileCommon {
        match self {
            FileState::Opened(state) => &mut state.common,
            FileState::Disk(state) => &mut state.common,
        }
    }

    pub fn name(&self) -> ModuleName {
        self.common().name
    }

    pub fn mark(&self) -> &WorkingMark {
        &self.common().mark
    }

    /// Latest export signature either shape can offer an importer.
    pub fn signature(&self) -> Option<ModuleSignature> {
        match self {
            FileState::Opened(state) => state
                .resolved
                .latest()
                .map(|(_, artifact)| artifact.signature.clone()),
            FileState::Disk(state) => state.resolve_sig.clone(),
        }
    }

    /// Latest export type environment either shape can offer an importer.
    pub fn type_env(&self) -> Option<TypeEnv> {
        match self {
            FileState::Opened(state) => state.typed.latest().map(|(_, typed)| typed.env.clone()),
            FileState::Disk(state) => state.type_env.clone(),
        }
    }
}

/// All file states plus the inverse index from internal name to URI.
///
/// The index is maintained by construction: every insert and remove goes
/// through here, so `by_name` is always exactly the inverse of `name` over
/// the present states.
#[derive(Debug, Default)]
pub struct FileStore {
    files: HashMap<Uri, FileState>,
    by_name: HashMap<ModuleName, Uri>,
}

impl FileStore {
    pub fn get(&self, uri: &Uri) -> Option<&FileState> {
        self.files.get(uri)
    }

    pub fn get_mut(&mut self, uri: &Uri) -> Option<&mut FileState> {
        self.files.get_mut(uri)
    }

    pub fn insert(&mut self, uri: Uri, state: FileState) {
        let new_name = state.name();
        if let Some(old) = self.files.insert(uri.clone(), state) {
            let old_name = old.name();
            if old_name != new_name {
                self.by_name.remove(&old_name);
            }
        }
        self.by_name.insert(new_name, uri);
    }

    pub fn remove(&mut self, uri: &Uri) -> Option<FileState> {
        let state = self.files.remove(uri)?;
        self.by_name.remove(&state.name());
        Some(state)
    }

    pub fn uri_of(&self, name: ModuleName) -> Option<&Uri> {
        self.by_name.get(&name)
    }

    pub fn uris(&self) -> impl Iterator<Item = &Uri> {
        self.files.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Uri, &FileState)> {
        self.files.iter()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
#[path = "../../tests/worker/t_state.rs"]
mod tests;
