//! The compile pass.
//!
//! One pass visits each relevant file at most once, stamped with the clock
//! it started from. Per-file work is committed as it completes, so killing
//! a pass at any point loses only the tail. The pass is the single writer
//! of file-state artifact fields; facade operations never touch them.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::core::api::{
    Builtins, ImportEnv, ParseError, ResolveError, TypeError, VerifyError, desugar_program,
    infer_program, parse_tops, resolve_program, verify_program,
};
use crate::core::diag::Span;
use crate::core::names::ModuleName;
use crate::core::tree::parsed::Module;
use crate::core::types::{ModuleSignature, TypeEnv};
use crate::services::worker::clock::{Clock, Version};
use crate::services::worker::contents::FileContents;
use crate::services::worker::errors::ErrorBundle;
use crate::services::worker::imports::ImportAdapter;
use crate::services::worker::refresh::CancelToken;
use crate::services::worker::requests::queue_requests;
use crate::services::worker::state::{
    DiskFileState, FileState, OpenedFileState, ResolvedArtifact, WorkingMark,
};
use crate::services::worker::uri::Uri;
use crate::services::worker::worker::WorkerShared;

/// The pass observed its cancellation token; whatever was committed stays.
pub(crate) struct PassCancelled;

/// What an importer learns from loading a dependency.
#[derive(Debug, Clone)]
pub(crate) struct LoadedFacts {
    pub name: ModuleName,
    pub compile_clock: Clock,
    /// Exports as of this visit; `None` when the file is currently broken.
    pub signature: Option<ModuleSignature>,
    pub type_env: Option<TypeEnv>,
    /// In-progress files this file's imports looped back into.
    pub cycle_with: Vec<Uri>,
}

pub(crate) struct CompilePass {
    shared: Arc<WorkerShared>,
    base_clock: Clock,
    priority: Option<Uri>,
    cancel: CancelToken,
    /// Files whose working mark this pass committed and not yet completed.
    visiting: HashSet<Uri>,
    /// Files this pass finished; `None` records a deletion.
    done: HashMap<Uri, Option<LoadedFacts>>,
}

/// Outputs of the resolve/desugar/infer/verify stages for one file.
struct StageResult {
    deps: IndexMap<Uri, Span>,
    resolved: Option<crate::core::api::ResolveResult>,
    resolve_errors: Vec<ResolveError>,
    typed: Option<Arc<crate::core::tree::typed::TypedModule>>,
    type_errors: Vec<TypeError>,
    verify_errors: Vec<VerifyError>,
    cycle_with: Vec<Uri>,
}

enum SourceKind {
    Editor { version: Version, text: String },
    Disk { dirty: bool },
}

impl CompilePass {
    pub fn new(
        shared: Arc<WorkerShared>,
        base_clock: Clock,
        priority: Option<Uri>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            shared,
            base_clock,
            priority,
            cancel,
            visiting: HashSet::new(),
            done: HashMap::new(),
        }
    }

    pub fn run(mut self) {
        // An internal invariant violation panics the task; the worker
        // itself stays up and the next trigger starts a fresh pass.
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| self.run_inner()));
        let mut state = self.shared.state.lock();
        state.active_passes -= 1;
        self.cancel.mark_finished();
        match outcome {
            Ok(Ok(())) => {
                state.stats.passes_completed += 1;
                debug!(base = %self.base_clock, "compile pass completed");
            }
            Ok(Err(PassCancelled)) => {
                debug!(base = %self.base_clock, "compile pass cancelled");
            }
            Err(_) => {
                warn!(base = %self.base_clock, "compile pass panicked");
            }
        }
        self.shared.idle_cv.notify_all();
    }

    fn run_inner(&mut self) -> Result<(), PassCancelled> {
        if let Some(priority) = self.priority.take() {
            self.load_file(&priority, None)?;
        }

        let opened: Vec<Uri> = {
            let state = self.shared.state.lock();
            state
                .contents
                .iter()
                .filter(|(_, contents)| contents.is_opened())
                .map(|(uri, _)| uri.clone())
                .collect()
        };
        for uri in opened {
            self.load_file(&uri, None)?;
        }

        // Requests whose target the pass never visited still need an
        // answer; in particular a closed file's pendings become
        // deliverable "not open" errors now.
        let mut state = self.shared.state.lock();
        self.check_cancelled()?;
        let mut moved = 0;
        for uri in state.requests.pending_uris() {
            moved += queue_requests(&mut state, &uri);
        }
        if moved > 0 {
            self.shared.ready_cv.notify_one();
        }
        Ok(())
    }

    /// Visit one file: reparse if its text changed, recompile if it or any
    /// dependency moved, commit, and wake matching requests. Returns what
    /// an importer needs to know, or `None` when the file is gone.
    pub(crate) fn load_file(
        &mut self,
        uri: &Uri,
        importer: Option<(Uri, Span)>,
    ) -> Result<Option<LoadedFacts>, PassCancelled> {
        self.check_cancelled()?;
        if let Some(facts) = self.done.get(uri) {
            return Ok(facts.clone());
        }
        debug_assert!(
            !self.visiting.contains(uri),
            "import cycles must be broken before re-entry"
        );

        let (contents, old_state) = {
            let state = self.shared.state.lock();
            (
                state.contents.get(uri).cloned(),
                state.files.get(uri).cloned(),
            )
        };
        let source = match &contents {
            Some(FileContents::Opened { version, text }) => SourceKind::Editor {
                version: *version,
                text: text.to_string(),
            },
            Some(FileContents::OnDisk { dirty }) => SourceKind::Disk { dirty: *dirty },
            None => SourceKind::Disk { dirty: false },
        };

        let old_mark_done = old_state
            .as_ref()
            .map(|state| state.mark().is_done())
            .unwrap_or(true);
        let old_deps: IndexMap<Uri, Span> = old_state
            .as_ref()
            .map(|state| state.common().deps.clone())
            .unwrap_or_default();
        let old_compile_clock = old_state
            .as_ref()
            .map(|state| state.common().compile_clock)
            .unwrap_or_default();

        // parseFile: decide what survives of the previous state.
        let parsed = match source {
            SourceKind::Editor { version, text } => {
                self.parse_editor(uri, version, &text, old_state)
            }
            SourceKind::Disk { dirty } => {
                match self.parse_disk(uri, dirty, old_state) {
                    Some(parsed) => parsed,
                    None => return self.delete_file(uri),
                }
            }
        };
        let ParsedFile {
            parse_changed,
            tree,
            parse_errors,
            mut shell,
            opened_version,
            clear_dirty,
        } = parsed;

        let name = shell.name();
        let is_opened_shape = matches!(shell, FileState::Opened(_));

        // Pre-descent commit: the working mark and check clock must be
        // visible before any import recursion, or cycles cannot be seen.
        {
            let common = shell.common_mut();
            common.mark = match &importer {
                Some((importer_uri, span)) => WorkingMark::WorkingDep {
                    importer: importer_uri.clone(),
                    span: *span,
                },
                None => WorkingMark::WorkingRoot,
            };
            common.check_clock = self.base_clock;

            let mut state = self.shared.state.lock();
            self.check_cancelled()?;
            state.files.insert(uri.clone(), shell.clone());
            if clear_dirty
                && let Some(FileContents::OnDisk { dirty }) = state.contents.get_mut(uri)
            {
                *dirty = false;
            }
        }
        self.visiting.insert(uri.clone());

        // A file is changed when its text reparsed, when the previous visit
        // never completed, or when any recorded dependency is missing or
        // newer than this file's last compile.
        let mut changed = parse_changed || !old_mark_done;
        for (dep_uri, span) in &old_deps {
            if changed {
                break;
            }
            // A cyclic back-edge: the dependency is an ancestor of this
            // very descent. Its commit has not happened yet, so its clock
            // cannot have moved.
            if self.is_visiting(dep_uri) {
                continue;
            }
            match self.load_file(dep_uri, Some((uri.clone(), *span)))? {
                None => changed = true,
                Some(facts) if facts.compile_clock > old_compile_clock => changed = true,
                Some(_) => {}
            }
        }

        let stage = match tree.clone() {
            Some(tree) if changed => Some(self.run_stages(uri, name, &tree, is_opened_shape)?),
            _ => None,
        };

        let facts = self.commit_file(
            uri,
            name,
            changed,
            is_opened_shape,
            opened_version,
            tree.is_some(),
            parse_errors,
            stage,
        )?;

        self.visiting.remove(uri);
        self.done.insert(uri.clone(), Some(facts.clone()));
        Ok(Some(facts))
    }

    fn parse_editor(
        &self,
        uri: &Uri,
        version: Version,
        text: &str,
        old_state: Option<FileState>,
    ) -> ParsedFile {
        let mut next = match old_state {
            Some(FileState::Opened(old)) => old,
            Some(FileState::Disk(old)) => {
                // Promotion keeps the identity and dependency history; the
                // unversioned disk artifacts cannot seed versioned slots.
                let mut opened = OpenedFileState::new(old.common.name);
                opened.common = old.common;
                opened
            }
            None => OpenedFileState::new(self.shared.names.fresh()),
        };

        if next.last_parsed_version == Some(version) {
            let tree = next.parsed.current_at(version).cloned();
            let parse_errors = next.errors.parse.clone();
            ParsedFile {
                parse_changed: false,
                tree,
                parse_errors,
                opened_version: Some(version),
                shell: FileState::Opened(next),
                clear_dirty: false,
            }
        } else {
            debug!(%uri, %version, "parsing editor text");
            let (tree, parse_errors) = parse_tops(text);
            let tree = tree.map(Arc::new);
            if let Some(tree) = &tree {
                next.parsed.record(version, tree.clone());
            }
            next.last_parsed_version = Some(version);
            ParsedFile {
                parse_changed: true,
                tree,
                parse_errors,
                opened_version: Some(version),
                shell: FileState::Opened(next),
                clear_dirty: false,
            }
        }
    }

    /// Returns `None` when the file cannot be located on disk: the state
    /// entry is to be destroyed.
    fn parse_disk(
        &self,
        uri: &Uri,
        dirty: bool,
        old_state: Option<FileState>,
    ) -> Option<ParsedFile> {
        let path = uri.to_path()?;
        let bytes = std::fs::read(&path).ok()?;
        let hash: [u8; 32] = Sha256::digest(&bytes).into();

        let mut next = match old_state {
            Some(FileState::Disk(old)) => old,
            Some(FileState::Opened(old)) => {
                // Demotion after closeFile: keep identity, dependency
                // history and the newest artifacts the editor produced.
                let mut disk = DiskFileState::new(old.common.name);
                disk.parsed = old.parsed.latest().map(|(_, tree)| tree.clone());
                disk.resolve_sig = old
                    .resolved
                    .latest()
                    .map(|(_, artifact)| artifact.signature.clone());
                disk.type_env = old.typed.latest().map(|(_, typed)| typed.env.clone());
                disk.common = old.common;
                disk
            }
            None => DiskFileState::new(self.shared.names.fresh()),
        };

        if next.disk_hash == Some(hash) && !dirty {
            let tree = next.parsed.clone();
            Some(ParsedFile {
                parse_changed: false,
                tree,
                parse_errors: Vec::new(),
                opened_version: None,
                shell: FileState::Disk(next),
                clear_dirty: false,
            })
        } else {
            debug!(%uri, "parsing disk bytes");
            let text = String::from_utf8_lossy(&bytes);
            let (tree, parse_errors) = parse_tops(&text);
            let tree = tree.map(Arc::new);
            next.parsed = tree.clone();
            next.disk_hash = Some(hash);
            let clear_dirty = tree.is_some();
            Some(ParsedFile {
                parse_changed: true,
                tree,
                parse_errors,
                opened_version: None,
                shell: FileState::Disk(next),
                clear_dirty,
            })
        }
    }

    fn delete_file(&mut self, uri: &Uri) -> Result<Option<LoadedFacts>, PassCancelled> {
        let mut state = self.shared.state.lock();
        self.check_cancelled()?;
        if state.files.remove(uri).is_some() {
            warn!(%uri, "file vanished; dropping its state");
        }
        state.contents.remove(uri);
        let moved = queue_requests(&mut state, uri);
        if moved > 0 {
            self.shared.ready_cv.notify_one();
        }
        drop(state);
        self.done.insert(uri.clone(), None);
        Ok(None)
    }

    fn run_stages(
        &mut self,
        uri: &Uri,
        name: ModuleName,
        tree: &Arc<Module>,
        is_opened_shape: bool,
    ) -> Result<StageResult, PassCancelled> {
        let mut adapter = ImportAdapter::new(self, uri.clone());
        let outcome = resolve_program(name, &Builtins::default(), tree, &mut adapter);
        let deps: IndexMap<Uri, Span> = adapter
            .deps
            .iter()
            .map(|(dep_uri, record)| (dep_uri.clone(), record.span))
            .collect();
        let dep_envs: HashMap<Uri, Option<TypeEnv>> = adapter
            .deps
            .iter()
            .map(|(dep_uri, record)| (dep_uri.clone(), record.env.clone()))
            .collect();
        let by_path = std::mem::take(&mut adapter.by_path);
        let cycle_with = std::mem::take(&mut adapter.cycle_with);
        drop(adapter);
        self.check_cancelled()?;

        let mut typed = None;
        let mut type_errors = Vec::new();
        let mut verify_errors = Vec::new();
        if let Some(result) = &outcome.result {
            let mut env = ImportEnv::default();
            for import in &result.module.imports {
                let dep_env = by_path
                    .get(&import.path)
                    .and_then(|dep_uri| dep_envs.get(dep_uri).cloned())
                    .flatten();
                env.insert(import.alias.clone(), dep_env);
            }
            let desugared = desugar_program(result.module.clone());
            let inferred = infer_program(&env, desugared);
            type_errors = inferred.errors;
            typed = inferred.typed.map(Arc::new);
            if is_opened_shape && let Some(typed) = &typed {
                verify_errors = verify_program(typed);
            }
        }

        Ok(StageResult {
            deps,
            resolved: outcome.result,
            resolve_errors: outcome.errors,
            typed,
            type_errors,
            verify_errors,
            cycle_with,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn commit_file(
        &mut self,
        uri: &Uri,
        name: ModuleName,
        changed: bool,
        is_opened_shape: bool,
        opened_version: Option<Version>,
        has_tree: bool,
        parse_errors: Vec<ParseError>,
        stage: Option<StageResult>,
    ) -> Result<LoadedFacts, PassCancelled> {
        let mut publish: Option<ErrorBundle> = None;
        let facts;
        let recompiled = stage.is_some();
        {
            let mut state = self.shared.state.lock();
            self.check_cancelled()?;
            let Some(file) = state.files.get_mut(uri) else {
                // Only this pass writes file states; the shell must still be
                // there.
                panic!("file state disappeared mid-visit: {uri}");
            };

            let common = file.common_mut();
            common.mark = WorkingMark::Done(self.base_clock);
            if changed {
                common.compile_clock = self.base_clock;
            }
            let compile_clock = common.compile_clock;

            let mut signature = None;
            let mut type_env = None;
            let mut cycle_with = Vec::new();
            match stage {
                Some(stage) => {
                    file.common_mut().deps = stage.deps;
                    signature = stage
                        .resolved
                        .as_ref()
                        .map(|result| result.signature.clone());
                    type_env = stage.typed.as_ref().map(|typed| typed.env.clone());
                    cycle_with = stage.cycle_with;

                    match file {
                        FileState::Opened(opened) => {
                            let version =
                                opened_version.expect("opened commit must carry a version");
                            if let Some(result) = stage.resolved {
                                opened.resolved.record(
                                    version,
                                    ResolvedArtifact {
                                        module: Arc::new(result.module),
                                        signature: result.signature,
                                    },
                                );
                            }
                            if let Some(typed) = stage.typed {
                                opened.typed.record(version, typed);
                            }
                            let bundle = ErrorBundle {
                                parse: parse_errors,
                                resolve: stage.resolve_errors,
                                types: stage.type_errors,
                                verify: stage.verify_errors,
                            };
                            if bundle != opened.errors {
                                opened.errors = bundle.clone();
                                publish = Some(bundle);
                            }
                        }
                        FileState::Disk(disk) => {
                            if let Some(result) = stage.resolved {
                                disk.resolve_sig = Some(result.signature);
                            }
                            if let Some(typed) = stage.typed {
                                disk.type_env = Some(typed.env.clone());
                            }
                        }
                    }
                }
                None => {
                    if changed {
                        // Changed but nothing to compile: the parse produced
                        // no tree. Artifacts stay as they were; the bundle
                        // reflects the broken parse.
                        if let FileState::Opened(opened) = file {
                            let bundle = ErrorBundle {
                                parse: parse_errors,
                                ..ErrorBundle::default()
                            };
                            if bundle != opened.errors {
                                opened.errors = bundle.clone();
                                publish = Some(bundle);
                            }
                        }
                    } else {
                        // Untouched this pass: serve whatever is stored.
                        signature = file.signature();
                        type_env = file.type_env();
                    }
                }
            }
            if changed && !has_tree {
                signature = None;
                type_env = None;
            }

            facts = LoadedFacts {
                name,
                compile_clock,
                signature,
                type_env,
                cycle_with,
            };

            if recompiled {
                state.stats.files_recompiled += 1;
            }
            let moved = queue_requests(&mut state, uri);
            if moved > 0 {
                self.shared.ready_cv.notify_one();
            }
        }

        if !is_opened_shape {
            publish = None;
        }
        if let Some(bundle) = publish {
            debug!(%uri, errors = bundle.len(), "publishing diagnostics");
            (self.shared.publish)(uri, &bundle);
        }
        Ok(facts)
    }

    fn check_cancelled(&self) -> Result<(), PassCancelled> {
        if self.cancel.is_cancelled() {
            Err(PassCancelled)
        } else {
            Ok(())
        }
    }

    pub(crate) fn is_visiting(&self, uri: &Uri) -> bool {
        self.visiting.contains(uri)
    }

    pub(crate) fn library_paths(&self) -> Vec<PathBuf> {
        self.shared.state.lock().library_paths.clone()
    }

    pub(crate) fn has_opened_contents(&self, uri: &Uri) -> bool {
        self.shared
            .state
            .lock()
            .contents
            .get(uri)
            .is_some_and(FileContents::is_opened)
    }
}

struct ParsedFile {
    parse_changed: bool,
    tree: Option<Arc<Module>>,
    parse_errors: Vec<ParseError>,
    opened_version: Option<Version>,
    shell: FileState,
    clear_dirty: bool,
}

#[cfg(test)]
#[path = "../../tests/worker/t_pipeline.rs"]
mod tests;
