//! Import adapter.
//!
//! Threaded through name resolution to (a) answer import queries by
//! recursively loading the target file and (b) accumulate the dependency
//! edges of the resolve as a side effect. One span is retained per target
//! URI (the first seen), and only targets that actually have a file state
//! become dependencies.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::core::api::{ImportOutcome, ImportResolver};
use crate::core::diag::Span;
use crate::core::types::TypeEnv;
use crate::services::worker::pipeline::CompilePass;
use crate::services::worker::uri::Uri;

pub(crate) const SOURCE_EXTENSION: &str = "lm";

#[derive(Debug, Clone)]
pub(crate) struct DepRecord {
    pub span: Span,
    pub env: Option<TypeEnv>,
}

pub(crate) struct ImportAdapter<'a> {
    pass: &'a mut CompilePass,
    importer: Uri,
    importer_dir: Option<PathBuf>,
    /// Dependency edges captured so far, in first-seen order.
    pub deps: IndexMap<Uri, DepRecord>,
    /// Import path text to the URI it resolved to, for alias wiring.
    pub by_path: HashMap<String, Uri>,
    /// Still-in-progress files this file's imports looped back to.
    pub cycle_with: Vec<Uri>,
}

impl<'a> ImportAdapter<'a> {
    pub fn new(pass: &'a mut CompilePass, importer: Uri) -> Self {
        let importer_dir = importer.parent_dir();
        Self {
            pass,
            importer,
            importer_dir,
            deps: IndexMap::new(),
            by_path: HashMap::new(),
            cycle_with: Vec::new(),
        }
    }

    /// A path starting with `.` resolves against the importer's directory;
    /// anything else walks the library paths in order, first hit wins.
    fn resolve_path(&self, path: &str) -> Option<Uri> {
        let file_name = with_extension(path);
        if path.starts_with('.') {
            let dir = self.importer_dir.clone()?;
            return Some(Uri::from_path(&dir.join(file_name)));
        }
        for lib in self.pass.library_paths() {
            let candidate = lib.join(&file_name);
            let uri = Uri::from_path(&candidate);
            if self.pass.has_opened_contents(&uri) || candidate.exists() {
                return Some(uri);
            }
        }
        None
    }

    fn record(&mut self, uri: Uri, span: Span, env: Option<TypeEnv>) {
        self.deps.entry(uri).or_insert(DepRecord { span, env });
    }
}

impl ImportResolver for ImportAdapter<'_> {
    fn lookup(&mut self, path: &str, span: Span) -> ImportOutcome {
        let Some(uri) = self.resolve_path(path) else {
            return ImportOutcome::NotFound(path.to_string());
        };
        self.by_path.insert(path.to_string(), uri.clone());

        // The target is mid-visit somewhere up the import chain: a cycle.
        // Its working mark was committed before this descent started.
        if self.pass.is_visiting(&uri) {
            self.record(uri.clone(), span, None);
            self.cycle_with.push(uri);
            return ImportOutcome::Cycle(vec![(path.to_string(), span)]);
        }

        let importer = self.importer.clone();
        match self.pass.load_file(&uri, Some((importer, span))) {
            // The pass is being torn down; the resolve result is discarded.
            Err(_) => ImportOutcome::Errored,
            Ok(None) => ImportOutcome::NotFound(path.to_string()),
            Ok(Some(facts)) => {
                self.record(uri, span, facts.type_env.clone());
                match facts.signature {
                    Some(signature) => ImportOutcome::Imported(facts.name, signature),
                    None => {
                        // The dependency failed because it looped back into a
                        // file still being visited; that makes this importer
                        // part of the cycle exactly when the loop target is
                        // one of its own ancestors.
                        let looped: Vec<Uri> = facts
                            .cycle_with
                            .iter()
                            .filter(|target| self.pass.is_visiting(target))
                            .cloned()
                            .collect();
                        if looped.is_empty() {
                            ImportOutcome::Errored
                        } else {
                            self.cycle_with.extend(looped);
                            ImportOutcome::Cycle(vec![(path.to_string(), span)])
                        }
                    }
                }
            }
        }
    }
}

fn with_extension(path: &str) -> String {
    if Path::new(path).extension().is_some() {
        path.to_string()
    } else {
        format!("{path}.{SOURCE_EXTENSION}")
    }
}

#[cfg(test)]
#[path = "../../tests/worker/t_imports.rs"]
mod tests;
