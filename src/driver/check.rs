//! One-shot batch check: open the given files on a worker, run one refresh
//! to quiescence, and collect every file's error bundle.

use std::io;
use std::path::PathBuf;

use crate::core::api::Severity;
use crate::services::worker::{ErrorBundle, Uri, Version, Worker, WorkerConfig};

pub struct CheckOutcome {
    /// Per-file bundles in the order the files were given.
    pub bundles: Vec<(Uri, ErrorBundle)>,
}

impl CheckOutcome {
    /// Diagnostics that should fail a batch check; warnings do not.
    pub fn fatal_count(&self) -> usize {
        self.bundles
            .iter()
            .map(|(_, bundle)| {
                bundle.parse.len()
                    + bundle.resolve.len()
                    + bundle.verify.len()
                    + bundle
                        .types
                        .iter()
                        .filter(|error| error.severity() == Severity::Error)
                        .count()
            })
            .sum()
    }
}

pub fn check_files(files: &[PathBuf], library_paths: Vec<PathBuf>) -> io::Result<CheckOutcome> {
    let worker = Worker::new(WorkerConfig {
        library_paths,
        publish: None,
    });

    let mut uris = Vec::new();
    for path in files {
        let text = std::fs::read_to_string(path)?;
        let path = path.canonicalize()?;
        let uri = Uri::from_path(&path);
        worker.update_file(&uri, Version(1), &text);
        uris.push(uri);
    }

    worker.refresh_and_wait(None);

    let bundles = uris
        .into_iter()
        .map(|uri| {
            let bundle = worker.error_bundle(&uri).unwrap_or_default();
            (uri, bundle)
        })
        .collect();
    Ok(CheckOutcome { bundles })
}

#[cfg(test)]
#[path = "../tests/driver/t_check.rs"]
mod tests;
