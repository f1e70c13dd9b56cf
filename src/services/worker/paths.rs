//! Library search-path assembly.

use std::path::PathBuf;

pub const LIBRARY_PATH_ENV: &str = "LUMEN_PATH";

/// Compute the ordered library search list: configured extras first, then
/// the environment's entries. Import resolution tries each in order and the
/// first hit wins.
pub fn library_paths(extra: &[PathBuf]) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = extra.to_vec();
    if let Ok(raw) = std::env::var(LIBRARY_PATH_ENV) {
        out.extend(
            raw.split(':')
                .filter(|entry| !entry.is_empty())
                .map(PathBuf::from),
        );
    }
    out
}

#[cfg(test)]
#[path = "../../tests/worker/t_paths.rs"]
mod tests;
