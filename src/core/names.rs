//! Process-wide fresh-name allocation.
//!
//! Compile stages address files by an integer-tagged symbol instead of the
//! URI, so artifacts stay comparable when a file is renamed or reopened.

use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Compiler-internal identity of one file's module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleName(pub u64);

impl Display for ModuleName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "m#{}", self.0)
    }
}

/// Fresh-name source shared by everything in one worker process.
///
/// Clones draw from the same counter; two files never receive the same name.
#[derive(Debug, Clone, Default)]
pub struct NameAlloc {
    next: Arc<AtomicU64>,
}

impl NameAlloc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&self) -> ModuleName {
        ModuleName(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
#[path = "../tests/core/t_names.rs"]
mod tests;
