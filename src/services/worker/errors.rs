//! Error aggregation and request-side failures.

use thiserror::Error;

use crate::core::api::{ParseError, ResolveError, TypeError, VerifyError};
use crate::services::worker::uri::Uri;

/// All diagnostics of one file, published atomically after a compile.
///
/// Bundles compare by value; publication and republication happen only when
/// a compile actually changed the bundle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorBundle {
    pub parse: Vec<ParseError>,
    pub resolve: Vec<ResolveError>,
    pub types: Vec<TypeError>,
    pub verify: Vec<VerifyError>,
}

impl ErrorBundle {
    pub fn is_empty(&self) -> bool {
        self.parse.is_empty()
            && self.resolve.is_empty()
            && self.types.is_empty()
            && self.verify.is_empty()
    }

    pub fn len(&self) -> usize {
        self.parse.len() + self.resolve.len() + self.types.len() + self.verify.len()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("File is not open: {0}")]
    FileNotOpen(Uri),
}

#[cfg(test)]
#[path = "../../tests/worker/t_errors.rs"]
mod tests;
