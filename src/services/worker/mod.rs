//! Incremental compilation worker.
//!
//! Maintains the live compile state of a set of source files, re-running
//! the frontend stages whenever inputs change and serving client requests
//! against the freshest consistent snapshot. Two background loops do the
//! work: the refresh scheduler (one interruptible compile pass at a time)
//! and the request dispatcher.

pub mod clock;
pub mod contents;
pub mod errors;
pub(crate) mod imports;
pub mod paths;
pub(crate) mod pipeline;
pub mod refresh;
pub mod requests;
pub mod state;
pub mod uri;
#[allow(clippy::module_inception)]
pub mod worker;

#[cfg(test)]
#[path = "../../tests/worker/t_properties.rs"]
mod t_properties;

pub use clock::{Clock, Version};
pub use contents::FileContents;
pub use errors::{ErrorBundle, RequestError};
pub use refresh::CancelToken;
pub use requests::{Request, RequestId, RequestPayload, StageTag, TypedPayload};
pub use uri::Uri;
pub use worker::{PublishFn, Worker, WorkerConfig, WorkerStats};
