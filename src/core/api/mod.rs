//! Shared compiler stage API.
//!
//! This facade is the collaborator contract consumed by the worker: the
//! worker never reaches into stage internals, it calls these five
//! operations and owns everything between them (scheduling, caching,
//! dependency capture, publication).

pub use crate::core::infer::{
    ImportEnv, InferOutcome, Severity, TypeError, desugar_program, infer_program,
};
pub use crate::core::parse::{ParseError, parse_tops};
pub use crate::core::resolve::{
    Builtins, ImportOutcome, ImportResolver, ResolveError, ResolveOutcome, ResolveResult,
    resolve_program,
};
pub use crate::core::verify::{VerifyError, verify_program};
