use thiserror::Error;

use crate::core::diag::Span;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResolveError {
    #[error("Symbol already defined: {0}")]
    SymbolAlreadyDefined(String, Span),

    #[error("Undefined variable: {0}")]
    VarUndefined(String, Span),

    #[error("Unknown import alias: {0}")]
    UnknownImportAlias(String, Span),

    #[error("Module '{alias}' has no export named '{member}'")]
    MemberUndefined {
        alias: String,
        member: String,
        span: Span,
    },

    #[error("Cannot locate import: {0}")]
    ImportNotFound(String, Span),

    #[error("Import of '{0}' failed to resolve")]
    ImportFailed(String, Span),

    #[error("Import cycle through '{}'", .0[0].0)]
    ImportCycle(Vec<(String, Span)>),
}

impl ResolveError {
    pub fn span(&self) -> Span {
        match self {
            ResolveError::SymbolAlreadyDefined(_, span) => *span,
            ResolveError::VarUndefined(_, span) => *span,
            ResolveError::UnknownImportAlias(_, span) => *span,
            ResolveError::MemberUndefined { span, .. } => *span,
            ResolveError::ImportNotFound(_, span) => *span,
            ResolveError::ImportFailed(_, span) => *span,
            ResolveError::ImportCycle(chain) => chain[0].1,
        }
    }
}
