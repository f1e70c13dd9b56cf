use thiserror::Error;

use crate::core::diag::Span;
use crate::core::lexer::{LexError, TokenKind};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseError {
    #[error(transparent)]
    Lex(#[from] LexError),

    #[error("Expected a top-level declaration, found {0}")]
    ExpectedDecl(TokenKind, Span),

    #[error("Expected {expected}, found {found}")]
    ExpectedToken {
        expected: TokenKind,
        found: TokenKind,
        span: Span,
    },

    #[error("Expected an identifier, found {0}")]
    ExpectedIdent(TokenKind, Span),

    #[error("Expected an expression, found {0}")]
    ExpectedExpr(TokenKind, Span),

    #[error("Expected an import path string, found {0}")]
    ExpectedImportPath(TokenKind, Span),
}

impl ParseError {
    pub fn span(&self) -> Span {
        match self {
            ParseError::Lex(error) => error.span(),
            ParseError::ExpectedDecl(_, span) => *span,
            ParseError::ExpectedToken { span, .. } => *span,
            ParseError::ExpectedIdent(_, span) => *span,
            ParseError::ExpectedExpr(_, span) => *span,
            ParseError::ExpectedImportPath(_, span) => *span,
        }
    }
}
