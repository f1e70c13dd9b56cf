//! Post-typing verification.
//!
//! Runs only for files open in an editor, after a clean typing pass. The
//! checks are static: they flag program points that are guaranteed to fail
//! at runtime regardless of input.

use thiserror::Error;

use crate::core::diag::Span;
use crate::core::tree::resolved::{ResolvedExpr, ResolvedExprKind};
use crate::core::tree::typed::TypedModule;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum VerifyError {
    #[error("Division by constant zero")]
    DivisionByZero(Span),

    #[error("Assertion is always false")]
    AssertAlwaysFalse(Span),
}

impl VerifyError {
    pub fn span(&self) -> Span {
        match self {
            VerifyError::DivisionByZero(span) => *span,
            VerifyError::AssertAlwaysFalse(span) => *span,
        }
    }
}

pub fn verify_program(typed: &TypedModule) -> Vec<VerifyError> {
    let mut errors = Vec::new();
    for decl in &typed.module.lets {
        verify_expr(&decl.body, &mut errors);
    }
    errors
}

fn verify_expr(expr: &ResolvedExpr, errors: &mut Vec<VerifyError>) {
    match &expr.kind {
        ResolvedExprKind::Binary { op, lhs, rhs } => {
            if *op == crate::core::tree::BinaryOp::Div
                && matches!(rhs.kind, ResolvedExprKind::IntLit(0))
            {
                errors.push(VerifyError::DivisionByZero(expr.span));
            }
            verify_expr(lhs, errors);
            verify_expr(rhs, errors);
        }
        ResolvedExprKind::Assert(value) => {
            if matches!(value.kind, ResolvedExprKind::BoolLit(false)) {
                errors.push(VerifyError::AssertAlwaysFalse(expr.span));
            }
            verify_expr(value, errors);
        }
        ResolvedExprKind::Lambda { body, .. } => verify_expr(body, errors),
        ResolvedExprKind::Apply { func, arg } => {
            verify_expr(func, errors);
            verify_expr(arg, errors);
        }
        ResolvedExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            verify_expr(cond, errors);
            verify_expr(then_branch, errors);
            verify_expr(else_branch, errors);
        }
        _ => {}
    }
}

#[cfg(test)]
#[path = "../tests/core/t_verify.rs"]
mod tests;
