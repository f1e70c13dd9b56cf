//! Resolved syntax tree: every identifier classified, imports bound.

use crate::core::diag::Span;
use crate::core::names::ModuleName;
use crate::core::tree::{BinaryOp, NodeId, parsed::Param};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedModule {
    pub imports: Vec<ResolvedImport>,
    pub lets: Vec<ResolvedLet>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedImport {
    pub id: NodeId,
    pub alias: String,
    pub path: String,
    /// Internal name of the imported module, when the import resolved.
    pub target: Option<ModuleName>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLet {
    pub id: NodeId,
    pub name: String,
    pub params: Vec<Param>,
    pub body: ResolvedExpr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedExpr {
    pub id: NodeId,
    pub kind: ResolvedExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedExprKind {
    IntLit(i64),
    BoolLit(bool),
    StrLit(String),
    /// A lambda parameter in scope.
    Local(String),
    /// A top-level binding of this module.
    Global(String),
    /// A builtin provided by the host.
    Builtin(String),
    /// A member of an imported module.
    ImportRef {
        alias: String,
        member: String,
        module: Option<ModuleName>,
    },
    Lambda {
        params: Vec<Param>,
        body: Box<ResolvedExpr>,
    },
    Apply {
        func: Box<ResolvedExpr>,
        arg: Box<ResolvedExpr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<ResolvedExpr>,
        rhs: Box<ResolvedExpr>,
    },
    If {
        cond: Box<ResolvedExpr>,
        then_branch: Box<ResolvedExpr>,
        else_branch: Box<ResolvedExpr>,
    },
    Assert(Box<ResolvedExpr>),
}
