//! Parsed syntax tree, before name resolution.

use crate::core::diag::Span;
use crate::core::tree::{BinaryOp, NodeId};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Module {
    pub imports: Vec<ImportDecl>,
    pub lets: Vec<LetDecl>,
}

impl Module {
    pub fn export_names(&self) -> impl Iterator<Item = &str> {
        self.lets.iter().map(|decl| decl.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub id: NodeId,
    /// Import path exactly as written, e.g. `"./b"` or `"prelude"`.
    pub path: String,
    pub alias: String,
    pub span: Span,
    pub path_span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LetDecl {
    pub id: NodeId,
    pub name: String,
    /// `let f a b = e` sugar; emptied by desugaring after resolution.
    pub params: Vec<Param>,
    pub body: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub id: NodeId,
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    IntLit(i64),
    BoolLit(bool),
    StrLit(String),
    Var(String),
    Member { alias: String, member: String },
    Lambda { params: Vec<Param>, body: Box<Expr> },
    Apply { func: Box<Expr>, arg: Box<Expr> },
    Binary { op: BinaryOp, lhs: Box<Expr>, rhs: Box<Expr> },
    If { cond: Box<Expr>, then_branch: Box<Expr>, else_branch: Box<Expr> },
    Assert(Box<Expr>),
}
