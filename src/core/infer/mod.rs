//! Desugaring and type inference.
//!
//! Inference is deliberately monomorphic: unannotated lambda parameters get
//! `Unknown`, and `Unknown` unifies with anything. Missing cross-module
//! facts therefore degrade to fewer diagnostics, never to spurious ones.

use std::collections::{BTreeMap, HashMap};

use crate::core::diag::Span;
use crate::core::resolve::Builtins;
use crate::core::tree::resolved::{ResolvedExpr, ResolvedExprKind, ResolvedModule};
use crate::core::tree::typed::TypedModule;
use crate::core::tree::{BinaryOp, NodeId};
use crate::core::types::{Type, TypeEnv};

mod errors;

pub use errors::{Severity, TypeError};

/// Per-alias type environments of the importer's dependencies.
///
/// `None` means the dependency resolved but has no usable type environment
/// this round; its members type as `Unknown`.
#[derive(Debug, Clone, Default)]
pub struct ImportEnv {
    by_alias: BTreeMap<String, Option<TypeEnv>>,
}

impl ImportEnv {
    pub fn insert(&mut self, alias: String, env: Option<TypeEnv>) {
        self.by_alias.insert(alias, env);
    }

    fn member_type(&self, alias: &str, member: &str) -> Type {
        match self.by_alias.get(alias) {
            Some(Some(env)) => env.lookup(member).cloned().unwrap_or(Type::Unknown),
            _ => Type::Unknown,
        }
    }
}

/// Typed-only, errors-only, or both: the typed artifact is withheld exactly
/// when an error-severity diagnostic is present.
#[derive(Debug, Clone, Default)]
pub struct InferOutcome {
    pub typed: Option<TypedModule>,
    pub errors: Vec<TypeError>,
}

/// Rewrite parameter sugar into nested single-parameter lambdas.
pub fn desugar_program(mut module: ResolvedModule) -> ResolvedModule {
    for decl in &mut module.lets {
        desugar_expr(&mut decl.body);
        if decl.params.is_empty() {
            continue;
        }
        let params = std::mem::take(&mut decl.params);
        let body = std::mem::replace(
            &mut decl.body,
            ResolvedExpr {
                id: decl.id,
                kind: ResolvedExprKind::IntLit(0),
                span: decl.span,
            },
        );
        decl.body = fold_lambda(params, body, decl.span);
    }
    module
}

fn fold_lambda(
    params: Vec<crate::core::tree::parsed::Param>,
    body: ResolvedExpr,
    span: Span,
) -> ResolvedExpr {
    let mut expr = body;
    for param in params.into_iter().rev() {
        let id = param.id;
        expr = ResolvedExpr {
            id,
            kind: ResolvedExprKind::Lambda {
                params: vec![param],
                body: Box::new(expr),
            },
            span,
        };
    }
    expr
}

fn desugar_expr(expr: &mut ResolvedExpr) {
    match &mut expr.kind {
        ResolvedExprKind::Lambda { params, body } => {
            desugar_expr(body);
            if params.len() > 1 {
                let params = std::mem::take(params);
                let inner = std::mem::replace(
                    body,
                    Box::new(ResolvedExpr {
                        id: expr.id,
                        kind: ResolvedExprKind::IntLit(0),
                        span: expr.span,
                    }),
                );
                *expr = fold_lambda(params, *inner, expr.span);
            }
        }
        ResolvedExprKind::Apply { func, arg } => {
            desugar_expr(func);
            desugar_expr(arg);
        }
        ResolvedExprKind::Binary { lhs, rhs, .. } => {
            desugar_expr(lhs);
            desugar_expr(rhs);
        }
        ResolvedExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            desugar_expr(cond);
            desugar_expr(then_branch);
            desugar_expr(else_branch);
        }
        ResolvedExprKind::Assert(value) => desugar_expr(value),
        _ => {}
    }
}

pub fn infer_program(env: &ImportEnv, module: ResolvedModule) -> InferOutcome {
    let builtins = Builtins::default();
    let mut checker = Checker {
        env,
        builtins: &builtins,
        tops: TypeEnv::new(),
        locals: Vec::new(),
        node_types: HashMap::new(),
        errors: Vec::new(),
    };

    for decl in &module.lets {
        if checker.builtins.contains(&decl.name) {
            checker
                .errors
                .push(TypeError::ShadowsBuiltin(decl.name.clone(), decl.span));
        }
        let ty = checker.infer_expr(&decl.body);
        checker.tops.insert(decl.name.clone(), ty);
    }

    let has_fatal = checker
        .errors
        .iter()
        .any(|error| error.severity() == Severity::Error);
    let errors = checker.errors;

    if has_fatal {
        InferOutcome {
            typed: None,
            errors,
        }
    } else {
        InferOutcome {
            typed: Some(TypedModule {
                env: checker.tops,
                node_types: checker.node_types,
                module,
            }),
            errors,
        }
    }
}

struct Checker<'a> {
    env: &'a ImportEnv,
    builtins: &'a Builtins,
    tops: TypeEnv,
    locals: Vec<(String, Type)>,
    node_types: HashMap<NodeId, Type>,
    errors: Vec<TypeError>,
}

impl Checker<'_> {
    fn infer_expr(&mut self, expr: &ResolvedExpr) -> Type {
        let ty = match &expr.kind {
            ResolvedExprKind::IntLit(_) => Type::Int,
            ResolvedExprKind::BoolLit(_) => Type::Bool,
            ResolvedExprKind::StrLit(_) => Type::Str,
            ResolvedExprKind::Local(name) => self
                .locals
                .iter()
                .rev()
                .find(|(local, _)| local == name)
                .map(|(_, ty)| ty.clone())
                .unwrap_or(Type::Unknown),
            ResolvedExprKind::Global(name) => {
                self.tops.lookup(name).cloned().unwrap_or(Type::Unknown)
            }
            ResolvedExprKind::Builtin(name) => {
                self.builtins.lookup(name).cloned().unwrap_or(Type::Unknown)
            }
            ResolvedExprKind::ImportRef { alias, member, .. } => {
                self.env.member_type(alias, member)
            }
            ResolvedExprKind::Lambda { params, body } => {
                let depth = self.locals.len();
                for param in params {
                    self.locals.push((param.name.clone(), Type::Unknown));
                }
                let body_ty = self.infer_expr(body);
                self.locals.truncate(depth);
                Type::func(Type::Unknown, body_ty)
            }
            ResolvedExprKind::Apply { func, arg } => {
                let func_ty = self.infer_expr(func);
                let arg_ty = self.infer_expr(arg);
                match func_ty {
                    Type::Fn(param, ret) => {
                        self.expect(&arg_ty, &param, arg.span);
                        *ret
                    }
                    Type::Unknown => Type::Unknown,
                    other => {
                        self.errors.push(TypeError::NotAFunction(other, func.span));
                        Type::Unknown
                    }
                }
            }
            ResolvedExprKind::Binary { op, lhs, rhs } => {
                let lhs_ty = self.infer_expr(lhs);
                let rhs_ty = self.infer_expr(rhs);
                self.infer_binary(*op, lhs_ty, rhs_ty, lhs.span, rhs.span)
            }
            ResolvedExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond_ty = self.infer_expr(cond);
                if !matches!(cond_ty, Type::Bool | Type::Unknown) {
                    self.errors.push(TypeError::CondNotBool(cond_ty, cond.span));
                }
                let then_ty = self.infer_expr(then_branch);
                let else_ty = self.infer_expr(else_branch);
                self.join_branches(then_ty, else_ty, expr.span)
            }
            ResolvedExprKind::Assert(value) => {
                let value_ty = self.infer_expr(value);
                if !matches!(value_ty, Type::Bool | Type::Unknown) {
                    self.errors
                        .push(TypeError::AssertNotBool(value_ty, value.span));
                }
                Type::Unit
            }
        };
        self.node_types.insert(expr.id, ty.clone());
        ty
    }

    fn infer_binary(
        &mut self,
        op: BinaryOp,
        lhs: Type,
        rhs: Type,
        lhs_span: Span,
        rhs_span: Span,
    ) -> Type {
        match op {
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                self.expect(&lhs, &Type::Int, lhs_span);
                self.expect(&rhs, &Type::Int, rhs_span);
                Type::Int
            }
            BinaryOp::Concat => {
                self.expect(&lhs, &Type::Str, lhs_span);
                self.expect(&rhs, &Type::Str, rhs_span);
                Type::Str
            }
            BinaryOp::Lt | BinaryOp::Gt => {
                self.expect(&lhs, &Type::Int, lhs_span);
                self.expect(&rhs, &Type::Int, rhs_span);
                Type::Bool
            }
            BinaryOp::Eq => {
                if !lhs.is_unknown() && !rhs.is_unknown() && lhs != rhs {
                    self.errors.push(TypeError::Mismatch {
                        expected: lhs,
                        found: rhs,
                        span: rhs_span,
                    });
                }
                Type::Bool
            }
            BinaryOp::And | BinaryOp::Or => {
                self.expect(&lhs, &Type::Bool, lhs_span);
                self.expect(&rhs, &Type::Bool, rhs_span);
                Type::Bool
            }
        }
    }

    fn join_branches(&mut self, then_ty: Type, else_ty: Type, span: Span) -> Type {
        if then_ty.is_unknown() {
            return else_ty;
        }
        if else_ty.is_unknown() {
            return then_ty;
        }
        if then_ty != else_ty {
            self.errors
                .push(TypeError::BranchMismatch(then_ty.clone(), else_ty, span));
        }
        then_ty
    }

    fn expect(&mut self, actual: &Type, expected: &Type, span: Span) {
        if actual.is_unknown() || expected.is_unknown() {
            return;
        }
        if actual != expected {
            self.errors.push(TypeError::Mismatch {
                expected: expected.clone(),
                found: actual.clone(),
                span,
            });
        }
    }
}

#[cfg(test)]
#[path = "../../tests/core/t_infer.rs"]
mod tests;
