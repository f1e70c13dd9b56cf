//! Name resolution.
//!
//! Resolution classifies every identifier and binds `import` declarations
//! through the [`ImportResolver`] seam. The resolver itself knows nothing
//! about files or scheduling; whoever drives compilation answers import
//! queries and harvests the dependency set as a side effect.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::core::diag::Span;
use crate::core::names::ModuleName;
use crate::core::tree::parsed::{Expr, ExprKind, Module};
use crate::core::tree::resolved::{
    ResolvedExpr, ResolvedExprKind, ResolvedImport, ResolvedLet, ResolvedModule,
};
use crate::core::types::{ModuleSignature, Type};

mod errors;

pub use errors::ResolveError;

/// Answer to one import query.
#[derive(Debug, Clone)]
pub enum ImportOutcome {
    /// The import resolved; the signature lists the dependency's exports.
    Imported(ModuleName, ModuleSignature),
    /// The dependency exists but did not produce a signature this round.
    Errored,
    /// No file answers to the path; carries the path as the importer wrote it.
    NotFound(String),
    /// The dependency is being compiled higher up the import chain.
    /// The chain is non-empty; the first entry is the offending edge.
    Cycle(Vec<(String, Span)>),
}

/// Import query seam between resolution and the compilation driver.
pub trait ImportResolver {
    fn lookup(&mut self, path: &str, span: Span) -> ImportOutcome;
}

/// Host-provided symbols visible in every module.
#[derive(Debug, Clone)]
pub struct Builtins {
    bindings: BTreeMap<String, Type>,
}

impl Builtins {
    pub fn lookup(&self, name: &str) -> Option<&Type> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }
}

impl Default for Builtins {
    fn default() -> Self {
        let mut bindings = BTreeMap::new();
        bindings.insert(
            "print".to_string(),
            Type::func(Type::Str, Type::Unit),
        );
        bindings.insert("len".to_string(), Type::func(Type::Str, Type::Int));
        bindings.insert(
            "show".to_string(),
            Type::func(Type::Int, Type::Str),
        );
        Self { bindings }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolveResult {
    pub module: ResolvedModule,
    pub signature: ModuleSignature,
}

/// Either a result or errors, never both; a failed resolve leaves the
/// previous artifact in place at the caller's versioned slot.
#[derive(Debug, Clone, Default)]
pub struct ResolveOutcome {
    pub result: Option<ResolveResult>,
    pub errors: Vec<ResolveError>,
}

impl ResolveOutcome {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

struct AliasBinding {
    target: Option<ModuleName>,
    signature: ModuleSignature,
    /// An import error was already reported for this alias; member lookups
    /// against it must not cascade.
    suppressed: bool,
}

pub fn resolve_program(
    _target: ModuleName,
    builtins: &Builtins,
    module: &Module,
    imports: &mut dyn ImportResolver,
) -> ResolveOutcome {
    let mut errors = Vec::new();
    let mut aliases = HashMap::<String, AliasBinding>::new();
    let mut resolved_imports = Vec::new();

    // Every import is looked up, even after earlier failures, so the driver
    // observes the full dependency set of this parse.
    for decl in &module.imports {
        let outcome = imports.lookup(&decl.path, decl.path_span);
        let binding = match outcome {
            ImportOutcome::Imported(name, signature) => AliasBinding {
                target: Some(name),
                signature,
                suppressed: false,
            },
            ImportOutcome::Errored => {
                errors.push(ResolveError::ImportFailed(decl.path.clone(), decl.path_span));
                AliasBinding {
                    target: None,
                    signature: ModuleSignature::default(),
                    suppressed: true,
                }
            }
            ImportOutcome::NotFound(path) => {
                errors.push(ResolveError::ImportNotFound(path, decl.path_span));
                AliasBinding {
                    target: None,
                    signature: ModuleSignature::default(),
                    suppressed: true,
                }
            }
            ImportOutcome::Cycle(chain) => {
                errors.push(ResolveError::ImportCycle(chain));
                AliasBinding {
                    target: None,
                    signature: ModuleSignature::default(),
                    suppressed: true,
                }
            }
        };

        if aliases.contains_key(&decl.alias) {
            errors.push(ResolveError::SymbolAlreadyDefined(
                decl.alias.clone(),
                decl.span,
            ));
        } else {
            resolved_imports.push(ResolvedImport {
                id: decl.id,
                alias: decl.alias.clone(),
                path: decl.path.clone(),
                target: binding.target,
                span: decl.span,
            });
            aliases.insert(decl.alias.clone(), binding);
        }
    }

    // Top-level names are mutually visible; collect them up front.
    let mut top_names = BTreeSet::new();
    for decl in &module.lets {
        if !top_names.insert(decl.name.clone()) {
            errors.push(ResolveError::SymbolAlreadyDefined(
                decl.name.clone(),
                decl.span,
            ));
        }
    }

    let mut resolver = ExprResolver {
        builtins,
        aliases: &aliases,
        top_names: &top_names,
        locals: Vec::new(),
        errors: &mut errors,
    };

    let mut lets = Vec::new();
    for decl in &module.lets {
        resolver.locals.clear();
        for param in &decl.params {
            resolver.locals.push(param.name.clone());
        }
        let body = resolver.resolve_expr(&decl.body);
        lets.push(ResolvedLet {
            id: decl.id,
            name: decl.name.clone(),
            params: decl.params.clone(),
            body,
            span: decl.span,
        });
    }

    if errors.is_empty() {
        ResolveOutcome {
            result: Some(ResolveResult {
                module: ResolvedModule {
                    imports: resolved_imports,
                    lets,
                },
                signature: ModuleSignature::new(top_names),
            }),
            errors,
        }
    } else {
        ResolveOutcome {
            result: None,
            errors,
        }
    }
}

struct ExprResolver<'a> {
    builtins: &'a Builtins,
    aliases: &'a HashMap<String, AliasBinding>,
    top_names: &'a BTreeSet<String>,
    locals: Vec<String>,
    errors: &'a mut Vec<ResolveError>,
}

impl ExprResolver<'_> {
    fn resolve_expr(&mut self, expr: &Expr) -> ResolvedExpr {
        let kind = match &expr.kind {
            ExprKind::IntLit(value) => ResolvedExprKind::IntLit(*value),
            ExprKind::BoolLit(value) => ResolvedExprKind::BoolLit(*value),
            ExprKind::StrLit(text) => ResolvedExprKind::StrLit(text.clone()),
            ExprKind::Var(name) => self.resolve_var(name, expr.span),
            ExprKind::Member { alias, member } => self.resolve_member(alias, member, expr.span),
            ExprKind::Lambda { params, body } => {
                let depth = self.locals.len();
                for param in params {
                    self.locals.push(param.name.clone());
                }
                let body = self.resolve_expr(body);
                self.locals.truncate(depth);
                ResolvedExprKind::Lambda {
                    params: params.clone(),
                    body: Box::new(body),
                }
            }
            ExprKind::Apply { func, arg } => ResolvedExprKind::Apply {
                func: Box::new(self.resolve_expr(func)),
                arg: Box::new(self.resolve_expr(arg)),
            },
            ExprKind::Binary { op, lhs, rhs } => ResolvedExprKind::Binary {
                op: *op,
                lhs: Box::new(self.resolve_expr(lhs)),
                rhs: Box::new(self.resolve_expr(rhs)),
            },
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => ResolvedExprKind::If {
                cond: Box::new(self.resolve_expr(cond)),
                then_branch: Box::new(self.resolve_expr(then_branch)),
                else_branch: Box::new(self.resolve_expr(else_branch)),
            },
            ExprKind::Assert(value) => ResolvedExprKind::Assert(Box::new(self.resolve_expr(value))),
        };
        ResolvedExpr {
            id: expr.id,
            kind,
            span: expr.span,
        }
    }

    fn resolve_var(&mut self, name: &str, span: Span) -> ResolvedExprKind {
        if self.locals.iter().rev().any(|local| local == name) {
            ResolvedExprKind::Local(name.to_string())
        } else if self.top_names.contains(name) {
            ResolvedExprKind::Global(name.to_string())
        } else if self.builtins.contains(name) {
            ResolvedExprKind::Builtin(name.to_string())
        } else {
            self.errors
                .push(ResolveError::VarUndefined(name.to_string(), span));
            ResolvedExprKind::Local(name.to_string())
        }
    }

    fn resolve_member(&mut self, alias: &str, member: &str, span: Span) -> ResolvedExprKind {
        let Some(binding) = self.aliases.get(alias) else {
            self.errors
                .push(ResolveError::UnknownImportAlias(alias.to_string(), span));
            return ResolvedExprKind::ImportRef {
                alias: alias.to_string(),
                member: member.to_string(),
                module: None,
            };
        };
        if !binding.suppressed && !binding.signature.contains(member) {
            self.errors.push(ResolveError::MemberUndefined {
                alias: alias.to_string(),
                member: member.to_string(),
                span,
            });
        }
        ResolvedExprKind::ImportRef {
            alias: alias.to_string(),
            member: member.to_string(),
            module: binding.target,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/core/t_resolve.rs"]
mod tests;
