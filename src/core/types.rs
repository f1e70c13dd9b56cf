//! Semantic types shared by inference and the worker's cross-file artifacts.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Int,
    Bool,
    Str,
    Unit,
    Fn(Box<Type>, Box<Type>),
    /// Placeholder for values whose type could not be determined, e.g.
    /// members of a dependency that has not been typed yet. Unknown unifies
    /// with everything so one missing fact does not cascade.
    Unknown,
}

impl Type {
    pub fn func(param: Type, ret: Type) -> Type {
        Type::Fn(Box::new(param), Box::new(ret))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Type::Unknown)
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Int => write!(f, "Int"),
            Type::Bool => write!(f, "Bool"),
            Type::Str => write!(f, "Str"),
            Type::Unit => write!(f, "Unit"),
            Type::Fn(param, ret) => write!(f, "({param} -> {ret})"),
            Type::Unknown => write!(f, "?"),
        }
    }
}

/// Name-level exports of a module, produced by resolution.
///
/// Importers consult the signature to validate `alias.member` references
/// before any type information for the dependency exists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleSignature {
    exports: BTreeSet<String>,
}

impl ModuleSignature {
    pub fn new(exports: BTreeSet<String>) -> Self {
        Self { exports }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.exports.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.exports.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.exports.is_empty()
    }
}

/// Exported member types of a module, produced by inference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeEnv {
    bindings: BTreeMap<String, Type>,
}

impl TypeEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: String, ty: Type) {
        self.bindings.insert(name, ty);
    }

    pub fn lookup(&self, name: &str) -> Option<&Type> {
        self.bindings.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Type)> {
        self.bindings.iter().map(|(name, ty)| (name.as_str(), ty))
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
