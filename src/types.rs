//! Core identifiers and small value types shared across the crate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// A parser-provided unique symbol id (USR in libclang terms).
///
/// Stable across runs and shared by every forward declaration and the
/// eventual definition of the same entity, per spec §3 "Symbol".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolId(pub Arc<str>);

impl SymbolId {
    pub fn new(usr: impl Into<Arc<str>>) -> Self {
        Self(usr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A storage-assigned surrogate key for a file row.
///
/// Files are keyed externally by absolute path (spec §3 "File metadata ...
/// Key: path"); this id only exists to make joins in the storage backend
/// cheap and is never observed outside `storage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(pub i64);

impl FileId {
    pub fn value(self) -> i64 {
        self.0
    }
}

/// 1-based line/column source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Kind of a symbol, closed per spec §3 and §9 ("avoid string-compare
/// dispatch"): every parser cursor kind this crate cares about maps to
/// exactly one of these variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    Class,
    Struct,
    Union,
    Enum,
    Function,
    Method,
    Typedef,
    Alias,
    Namespace,
    Variable,
    Field,
    /// A template specialization, distinguished from its primary template
    /// per spec §4.6 (a specialization is not the same thing as a method
    /// whose parameters merely mention an instantiated template).
    TemplateSpecialization,
}

impl SymbolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Struct => "struct",
            Self::Union => "union",
            Self::Enum => "enum",
            Self::Function => "function",
            Self::Method => "method",
            Self::Typedef => "typedef",
            Self::Alias => "alias",
            Self::Namespace => "namespace",
            Self::Variable => "variable",
            Self::Field => "field",
            Self::TemplateSpecialization => "template_specialization",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "class" => Self::Class,
            "struct" => Self::Struct,
            "union" => Self::Union,
            "enum" => Self::Enum,
            "function" => Self::Function,
            "method" => Self::Method,
            "typedef" => Self::Typedef,
            "alias" => Self::Alias,
            "namespace" => Self::Namespace,
            "variable" => Self::Variable,
            "field" => Self::Field,
            "template_specialization" => Self::TemplateSpecialization,
            _ => return None,
        })
    }
}

/// Access specifier, per spec §3 "access (public/protected/private)".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Access {
    Public,
    Protected,
    Private,
    /// Free functions, namespaces, etc. have no access specifier.
    Unspecified,
}

impl Access {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Protected => "protected",
            Self::Private => "private",
            Self::Unspecified => "unspecified",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "public" => Self::Public,
            "protected" => Self::Protected,
            "private" => Self::Private,
            _ => Self::Unspecified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_kind_round_trips_through_str() {
        for kind in [
            SymbolKind::Class,
            SymbolKind::Struct,
            SymbolKind::Union,
            SymbolKind::Enum,
            SymbolKind::Function,
            SymbolKind::Method,
            SymbolKind::Typedef,
            SymbolKind::Alias,
            SymbolKind::Namespace,
            SymbolKind::Variable,
            SymbolKind::Field,
            SymbolKind::TemplateSpecialization,
        ] {
            assert_eq!(SymbolKind::from_str(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn access_defaults_to_unspecified_for_unknown_strings() {
        assert_eq!(Access::from_str("friend"), Access::Unspecified);
    }

    #[test]
    fn symbol_id_displays_as_its_usr() {
        let id = SymbolId::new("c:@F@foo#");
        assert_eq!(id.to_string(), "c:@F@foo#");
    }
}
