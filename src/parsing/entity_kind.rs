//! Closed cursor-kind classification (spec §4.6, §9 "avoid string-compare
//! dispatch"): every `clang::EntityKind` this crate cares about maps to
//! exactly one `EntityCategory`, matched exhaustively wherever it matters.

use clang::{Entity, EntityKind};

use crate::types::SymbolKind;

/// A closed tagged enumeration of the cursor categories this indexer
/// records. `Ignored` absorbs every libclang cursor kind with no symbol
/// counterpart (statements, expressions other than calls, attributes, …).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityCategory {
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
    /// and from a method whose parameters merely mention an instantiated
    /// template (spec §4.6).
    TemplateSpecialization,
    Ignored,
}

impl EntityCategory {
    pub fn to_symbol_kind(self) -> Option<SymbolKind> {
        Some(match self {
            Self::Class => SymbolKind::Class,
            Self::Struct => SymbolKind::Struct,
            Self::Union => SymbolKind::Union,
            Self::Enum => SymbolKind::Enum,
            Self::Function => SymbolKind::Function,
            Self::Method => SymbolKind::Method,
            Self::Typedef => SymbolKind::Typedef,
            Self::Alias => SymbolKind::Alias,
            Self::Namespace => SymbolKind::Namespace,
            Self::Variable => SymbolKind::Variable,
            Self::Field => SymbolKind::Field,
            Self::TemplateSpecialization => SymbolKind::TemplateSpecialization,
            Self::Ignored => return None,
        })
    }
}

/// Classifies `entity`'s cursor kind. Class/struct template specializations
/// are detected via `Entity::get_template()` (the entity this one
/// specializes), not by inspecting the parameter list — a method whose
/// parameters happen to mention an instantiated template is a plain
/// `Method`, never a `TemplateSpecialization` (spec §4.6).
pub fn classify(entity: &Entity<'_>) -> EntityCategory {
    match entity.get_kind() {
        EntityKind::ClassDecl | EntityKind::ClassTemplate => {
            if entity.get_template().is_some() {
                EntityCategory::TemplateSpecialization
            } else {
                EntityCategory::Class
            }
        }
        EntityKind::ClassTemplatePartialSpecialization => EntityCategory::TemplateSpecialization,
        EntityKind::StructDecl => EntityCategory::Struct,
        EntityKind::UnionDecl => EntityCategory::Union,
        EntityKind::EnumDecl => EntityCategory::Enum,
        EntityKind::FunctionDecl | EntityKind::FunctionTemplate => EntityCategory::Function,
        EntityKind::Method
        | EntityKind::Constructor
        | EntityKind::Destructor
        | EntityKind::ConversionFunction => EntityCategory::Method,
        EntityKind::TypedefDecl => EntityCategory::Typedef,
        EntityKind::TypeAliasDecl | EntityKind::TypeAliasTemplateDecl => EntityCategory::Alias,
        EntityKind::Namespace => EntityCategory::Namespace,
        EntityKind::VarDecl => EntityCategory::Variable,
        EntityKind::FieldDecl => EntityCategory::Field,
        _ => EntityCategory::Ignored,
    }
}

/// Whether `entity` is a call expression suitable for a call-site record.
/// Per spec §4.6, assigning a function pointer is not a call: only an
/// actual `CallExpr` cursor whose referenced entity resolves counts.
pub fn is_call_site(entity: &Entity<'_>) -> bool {
    entity.get_kind() == EntityKind::CallExpr
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_symbol_kind_covers_every_non_ignored_category() {
        let categories = [
            EntityCategory::Class,
            EntityCategory::Struct,
            EntityCategory::Union,
            EntityCategory::Enum,
            EntityCategory::Function,
            EntityCategory::Method,
            EntityCategory::Typedef,
            EntityCategory::Alias,
            EntityCategory::Namespace,
            EntityCategory::Variable,
            EntityCategory::Field,
            EntityCategory::TemplateSpecialization,
        ];
        for category in categories {
            assert!(category.to_symbol_kind().is_some());
        }
        assert!(EntityCategory::Ignored.to_symbol_kind().is_none());
    }
}
