//! The `Symbol` and `CallSite` record types (spec §3), adapted from the
//! teacher's `src/symbol/mod.rs` shape but widened to every field the
//! spec's data model names — USR-keyed rather than autoincrement-keyed,
//! since C/C++ symbol identity is supplied by the parser.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::{Access, FileId, Position, SymbolId, SymbolKind};

/// Full width record per spec §3 "Symbol". `is_definition` plus
/// `created_at`/`updated_at` back the definition-wins invariant and the
/// idempotent-reindex property (spec §8 invariant 5 excludes `updated_at`
/// from the equality check, not the record itself).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub file: FileId,
    pub position: Position,
    pub start_line: u32,
    pub end_line: u32,
    /// Separate declaration site, present when this record's `file`/
    /// `position` describe a definition that differs from where the
    /// entity was first declared.
    pub declaration_file: Option<FileId>,
    pub declaration_start_line: Option<u32>,
    pub declaration_end_line: Option<u32>,
    pub signature: String,
    pub is_project: bool,
    pub namespace: Option<String>,
    pub access: Access,
    pub parent_class: Option<String>,
    /// Ordered; canonicalized per spec §4.6 (aliases resolved to their
    /// canonical expansion before being recorded).
    pub base_classes: Vec<String>,
    pub is_definition: bool,
    pub brief_doc: Option<String>,
    pub full_doc: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Symbol {
    /// Whether two records describe the same entity and should be merged
    /// under the definition-wins invariant (spec §3).
    pub fn same_entity(&self, other: &Symbol) -> bool {
        self.id == other.id
    }

    /// True when `self` should replace `other` as the kept record for a
    /// shared id: a definition always wins over a declaration; among two
    /// declarations, the most recently seen one is kept.
    pub fn wins_over(&self, other: &Symbol) -> bool {
        match (self.is_definition, other.is_definition) {
            (true, false) => true,
            (false, true) => false,
            _ => true,
        }
    }
}

/// Tuple per spec §3 "Call site"; purely additive per source file and
/// fully replaced on that file's re-parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSite {
    pub caller_id: SymbolId,
    pub callee_id: SymbolId,
    pub file: FileId,
    pub line: u32,
    pub column: Option<u32>,
}

/// Wire-format counterpart of [`Symbol`] produced by a parse worker, which
/// has no database handle and so cannot resolve a [`FileId`]: `file` and
/// `declaration_file` are plain paths, resolved to surrogate ids by the
/// coordinator at apply time (spec §5 "write connection... never shared
/// with workers").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSymbol {
    pub id: SymbolId,
    pub name: String,
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub file: PathBuf,
    pub position: Position,
    pub start_line: u32,
    pub end_line: u32,
    pub declaration_file: Option<PathBuf>,
    pub declaration_start_line: Option<u32>,
    pub declaration_end_line: Option<u32>,
    pub signature: String,
    pub is_project: bool,
    pub namespace: Option<String>,
    pub access: Access,
    pub parent_class: Option<String>,
    pub base_classes: Vec<String>,
    pub is_definition: bool,
    pub brief_doc: Option<String>,
    pub full_doc: Option<String>,
}

impl RawSymbol {
    /// Resolves path fields to surrogate [`FileId`]s via `resolve`,
    /// stamping `created_at`/`updated_at` with `now` (the storage layer
    /// later overwrites `created_at` with any prior value, per
    /// [`crate::storage::symbols::upsert_definition_wins`]).
    pub fn into_symbol(self, mut resolve: impl FnMut(&std::path::Path) -> FileId, now: i64) -> Symbol {
        Symbol {
            id: self.id,
            name: self.name,
            qualified_name: self.qualified_name,
            kind: self.kind,
            file: resolve(&self.file),
            position: self.position,
            start_line: self.start_line,
            end_line: self.end_line,
            declaration_file: self.declaration_file.as_deref().map(&mut resolve),
            declaration_start_line: self.declaration_start_line,
            declaration_end_line: self.declaration_end_line,
            signature: self.signature,
            is_project: self.is_project,
            namespace: self.namespace,
            access: self.access,
            parent_class: self.parent_class,
            base_classes: self.base_classes,
            is_definition: self.is_definition,
            brief_doc: self.brief_doc,
            full_doc: self.full_doc,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Wire-format counterpart of [`CallSite`]; see [`RawSymbol`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCallSite {
    pub caller_id: SymbolId,
    pub callee_id: SymbolId,
    pub file: PathBuf,
    pub line: u32,
    pub column: Option<u32>,
}

impl RawCallSite {
    pub fn into_call_site(self, mut resolve: impl FnMut(&std::path::Path) -> FileId) -> CallSite {
        CallSite {
            caller_id: self.caller_id,
            callee_id: self.callee_id,
            file: resolve(&self.file),
            line: self.line,
            column: self.column,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(id: &str, is_definition: bool) -> Symbol {
        Symbol {
            id: SymbolId::new(id),
            name: "foo".into(),
            qualified_name: "ns::foo".into(),
            kind: SymbolKind::Function,
            file: FileId(1),
            position: Position::new(1, 1),
            start_line: 1,
            end_line: 1,
            declaration_file: None,
            declaration_start_line: None,
            declaration_end_line: None,
            signature: "void foo()".into(),
            is_project: true,
            namespace: Some("ns".into()),
            access: Access::Unspecified,
            parent_class: None,
            base_classes: Vec::new(),
            is_definition,
            brief_doc: None,
            full_doc: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn definition_wins_over_declaration() {
        let def = symbol("c:@F@foo#", true);
        let decl = symbol("c:@F@foo#", false);
        assert!(def.wins_over(&decl));
        assert!(!decl.wins_over(&def));
    }

    #[test]
    fn two_declarations_keep_the_latest() {
        let first = symbol("c:@F@foo#", false);
        let second = symbol("c:@F@foo#", false);
        assert!(second.wins_over(&first));
    }

    #[test]
    fn raw_symbol_resolves_paths_through_the_given_mapper() {
        let raw = RawSymbol {
            id: SymbolId::new("c:@F@foo#"),
            name: "foo".into(),
            qualified_name: "foo".into(),
            kind: SymbolKind::Function,
            file: PathBuf::from("/a.cpp"),
            position: Position::new(1, 1),
            start_line: 1,
            end_line: 1,
            declaration_file: Some(PathBuf::from("/a.h")),
            declaration_start_line: Some(2),
            declaration_end_line: Some(2),
            signature: "void foo()".into(),
            is_project: true,
            namespace: None,
            access: Access::Unspecified,
            parent_class: None,
            base_classes: Vec::new(),
            is_definition: true,
            brief_doc: None,
            full_doc: None,
        };
        let resolved = raw.into_symbol(
            |p| if p == std::path::Path::new("/a.cpp") { FileId(1) } else { FileId(2) },
            100,
        );
        assert_eq!(resolved.file, FileId(1));
        assert_eq!(resolved.declaration_file, Some(FileId(2)));
        assert_eq!(resolved.created_at, 100);
    }
}
