//! Field extraction from a libclang `Entity` cursor (spec §4.6): position,
//! documentation, access, parent class, and alias-resolved base classes.

use clang::{Accessibility, Entity};

use crate::types::{Access, Position};

/// Full doc comments are trimmed and truncated to 4000 characters; briefs
/// to 200 (spec §4.6).
pub const FULL_DOC_MAX_CHARS: usize = 4000;
pub const BRIEF_DOC_MAX_CHARS: usize = 200;

pub fn position(entity: &Entity<'_>) -> Position {
    entity
        .get_location()
        .map(|loc| {
            let point = loc.get_spelling_location();
            Position::new(point.line, point.column)
        })
        .unwrap_or(Position::new(0, 0))
}

/// `(start_line, end_line)` of the entity's full extent.
pub fn line_range(entity: &Entity<'_>) -> (u32, u32) {
    match entity.get_range() {
        Some(range) => {
            let start = range.get_start().get_spelling_location().line;
            let end = range.get_end().get_spelling_location().line;
            (start, end)
        }
        None => {
            let line = position(entity).line;
            (line, line)
        }
    }
}

/// Trims and truncates (brief, full) documentation, per the char limits
/// above. Truncation cuts on a char boundary, never mid-codepoint.
pub fn documentation(entity: &Entity<'_>) -> (Option<String>, Option<String>) {
    let brief = entity
        .get_comment_brief()
        .map(|c| truncate_chars(c.trim(), BRIEF_DOC_MAX_CHARS));
    let full = entity
        .get_comment()
        .map(|c| truncate_chars(c.trim(), FULL_DOC_MAX_CHARS));
    (brief, full)
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((byte_idx, _)) => s[..byte_idx].to_string(),
        None => s.to_string(),
    }
}

pub fn access(entity: &Entity<'_>) -> Access {
    match entity.get_accessibility() {
        Some(Accessibility::Public) => Access::Public,
        Some(Accessibility::Protected) => Access::Protected,
        Some(Accessibility::Private) => Access::Private,
        None => Access::Unspecified,
    }
}

/// Name of the enclosing class/struct, if `entity` is a member.
pub fn parent_class(entity: &Entity<'_>) -> Option<String> {
    use clang::EntityKind;
    let parent = entity.get_semantic_parent()?;
    match parent.get_kind() {
        EntityKind::ClassDecl | EntityKind::StructDecl | EntityKind::ClassTemplate => {
            parent.get_name()
        }
        _ => None,
    }
}

/// The nearest enclosing namespace's qualified name, e.g. `"outer::inner"`,
/// or `None` at global scope.
pub fn namespace(entity: &Entity<'_>) -> Option<String> {
    use clang::EntityKind;
    let mut parts = Vec::new();
    let mut current = entity.get_semantic_parent();
    while let Some(parent) = current {
        match parent.get_kind() {
            EntityKind::TranslationUnit => break,
            EntityKind::Namespace => {
                if let Some(name) = parent.get_name() {
                    parts.push(name);
                }
            }
            _ => {}
        }
        current = parent.get_semantic_parent();
    }
    if parts.is_empty() {
        None
    } else {
        parts.reverse();
        Some(parts.join("::"))
    }
}

/// Fully qualified name, built by walking `get_semantic_parent()` up to the
/// translation unit, prepending each namespace/class name.
pub fn qualified_name(entity: &Entity<'_>) -> String {
    use clang::EntityKind;
    let mut parts = Vec::new();
    if let Some(name) = entity.get_name() {
        parts.push(name);
    }
    let mut current = entity.get_semantic_parent();
    while let Some(parent) = current {
        match parent.get_kind() {
            EntityKind::TranslationUnit => break,
            EntityKind::Namespace | EntityKind::ClassDecl | EntityKind::StructDecl => {
                if let Some(name) = parent.get_name() {
                    parts.push(name);
                }
            }
            _ => {}
        }
        current = parent.get_semantic_parent();
    }
    parts.reverse();
    parts.join("::")
}

/// Ordered base-class names with alias bases resolved to their canonical
/// expansion: `class D : Container<Alias>` is recorded as
/// `Container<canonical(Alias)>` (spec §4.6).
pub fn base_classes(entity: &Entity<'_>) -> Vec<String> {
    use clang::EntityKind;
    entity
        .get_children()
        .into_iter()
        .filter(|child| child.get_kind() == EntityKind::BaseSpecifier)
        .filter(|base| !is_template_parameter_base(base))
        .map(|base| {
            base.get_type()
                .map(|ty| ty.get_canonical_type().get_display_name())
                .or_else(|| base.get_name())
                .unwrap_or_default()
        })
        .collect()
}

/// True when a base-specifier's type resolves to one of the enclosing
/// template's own type parameters rather than a concrete class: in
/// `template<typename Base> class Adapter : public Base`, `Base` names a
/// type parameter, not an unrelated `struct Base` elsewhere in the
/// project, and must never be recorded as a real base class.
fn is_template_parameter_base(base: &Entity<'_>) -> bool {
    use clang::EntityKind;
    base.get_type()
        .and_then(|ty| ty.get_declaration())
        .map(|decl| decl.get_kind() == EntityKind::TemplateTypeParameter)
        .unwrap_or(false)
}

/// Best-effort signature string: the entity's type display name when one
/// exists (functions/methods/variables), else the bare name.
pub fn signature(entity: &Entity<'_>) -> String {
    entity
        .get_type()
        .map(|ty| ty.get_display_name())
        .or_else(|| entity.get_name())
        .unwrap_or_default()
}

/// True when `entity` carries a body (spec §3 "is_definition").
pub fn is_definition(entity: &Entity<'_>) -> bool {
    entity.is_definition()
}

/// Separate declaration-site location, present only when the canonical
/// (first-seen) declaration of this entity sits at a different location
/// than `entity` itself — i.e. `entity` is the definition and a forward
/// declaration exists elsewhere.
pub fn declaration_site(entity: &Entity<'_>) -> Option<(Position, u32, u32)> {
    if !is_definition(entity) {
        return None;
    }
    let canonical = entity.get_canonical_entity();
    if canonical.get_location() == entity.get_location() {
        return None;
    }
    let (start, end) = line_range(&canonical);
    Some((position(&canonical), start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_chars_cuts_on_char_boundary() {
        let s = "a".repeat(10);
        assert_eq!(truncate_chars(&s, 5).chars().count(), 5);
        assert_eq!(truncate_chars("short", 50), "short");
    }

    #[test]
    fn truncate_chars_handles_multibyte_safely() {
        let s = "é".repeat(10);
        let truncated = truncate_chars(&s, 3);
        assert_eq!(truncated.chars().count(), 3);
    }
}
