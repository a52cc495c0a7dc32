//! Book, marker and reference scoping of rules.

use crate::models::{DocumentLine, Rule};

/// Whether `rule` may touch `line`.
///
/// Each dimension is an include set (empty means everything) and an exclude
/// set; exclusion always wins. A rule with included references only ever
/// applies to verse-bearing lines. References match either as `C:V` or
/// book-qualified as `BOOK_C:V`.
pub fn in_scope(rule: &Rule, line: &DocumentLine) -> bool {
    if !rule.include_books.is_empty() && !rule.include_books.contains(&line.book_code) {
        return false;
    }
    if rule.exclude_books.contains(&line.book_code) {
        return false;
    }

    if !rule.include_markers.is_empty() && !rule.include_markers.contains(&line.marker) {
        return false;
    }
    if rule.exclude_markers.contains(&line.marker) {
        return false;
    }

    let refs = line_refs(line);
    if !rule.include_refs.is_empty() {
        let Some((reference, qualified)) = &refs else {
            return false;
        };
        if !rule.include_refs.contains(reference) && !rule.include_refs.contains(qualified) {
            return false;
        }
    }
    if let Some((reference, qualified)) = &refs {
        if rule.exclude_refs.contains(reference) || rule.exclude_refs.contains(qualified) {
            return false;
        }
    }

    true
}

/// Whether the rule restricts by book only, so the whole book can be
/// accepted or rejected before looking at its lines.
pub fn book_in_scope(rule: &Rule, book_code: &str) -> bool {
    (rule.include_books.is_empty() || rule.include_books.contains(book_code))
        && !rule.exclude_books.contains(book_code)
}

fn line_refs(line: &DocumentLine) -> Option<(String, String)> {
    let reference = line.reference.clone()?;
    let qualified = format!("{}_{}", line.book_code, reference);
    Some((reference, qualified))
}
