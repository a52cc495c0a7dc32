//! Replacement text derivation under the `RCase` policies.

use crate::models::{CaseMode, MatchSpan, Rule};

/// The literal text that replaces `span` under `rule`.
pub fn replacement_for(span: &MatchSpan, rule: &Rule) -> String {
    let authored = span.expanded.as_deref().unwrap_or(&rule.replace_text);
    apply_case(&span.text, authored, rule.replace_case)
}

/// Adjust `replacement` to the capitalization of `matched`.
///
/// Only letters count: leading punctuation such as the apostrophe of `'tis`
/// is skipped when looking for the initial capital. `Exact` keeps the
/// replacement verbatim. `Insensitive` only carries an initial capital
/// across. `Sentence` also lowercases everything after the first letter, and
/// lowercases the first letter when the match did not start with a capital.
pub fn apply_case(matched: &str, replacement: &str, mode: CaseMode) -> String {
    if replacement.is_empty() {
        return String::new();
    }

    let starts_upper = first_letter(matched).is_some_and(|(_, c)| c.is_uppercase());

    match mode {
        CaseMode::Exact => replacement.to_string(),
        CaseMode::Insensitive => {
            if starts_upper {
                capitalize_first(replacement)
            } else {
                replacement.to_string()
            }
        }
        CaseMode::Sentence => {
            let Some((i, first)) = first_letter(replacement) else {
                return replacement.to_lowercase();
            };
            let mut out = String::with_capacity(replacement.len());
            out.push_str(&replacement[..i]);
            if starts_upper {
                out.extend(first.to_uppercase());
            } else {
                out.extend(first.to_lowercase());
            }
            out.push_str(&replacement[i + first.len_utf8()..].to_lowercase());
            out
        }
    }
}

/// Byte offset and value of the first alphabetic character.
fn first_letter(text: &str) -> Option<(usize, char)> {
    text.char_indices().find(|(_, c)| c.is_alphabetic())
}

/// Uppercase the first letter, leaving everything else untouched.
pub fn capitalize_first(text: &str) -> String {
    match first_letter(text) {
        Some((i, first)) => {
            let mut out = String::with_capacity(text.len());
            out.push_str(&text[..i]);
            out.extend(first.to_uppercase());
            out.push_str(&text[i + first.len_utf8()..]);
            out
        }
        None => text.to_string(),
    }
}

/// Uppercase the first letter and lowercase everything after it.
pub fn sentence_case(text: &str) -> String {
    match first_letter(text) {
        Some((i, first)) => {
            let mut out = String::with_capacity(text.len());
            out.push_str(&text[..i]);
            out.extend(first.to_uppercase());
            out.push_str(&text[i + first.len_utf8()..].to_lowercase());
            out
        }
        None => text.to_string(),
    }
}
