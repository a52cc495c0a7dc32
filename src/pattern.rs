//! Search pattern compilation and span finding.
//!
//! Every rule is compiled once into a [`CompiledPattern`] before any text is
//! touched. Literal kinds (whole word, inside word, any) share one scanner;
//! regex rules go through the `regex` crate. Both report leftmost-first,
//! non-overlapping spans and honour the rule's context anchors.

use crate::case::sentence_case;
use crate::models::{CaseMode, MatchKind, MatchSpan, Rule};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PatternError {
    #[error("rule {rule}: invalid regular expression: {source}")]
    InvalidRegex {
        rule: String,
        #[source]
        source: regex::Error,
    },
    #[error("rule {rule}: {mode:?} case cannot be used with {kind:?} matching")]
    UnsupportedCaseMode {
        rule: String,
        mode: CaseMode,
        kind: MatchKind,
    },
    #[error("rule {rule}: sentence-case search text {search:?} must be lowercase")]
    SentenceCaseNotLowercase { rule: String, search: String },
}

static COMBINING_MARK: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\p{M}$").unwrap());

/// Letters, digits and combining marks make up words; `_` does not.
pub fn is_word_char(c: char) -> bool {
    if c.is_alphanumeric() {
        return true;
    }
    if c.is_ascii() {
        return false;
    }
    let mut buf = [0u8; 4];
    COMBINING_MARK.is_match(c.encode_utf8(&mut buf))
}

#[derive(Debug, Clone)]
enum Matcher {
    /// Byte-exact alternatives tried at each position (one, or two for sentence case)
    Literal(Vec<String>),
    /// Per-character case-folded comparison
    Folded(Vec<char>),
    Regex(Regex),
}

/// A rule's search side, ready to run against any number of lines
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    kind: MatchKind,
    matcher: Matcher,
    pre_text: String,
    post_text: String,
    /// Replacement template for regex rules (back-references expanded per match)
    template: Option<String>,
}

impl CompiledPattern {
    pub fn compile(rule: &Rule) -> Result<Self, PatternError> {
        let matcher = match (rule.match_kind, rule.search_case) {
            (MatchKind::Regex, CaseMode::Sentence) => {
                return Err(PatternError::UnsupportedCaseMode {
                    rule: rule.label(),
                    mode: rule.search_case,
                    kind: rule.match_kind,
                });
            }
            (MatchKind::Regex, case) => {
                let regex = RegexBuilder::new(&rule.search_text)
                    .case_insensitive(case == CaseMode::Insensitive)
                    .build()
                    .map_err(|source| PatternError::InvalidRegex {
                        rule: rule.label(),
                        source,
                    })?;
                Matcher::Regex(regex)
            }
            (_, CaseMode::Exact) => Matcher::Literal(vec![rule.search_text.clone()]),
            (_, CaseMode::Insensitive) => {
                Matcher::Folded(rule.search_text.chars().map(fold).collect())
            }
            (_, CaseMode::Sentence) => {
                if rule.search_text != rule.search_text.to_lowercase() {
                    return Err(PatternError::SentenceCaseNotLowercase {
                        rule: rule.label(),
                        search: rule.search_text.clone(),
                    });
                }
                let mut variants = vec![rule.search_text.clone()];
                let capitalized = sentence_case(&rule.search_text);
                if capitalized != rule.search_text {
                    variants.push(capitalized);
                }
                Matcher::Literal(variants)
            }
        };

        Ok(CompiledPattern {
            kind: rule.match_kind,
            matcher,
            pre_text: rule.pre_text.clone(),
            post_text: rule.post_text.clone(),
            template: rule.is_regex().then(|| rule.replace_text.clone()),
        })
    }

    /// All accepted spans in `text`, leftmost first, never overlapping.
    pub fn find_all(&self, text: &str) -> Vec<MatchSpan> {
        match &self.matcher {
            Matcher::Regex(regex) => self.find_all_regex(regex, text),
            _ => self.find_all_literal(text),
        }
    }

    fn find_all_literal(&self, text: &str) -> Vec<MatchSpan> {
        let mut spans = Vec::new();
        let mut pos = 0;

        while pos < text.len() {
            let Some((start, end)) = self.next_candidate(text, pos) else {
                break;
            };
            if self.accepts(text, start, end) {
                spans.push(MatchSpan::new(text, start, end));
                pos = end;
            } else {
                // Rejected candidates consume nothing but their first character
                pos = next_boundary(text, start);
            }
        }

        spans
    }

    /// Earliest literal occurrence at or after `pos`.
    fn next_candidate(&self, text: &str, pos: usize) -> Option<(usize, usize)> {
        match &self.matcher {
            Matcher::Literal(variants) => variants
                .iter()
                .filter_map(|v| text[pos..].find(v.as_str()).map(|i| (pos + i, pos + i + v.len())))
                .min_by_key(|&(start, _)| start),
            Matcher::Folded(needle) => text[pos..]
                .char_indices()
                .find_map(|(i, _)| folded_match_end(text, pos + i, needle).map(|end| (pos + i, end))),
            Matcher::Regex(_) => None,
        }
    }

    fn find_all_regex(&self, regex: &Regex, text: &str) -> Vec<MatchSpan> {
        let mut spans: Vec<MatchSpan> = Vec::new();
        let mut pos = 0;

        while pos <= text.len() {
            let Some(caps) = regex.captures_at(text, pos) else {
                break;
            };
            let Some(m) = caps.get(0) else {
                break;
            };
            let (start, end) = (m.start(), m.end());
            let touches_previous = start == end && spans.last().is_some_and(|s| s.end == start);

            if !touches_previous && self.accepts(text, start, end) {
                let mut span = MatchSpan::new(text, start, end);
                if let Some(template) = &self.template {
                    let mut expanded = String::new();
                    caps.expand(template, &mut expanded);
                    span.expanded = Some(expanded);
                }
                spans.push(span);
                pos = if start == end { next_boundary(text, end) } else { end };
            } else {
                pos = next_boundary(text, start);
            }
        }

        spans
    }

    /// Context anchors and word-boundary discipline for a candidate span.
    fn accepts(&self, text: &str, start: usize, end: usize) -> bool {
        if !self.pre_text.is_empty() && !text[..start].ends_with(&self.pre_text) {
            return false;
        }
        if !self.post_text.is_empty() && !text[end..].starts_with(&self.post_text) {
            return false;
        }

        let word_before = text[..start].chars().next_back().is_some_and(is_word_char);
        let word_after = text[end..].chars().next().is_some_and(is_word_char);

        match self.kind {
            MatchKind::WholeWord => !word_before && !word_after,
            MatchKind::InsideWord => word_before || word_after,
            MatchKind::Any | MatchKind::Regex => true,
        }
    }
}

fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

/// End offset when `needle` matches `text` at `start` ignoring case.
fn folded_match_end(text: &str, start: usize, needle: &[char]) -> Option<usize> {
    let mut chars = text[start..].char_indices();
    for &expected in needle {
        let (_, c) = chars.next()?;
        if fold(c) != expected {
            return None;
        }
    }
    Some(chars.next().map_or(text.len(), |(i, _)| start + i))
}

/// Offset of the character after the one starting at `pos` (or one past the end).
fn next_boundary(text: &str, pos: usize) -> usize {
    text[pos..]
        .chars()
        .next()
        .map_or(text.len() + 1, |c| pos + c.len_utf8())
}
