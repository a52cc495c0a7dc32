//! Data structures for the scripted editing pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// Matching discipline, taken from the first letter of the `Type` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchKind {
    /// `w`: literal, never adjacent to a word character
    WholeWord,
    /// `i`: literal, only as a fragment inside a longer word
    InsideWord,
    /// `a`: plain substring
    Any,
    /// `r`: regular expression
    Regex,
}

impl MatchKind {
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'w' => Some(MatchKind::WholeWord),
            'i' => Some(MatchKind::InsideWord),
            'a' => Some(MatchKind::Any),
            'r' => Some(MatchKind::Regex),
            _ => None,
        }
    }

    pub fn code(self) -> char {
        match self {
            MatchKind::WholeWord => 'w',
            MatchKind::InsideWord => 'i',
            MatchKind::Any => 'a',
            MatchKind::Regex => 'r',
        }
    }
}

/// Case policy for the `SCase` and `RCase` columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CaseMode {
    /// `-i`
    Insensitive,
    /// `-c`
    #[default]
    Exact,
    /// `-s`: lowercase, or lowercase with an initial capital
    Sentence,
}

impl CaseMode {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "-i" => Some(CaseMode::Insensitive),
            "-c" => Some(CaseMode::Exact),
            "-s" => Some(CaseMode::Sentence),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            CaseMode::Insensitive => "-i",
            CaseMode::Exact => "-c",
            CaseMode::Sentence => "-s",
        }
    }
}

/// One row of an edit table after parsing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub index: usize,       // Position in the combined rule list
    pub table: String,      // Name of the table the row came from
    pub line_number: usize, // 1-based line (or sheet row) in that table
    pub match_kind: MatchKind,
    pub repeat: bool, // Second Type letter `l`
    pub include_books: BTreeSet<String>,
    pub exclude_books: BTreeSet<String>,
    pub include_markers: BTreeSet<String>,
    pub exclude_markers: BTreeSet<String>,
    pub include_refs: BTreeSet<String>,
    pub exclude_refs: BTreeSet<String>,
    pub pre_text: String,
    pub post_text: String,
    pub search_case: CaseMode,
    pub search_text: String,
    pub replace_case: CaseMode,
    pub replace_text: String,
    pub name: Option<String>,
    pub comment: String,
}

impl Rule {
    pub fn is_regex(&self) -> bool {
        self.match_kind == MatchKind::Regex
    }

    /// Short identification used in errors, warnings and logs.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => format!("#{} '{}' ({}:{})", self.index, name, self.table, self.line_number),
            None => format!("#{} ({}:{})", self.index, self.table, self.line_number),
        }
    }

    /// The `Type` column as it would be written back to a table.
    pub fn type_code(&self) -> String {
        let mut code = self.match_kind.code().to_string();
        if self.repeat {
            code.push('l');
        }
        code
    }
}

/// One structurally tagged line of a book
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentLine {
    pub book_code: String,
    pub marker: String,
    pub reference: Option<String>, // "C:V" on verse-bearing lines
    pub text: String,
}

impl DocumentLine {
    pub fn new(
        book_code: impl Into<String>,
        marker: impl Into<String>,
        reference: Option<&str>,
        text: impl Into<String>,
    ) -> Self {
        DocumentLine {
            book_code: book_code.into(),
            marker: marker.into(),
            reference: reference.map(str::to_string),
            text: text.into(),
        }
    }

    /// The reference qualified with the book code, e.g. `GEN_1:3`.
    pub fn book_reference(&self) -> Option<String> {
        self.reference
            .as_ref()
            .map(|reference| format!("{}_{}", self.book_code, reference))
    }
}

/// A half-open byte range of a line matched by a rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSpan {
    pub start: usize,
    pub end: usize,
    pub text: String,
    /// Regex replacement with back-references already expanded
    pub expanded: Option<String>,
}

impl MatchSpan {
    pub fn new(line: &str, start: usize, end: usize) -> Self {
        MatchSpan {
            start,
            end,
            text: line[start..end].to_string(),
            expanded: None,
        }
    }
}

/// Options that control a run over one or more documents
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// When non-empty, only rules with one of these names run
    pub only: Vec<String>,
    /// Rules with one of these names never run
    pub skip: Vec<String>,
    /// Upper bound for evaluating one regex rule on one line
    pub regex_time_limit: Option<Duration>,
    /// Passes allowed for a repeating rule on a single line
    pub max_repeat_passes: usize,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            only: Vec::new(),
            skip: Vec::new(),
            regex_time_limit: None,
            max_repeat_passes: 32,
        }
    }
}

impl ApplyOptions {
    /// Whether the name filters let this rule run.
    pub fn selects(&self, rule: &Rule) -> bool {
        let name = rule.name.as_deref();
        if !self.only.is_empty() && !name.is_some_and(|n| self.only.iter().any(|o| o == n)) {
            return false;
        }
        !name.is_some_and(|n| self.skip.iter().any(|s| s == n))
    }
}

/// Counters for one rule over a document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleStats {
    pub index: usize,
    pub table: String,
    pub name: Option<String>,
    pub search: String,
    pub enabled: bool,
    pub lines_touched: u64,
    pub matches: u64,
    pub substitutions: u64, // Matches whose replacement differed from the matched text
}

/// A rule that failed while matching and was switched off for the rest of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleWarning {
    pub rule_index: usize,
    pub rule: String,
    pub book_code: String,
    pub line_index: usize,
    pub reference: Option<String>,
    pub message: String,
}

impl fmt::Display for RuleWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let location = match &self.reference {
            Some(reference) => format!("{}_{}", self.book_code, reference),
            None => format!("{} line {}", self.book_code, self.line_index + 1),
        };
        write!(f, "rule {} disabled at {}: {}", self.rule, location, self.message)
    }
}

/// Per-rule counters accumulated over one document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationReport {
    pub book_code: String,
    pub line_count: usize,
    pub lines_changed: usize,
    pub rules: Vec<RuleStats>,
    pub warnings: Vec<RuleWarning>,
}

impl ApplicationReport {
    pub fn total_matches(&self) -> u64 {
        self.rules.iter().map(|r| r.matches).sum()
    }

    pub fn total_substitutions(&self) -> u64 {
        self.rules.iter().map(|r| r.substitutions).sum()
    }

    pub fn rule(&self, index: usize) -> Option<&RuleStats> {
        self.rules.iter().find(|r| r.index == index)
    }

    pub fn rule_named(&self, name: &str) -> Option<&RuleStats> {
        self.rules.iter().find(|r| r.name.as_deref() == Some(name))
    }

    /// Whether any line of the document was rewritten.
    pub fn changed(&self) -> bool {
        self.lines_changed > 0
    }
}

/// Transformed texts of a document, one per input line, plus its report
#[derive(Debug, Clone)]
pub struct DocumentResult {
    pub lines: Vec<String>,
    pub report: ApplicationReport,
}

/// Summary of a batch run over many documents
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub version: String,
    pub generated_at: String,
    pub rule_count: usize,
    pub documents: Vec<ApplicationReport>,
    pub files_written: usize,
}

impl BatchSummary {
    pub fn total_substitutions(&self) -> u64 {
        self.documents.iter().map(|d| d.total_substitutions()).sum()
    }

    pub fn warning_count(&self) -> usize {
        self.documents.iter().map(|d| d.warnings.len()).sum()
    }
}
