//! Rule application orchestration.
//!
//! This module runs a compiled rule list over documents: scope filtering,
//! ordered matching, case-aware rewriting and per-rule bookkeeping. One
//! document is a strict per-line fold; independent documents run in parallel.

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::case::replacement_for;
use crate::models::*;
use crate::pattern::{CompiledPattern, PatternError};
use crate::scope::{book_in_scope, in_scope};
use crate::usfm::UsfmDocument;

/// Failure of one rule on one line; the rule is switched off for the rest
/// of the document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeMatchError {
    #[error("regex evaluation took {elapsed:?}, over the {limit:?} limit")]
    Timeout { elapsed: Duration, limit: Duration },
    #[error("still rewriting the line after {passes} repeat passes")]
    RepeatLimit { passes: usize },
}

/// A rule together with its compiled search side
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: Rule,
    pub pattern: CompiledPattern,
}

/// What one rule did to one line.
#[derive(Debug, Default)]
struct RuleOutcome {
    text: String,
    matches: u64,
    substitutions: u64,
}

/// An immutable, compiled rule list plus the options it runs with.
///
/// Compiling happens once, before any document is seen; a bad rule fails
/// the whole construction.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: Vec<CompiledRule>,
    options: ApplyOptions,
}

impl RuleEngine {
    pub fn new(rules: Vec<Rule>, options: ApplyOptions) -> Result<Self, PatternError> {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let pattern = CompiledPattern::compile(&rule)?;
                Ok(CompiledRule { rule, pattern })
            })
            .collect::<Result<Vec<_>, PatternError>>()?;

        debug!("Compiled {} rules", rules.len());
        Ok(RuleEngine { rules, options })
    }

    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter().map(|c| &c.rule)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply every rule to every line, in table order, each rule seeing the
    /// output of the rules before it.
    pub fn apply_lines(&self, lines: &[DocumentLine]) -> DocumentResult {
        let enabled: Vec<bool> = self
            .rules
            .iter()
            .map(|c| self.options.selects(&c.rule))
            .collect();
        self.run(lines, enabled)
    }

    /// Apply the rules to a parsed book. Rules excluded by book are dropped
    /// before the line loop.
    pub fn apply_document(&self, document: &UsfmDocument) -> (UsfmDocument, ApplicationReport) {
        let enabled: Vec<bool> = self
            .rules
            .iter()
            .map(|c| self.options.selects(&c.rule) && book_in_scope(&c.rule, &document.book_code))
            .collect();

        let DocumentResult { lines, mut report } = self.run(&document.lines, enabled);
        report.book_code = document.book_code.clone();
        (document.with_texts(lines), report)
    }

    fn run(&self, lines: &[DocumentLine], mut enabled: Vec<bool>) -> DocumentResult {
        let mut report = ApplicationReport {
            book_code: lines.first().map(|l| l.book_code.clone()).unwrap_or_default(),
            line_count: lines.len(),
            lines_changed: 0,
            rules: self
                .rules
                .iter()
                .zip(&enabled)
                .map(|(c, &on)| RuleStats {
                    index: c.rule.index,
                    table: c.rule.table.clone(),
                    name: c.rule.name.clone(),
                    search: c.rule.search_text.clone(),
                    enabled: on,
                    ..Default::default()
                })
                .collect(),
            warnings: Vec::new(),
        };

        let mut output = Vec::with_capacity(lines.len());

        for (line_index, line) in lines.iter().enumerate() {
            let mut text = line.text.clone();

            for (slot, compiled) in self.rules.iter().enumerate() {
                if !enabled[slot] || !in_scope(&compiled.rule, line) {
                    continue;
                }

                match self.apply_rule(compiled, &text) {
                    Ok(outcome) => {
                        let stats = &mut report.rules[slot];
                        stats.matches += outcome.matches;
                        stats.substitutions += outcome.substitutions;
                        if outcome.text != text {
                            stats.lines_touched += 1;
                            debug!(
                                "{} rewrote {}: {:?} -> {:?}",
                                compiled.rule.label(),
                                line.book_reference().unwrap_or_else(|| line.book_code.clone()),
                                text,
                                outcome.text
                            );
                            text = outcome.text;
                        }
                    }
                    Err(err) => {
                        enabled[slot] = false;
                        let warning = RuleWarning {
                            rule_index: compiled.rule.index,
                            rule: compiled.rule.label(),
                            book_code: line.book_code.clone(),
                            line_index,
                            reference: line.reference.clone(),
                            message: err.to_string(),
                        };
                        warn!("{}", warning);
                        report.warnings.push(warning);
                    }
                }
            }

            if text != line.text {
                report.lines_changed += 1;
            }
            output.push(text);
        }

        info!(
            "{}: {} substitutions on {} of {} lines",
            report.book_code,
            report.total_substitutions(),
            report.lines_changed,
            report.line_count
        );

        DocumentResult {
            lines: output,
            report,
        }
    }

    /// Run one rule over one line, repeating when the rule asks for it.
    fn apply_rule(&self, compiled: &CompiledRule, text: &str) -> Result<RuleOutcome, RuntimeMatchError> {
        let started = Instant::now();
        let mut outcome = RuleOutcome {
            text: text.to_string(),
            ..Default::default()
        };
        let mut passes = 0;

        loop {
            passes += 1;
            let spans = compiled.pattern.find_all(&outcome.text);

            if let Some(limit) = self.options.regex_time_limit {
                let elapsed = started.elapsed();
                if compiled.rule.is_regex() && elapsed >= limit {
                    return Err(RuntimeMatchError::Timeout { elapsed, limit });
                }
            }
            if spans.is_empty() {
                break;
            }

            let (rewritten, substitutions) = rewrite(&outcome.text, &spans, &compiled.rule);
            outcome.matches += spans.len() as u64;
            outcome.substitutions += substitutions;

            let changed = rewritten != outcome.text;
            outcome.text = rewritten;
            if !compiled.rule.repeat || !changed {
                break;
            }
            if passes >= self.options.max_repeat_passes {
                return Err(RuntimeMatchError::RepeatLimit { passes });
            }
        }

        Ok(outcome)
    }
}

/// Splice replacements for `spans` into `text`. Returns the new text and the
/// number of spans whose replacement differed from what was matched.
pub fn rewrite(text: &str, spans: &[MatchSpan], rule: &Rule) -> (String, u64) {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut substitutions = 0;

    for span in spans {
        out.push_str(&text[last..span.start]);
        let replacement = replacement_for(span, rule);
        if replacement != span.text {
            substitutions += 1;
        }
        out.push_str(&replacement);
        last = span.end;
    }
    out.push_str(&text[last..]);

    (out, substitutions)
}

/// Apply the engine to several books in parallel. Results keep input order.
pub fn apply_documents(
    engine: &RuleEngine,
    documents: &[UsfmDocument],
    show_progress: bool,
) -> Vec<(UsfmDocument, ApplicationReport)> {
    let progress = if show_progress {
        let pb = ProgressBar::new(documents.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let results: Vec<(UsfmDocument, ApplicationReport)> = documents
        .par_iter()
        .map(|document| {
            let result = engine.apply_document(document);
            if let Some(ref pb) = progress {
                pb.set_message(document.book_code.clone());
                pb.inc(1);
            }
            result
        })
        .collect();

    if let Some(pb) = progress {
        pb.finish_with_message("Done");
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::parse_rule_table;
    use crate::table::COLUMNS;

    fn table(rows: &[&[(usize, &str)]]) -> Vec<Rule> {
        let mut text = COLUMNS.join("\t");
        text.push('\n');
        for row in rows {
            let mut cells = vec![""; COLUMNS.len()];
            for &(i, value) in row.iter() {
                cells[i] = value;
            }
            text.push_str(&cells.join("\t"));
            text.push('\n');
        }
        parse_rule_table("test", &text).unwrap()
    }

    fn engine(rows: &[&[(usize, &str)]]) -> RuleEngine {
        RuleEngine::new(table(rows), ApplyOptions::default()).unwrap()
    }

    fn verse_line(text: &str) -> DocumentLine {
        DocumentLine::new("GEN", "v", Some("1:1"), text)
    }

    #[test]
    fn test_color_scenario() {
        let engine = engine(&[&[(0, "w"), (8, "-i"), (9, "color"), (12, "colour")]]);
        let result = engine.apply_lines(&[verse_line("Color and color")]);

        assert_eq!(result.lines, vec!["Colour and colour"]);
        assert_eq!(result.report.rules[0].substitutions, 2);
        assert_eq!(result.report.rules[0].matches, 2);
        assert_eq!(result.report.rules[0].lines_touched, 1);
        assert_eq!(result.report.lines_changed, 1);
    }

    #[test]
    fn test_rule_order_is_cumulative() {
        let cat: &[(usize, &str)] = &[(0, "w"), (9, "cat"), (12, "dog")];
        let dog: &[(usize, &str)] = &[(0, "w"), (9, "dog"), (12, "fish")];

        let forward = engine(&[cat, dog]).apply_lines(&[verse_line("cat")]);
        assert_eq!(forward.lines, vec!["fish"]);

        let reversed = engine(&[dog, cat]).apply_lines(&[verse_line("cat")]);
        assert_eq!(reversed.lines, vec!["dog"]);
    }

    #[test]
    fn test_deletion_leaves_no_gap() {
        let engine = engine(&[&[(0, "a"), (9, "\\add*")]]);
        let result = engine.apply_lines(&[verse_line("in \\add the\\add* beginning\\add*.")]);
        assert_eq!(result.lines, vec!["in \\add the beginning."]);
        assert_eq!(result.report.rules[0].substitutions, 2);
    }

    #[test]
    fn test_empty_engine_is_identity() {
        let empty = RuleEngine::new(Vec::new(), ApplyOptions::default()).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.len(), 0);

        let result = empty.apply_lines(&[verse_line("In the beginning")]);
        assert_eq!(result.lines, vec!["In the beginning"]);
        assert!(!result.report.changed());
        assert!(!engine(&[&[(9, "a"), (12, "b")]]).is_empty());
    }

    #[test]
    fn test_no_matches_is_identity() {
        let engine = engine(&[&[(0, "w"), (9, "zebra"), (12, "horse")]]);
        let lines = vec![verse_line("In the beginning  God\u{00a0}created."), verse_line("")];
        let result = engine.apply_lines(&lines);
        assert_eq!(result.lines[0], lines[0].text);
        assert_eq!(result.lines[1], "");
        assert!(!result.report.changed());
    }

    #[test]
    fn test_out_of_scope_lines_untouched() {
        let engine = engine(&[&[(0, "a"), (3, "v"), (9, "LORD"), (12, "Yahweh")]]);
        let lines = vec![
            DocumentLine::new("GEN", "s1", None, "The LORD speaks"),
            verse_line("the LORD said"),
        ];
        let result = engine.apply_lines(&lines);
        assert_eq!(result.lines, vec!["The LORD speaks", "the Yahweh said"]);
    }

    #[test]
    fn test_identity_replacement_counts_match_only() {
        let engine = engine(&[&[(0, "w"), (8, "-i"), (9, "god"), (11, "-c"), (12, "God")]]);
        let result = engine.apply_lines(&[verse_line("God and god")]);
        assert_eq!(result.lines, vec!["God and God"]);
        assert_eq!(result.report.rules[0].matches, 2);
        assert_eq!(result.report.rules[0].substitutions, 1);
    }

    #[test]
    fn test_regex_backreference_rule() {
        let engine = engine(&[&[(0, "r"), (9, r"(\w+)eth\b"), (12, "${1}s")]]);
        let result = engine.apply_lines(&[verse_line("he goeth and saith")]);
        assert_eq!(result.lines, vec!["he gos and saith"]);
    }

    #[test]
    fn test_repeat_rule() {
        let engine = engine(&[&[(0, "al"), (9, "  "), (12, " ")]]);
        let result = engine.apply_lines(&[verse_line("a     b")]);
        assert_eq!(result.lines, vec!["a b"]);
        assert!(result.report.warnings.is_empty());
    }

    #[test]
    fn test_repeat_limit_disables_rule() {
        let rules = table(&[&[(0, "al"), (9, "a"), (12, "aa"), (13, "grow")]]);
        let options = ApplyOptions {
            max_repeat_passes: 4,
            ..Default::default()
        };
        let engine = RuleEngine::new(rules, options).unwrap();
        let result = engine.apply_lines(&[verse_line("a"), verse_line("a")]);

        // Offending line is left as it was and the rule stays off afterwards
        assert_eq!(result.lines, vec!["a", "a"]);
        assert_eq!(result.report.warnings.len(), 1);
        assert_eq!(result.report.warnings[0].reference.as_deref(), Some("1:1"));
        assert!(result.report.warnings[0].message.contains("4 repeat passes"));
    }

    #[test]
    fn test_regex_time_limit() {
        let rules = table(&[&[(0, "r"), (9, "a+"), (12, "b")]]);
        let options = ApplyOptions {
            regex_time_limit: Some(Duration::ZERO),
            ..Default::default()
        };
        let engine = RuleEngine::new(rules, options).unwrap();
        let result = engine.apply_lines(&[verse_line("aaa")]);
        assert_eq!(result.lines, vec!["aaa"]);
        assert_eq!(result.report.warnings.len(), 1);
        assert!(result.report.warnings[0].message.contains("limit"));
    }

    #[test]
    fn test_name_selection() {
        let rules = table(&[
            &[(0, "a"), (9, "a"), (12, "b"), (13, "first")],
            &[(0, "a"), (9, "c"), (12, "d"), (13, "second")],
            &[(0, "a"), (9, "e"), (12, "f")],
        ]);

        let only = ApplyOptions {
            only: vec!["second".to_string()],
            ..Default::default()
        };
        let result = RuleEngine::new(rules.clone(), only).unwrap().apply_lines(&[verse_line("ace")]);
        assert_eq!(result.lines, vec!["ade"]);
        assert!(!result.report.rules[0].enabled);

        let skip = ApplyOptions {
            skip: vec!["first".to_string()],
            ..Default::default()
        };
        let result = RuleEngine::new(rules, skip).unwrap().apply_lines(&[verse_line("ace")]);
        assert_eq!(result.lines, vec!["adf"]);
    }

    #[test]
    fn test_compile_failure_is_fatal() {
        let rules = table(&[&[(0, "a"), (9, "ok")], &[(0, "r"), (9, "[bad")]]);
        let err = RuleEngine::new(rules, ApplyOptions::default()).unwrap_err();
        assert!(matches!(err, PatternError::InvalidRegex { .. }));
    }

    #[test]
    fn test_counts_accumulate_across_lines() {
        let engine = engine(&[&[(0, "w"), (9, "thee"), (12, "you"), (13, "thee")]]);
        let lines = vec![verse_line("thee and thee"), verse_line("nothing"), verse_line("thee")];
        let report = engine.apply_lines(&lines).report;
        let stats = report.rule_named("thee").unwrap();
        assert_eq!(stats.substitutions, 3);
        assert_eq!(stats.lines_touched, 2);
        assert_eq!(report.lines_changed, 2);
    }
}
