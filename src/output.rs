//! Output formatting for edit reports (JSON, CSV, console).

use crate::models::{ApplicationReport, BatchSummary, Rule, RuleWarning};
use serde::Serialize;
use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Write a report (or a batch summary) as pretty JSON.
pub fn write_json<T: Serialize, W: Write>(value: &T, writer: &mut W) -> Result<(), OutputError> {
    let json = serde_json::to_string_pretty(value)?;
    writer.write_all(json.as_bytes())?;
    Ok(())
}

/// Write a report (or a batch summary) as JSON to a file.
pub fn write_json_file<T: Serialize>(value: &T, path: &Path) -> Result<(), OutputError> {
    let mut file = std::fs::File::create(path)?;
    write_json(value, &mut file)
}

/// Write per-rule counters as CSV, one row per book and rule.
pub fn write_csv<W: Write>(reports: &[ApplicationReport], writer: &mut W) -> Result<(), OutputError> {
    writeln!(
        writer,
        "book,rule_index,table,name,search,enabled,lines_touched,matches,substitutions"
    )?;

    for report in reports {
        for stats in &report.rules {
            writeln!(
                writer,
                "{},{},{},{},{},{},{},{},{}",
                csv_field(&report.book_code),
                stats.index,
                csv_field(&stats.table),
                csv_field(stats.name.as_deref().unwrap_or("")),
                csv_field(&stats.search),
                stats.enabled,
                stats.lines_touched,
                stats.matches,
                stats.substitutions
            )?;
        }
    }

    Ok(())
}

/// Quote a CSV field, doubling any embedded quotes (RFC 4180).
pub fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Write per-rule counters as CSV to a file.
pub fn write_csv_file(reports: &[ApplicationReport], path: &Path) -> Result<(), OutputError> {
    let mut file = std::fs::File::create(path)?;
    write_csv(reports, &mut file)
}

/// Write a batch summary to stdout.
pub fn print_summary(summary: &BatchSummary) {
    println!("\n=== Edit Summary ===");
    println!("Version: {}", summary.version);
    println!("Generated: {}", summary.generated_at);
    println!();
    println!("Rules: {}", summary.rule_count);
    println!("Books: {}", summary.documents.len());
    println!("Files written: {}", summary.files_written);
    println!();
    for report in &summary.documents {
        println!("  {}", format_report_line(report));
    }
    println!();
    println!("Total substitutions: {}", summary.total_substitutions());
    println!("Warnings: {}", summary.warning_count());
}

/// Write a single book's report to stdout.
pub fn print_report(report: &ApplicationReport) {
    println!("\n=== Edit Report ===");
    println!("{}", format_report_line(report));
    println!();
    println!("Rules that matched:");
    for stats in report.rules.iter().filter(|s| s.matches > 0) {
        println!(
            "  #{:<4} {:<24} matches={:<6} subs={:<6} lines={}",
            stats.index,
            stats.name.as_deref().unwrap_or(&stats.search),
            stats.matches,
            stats.substitutions,
            stats.lines_touched
        );
    }
    print_warnings(&report.warnings);
}

/// Write rule warnings to stderr.
pub fn print_warnings(warnings: &[RuleWarning]) {
    for warning in warnings {
        eprintln!("Warning: {}", warning);
    }
}

/// One-line book summary.
pub fn format_report_line(report: &ApplicationReport) -> String {
    format!(
        "{}: {} of {} lines changed, {} substitutions ({} matches){}",
        report.book_code,
        report.lines_changed,
        report.line_count,
        report.total_substitutions(),
        report.total_matches(),
        match report.warnings.len() {
            0 => String::new(),
            n => format!(", {} warnings", n),
        }
    )
}

/// Format a rule the way it reads in a table, for listings.
pub fn format_rule(rule: &Rule) -> String {
    let mut scope = Vec::new();
    for (label, set) in [
        ("books", &rule.include_books),
        ("!books", &rule.exclude_books),
        ("markers", &rule.include_markers),
        ("!markers", &rule.exclude_markers),
        ("refs", &rule.include_refs),
        ("!refs", &rule.exclude_refs),
    ] {
        if !set.is_empty() {
            let items: Vec<&str> = set.iter().map(String::as_str).collect();
            scope.push(format!("{}={}", label, items.join(",")));
        }
    }

    let mut line = format!(
        "{} {:<2} {} {:?} -> {} {:?}",
        rule.label(),
        rule.type_code(),
        rule.search_case.code(),
        rule.search_text,
        rule.replace_case.code(),
        rule.replace_text
    );
    if !rule.pre_text.is_empty() || !rule.post_text.is_empty() {
        line.push_str(&format!(" [pre={:?} post={:?}]", rule.pre_text, rule.post_text));
    }
    if !scope.is_empty() {
        line.push_str(&format!(" [{}]", scope.join(" ")));
    }
    line
}

/// Print rules in table order.
pub fn print_rules(rules: &[Rule], limit: Option<usize>) {
    let to_print = match limit {
        Some(n) => &rules[..n.min(rules.len())],
        None => rules,
    };

    for rule in to_print {
        println!("{}", format_rule(rule));
    }

    if let Some(n) = limit {
        if rules.len() > n {
            println!("... and {} more rules", rules.len() - n);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RuleStats;
    use crate::table::parse_rule_row;

    fn sample_report() -> ApplicationReport {
        ApplicationReport {
            book_code: "GEN".to_string(),
            line_count: 10,
            lines_changed: 2,
            rules: vec![
                RuleStats {
                    index: 0,
                    table: "words".to_string(),
                    name: Some("thee".to_string()),
                    search: "thee".to_string(),
                    enabled: true,
                    lines_touched: 2,
                    matches: 3,
                    substitutions: 3,
                },
                RuleStats {
                    index: 1,
                    table: "words".to_string(),
                    name: None,
                    search: "a, \"b\"".to_string(),
                    enabled: false,
                    ..Default::default()
                },
            ],
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_write_json() {
        let report = sample_report();
        let mut buffer = Vec::new();
        write_json(&report, &mut buffer).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(value["book_code"], "GEN");
        assert_eq!(value["rules"][0]["substitutions"], 3);
    }

    #[test]
    fn test_write_csv() {
        let mut buffer = Vec::new();
        write_csv(&[sample_report()], &mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("book,rule_index,"));
        assert_eq!(lines[1], r#""GEN",0,"words","thee","thee",true,2,3,3"#);
        // Quotes and commas in the search text stay inside one field
        assert_eq!(lines[2], r#""GEN",1,"words","","a, ""b""",false,0,0,0"#);
    }

    #[test]
    fn test_csv_field_keeps_regex_text() {
        assert_eq!(csv_field(r#"(\w+)eth "x""#), r#""(\w+)eth ""x""""#);
        assert_eq!(csv_field(""), r#""""#);
    }

    #[test]
    fn test_format_report_line() {
        let mut report = sample_report();
        assert_eq!(
            format_report_line(&report),
            "GEN: 2 of 10 lines changed, 3 substitutions (3 matches)"
        );
        report.warnings.push(RuleWarning {
            rule_index: 1,
            rule: "#1 (words:3)".to_string(),
            book_code: "GEN".to_string(),
            line_index: 0,
            reference: None,
            message: "boom".to_string(),
        });
        assert!(format_report_line(&report).ends_with(", 1 warnings"));
    }

    #[test]
    fn test_format_rule() {
        let mut fields = vec![String::new(); 15];
        fields[0] = "wl".to_string();
        fields[1] = "GEN".to_string();
        fields[7] = "re".to_string();
        fields[9] = "do".to_string();
        fields[12] = "make".to_string();
        fields[13] = "redo".to_string();
        let rule = parse_rule_row("words", 4, &fields).unwrap();

        assert_eq!(
            format_rule(&rule),
            "#0 'redo' (words:4) wl -c \"do\" -> -c \"make\" [pre=\"re\" post=\"\"] [books=GEN]"
        );
    }
}
