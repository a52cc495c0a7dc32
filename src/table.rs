//! Edit table loading (tab-separated text or an `.xlsx` worksheet).

use crate::models::{CaseMode, MatchKind, Rule};
use calamine::{open_workbook, Reader, Xlsx};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Column names of an edit table, in order.
pub const COLUMNS: [&str; 15] = [
    "Type", "IBooks", "EBooks", "IMarkers", "EMarkers", "IRefs", "ERefs", "PreText", "SCase",
    "Search", "PostText", "RCase", "Replace", "Name", "Comment",
];

/// Rows that stop after `PostText` get their trailing columns back.
const MIN_COLUMNS: usize = 11;

/// Delimiter for the book, marker and reference list columns.
pub const LIST_DELIMITER: char = ',';

#[derive(Error, Debug)]
pub enum TableError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Excel XLSX error: {0}")]
    ExcelXlsx(#[from] calamine::XlsxError),
    #[error("{table}:{line}: malformed rule table: {reason}")]
    MalformedTable {
        table: String,
        line: usize,
        reason: String,
    },
    #[error("{table}:{line}: invalid rule type {code:?}")]
    InvalidRuleType {
        table: String,
        line: usize,
        code: String,
    },
    #[error("{table}:{line}: invalid {column} code {code:?}")]
    InvalidCaseMode {
        table: String,
        line: usize,
        column: &'static str,
        code: String,
    },
    #[error("{table}:{line}: search text is empty")]
    EmptySearchText { table: String, line: usize },
}

/// Load an edit table from disk, choosing the reader by file extension.
/// The table is named after the file stem.
pub fn load_rule_table(path: &Path) -> Result<Vec<Rule>, TableError> {
    let table_name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    load_named_rule_table(&table_name, path)
}

/// Load an edit table from disk under an explicit table name.
pub fn load_named_rule_table(table_name: &str, path: &Path) -> Result<Vec<Rule>, TableError> {
    let is_xlsx = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("xlsx"));

    let rules = if is_xlsx {
        load_rule_table_xlsx(table_name, path)?
    } else {
        let contents = std::fs::read_to_string(path)?;
        parse_rule_table(table_name, &contents)?
    };

    debug!("Loaded {} rules from {}", rules.len(), path.display());
    Ok(rules)
}

/// Parse tab-separated edit table text.
pub fn parse_rule_table(table_name: &str, contents: &str) -> Result<Vec<Rule>, TableError> {
    let contents = contents.strip_prefix('\u{feff}').unwrap_or(contents);

    let rows = contents.lines().enumerate().map(|(i, line)| {
        let line = line.strip_suffix('\r').unwrap_or(line);
        (i + 1, line.split('\t').map(str::to_string).collect::<Vec<_>>())
    });

    parse_rows(table_name, rows)
}

/// Read the first worksheet of an `.xlsx` edit table.
pub fn load_rule_table_xlsx(table_name: &str, path: &Path) -> Result<Vec<Rule>, TableError> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;

    let Some(sheet_name) = workbook.sheet_names().first().cloned() else {
        return Err(TableError::MalformedTable {
            table: table_name.to_string(),
            line: 0,
            reason: "workbook has no worksheets".to_string(),
        });
    };
    let range = workbook.worksheet_range(&sheet_name)?;

    let rows = range.rows().enumerate().map(|(i, row)| {
        let mut cells: Vec<String> = row.iter().map(cell_to_string).collect();
        // Sheets are often wider than the table
        while cells.len() > COLUMNS.len() && cells.last().is_some_and(|c| c.is_empty()) {
            cells.pop();
        }
        (i + 1, cells)
    });

    parse_rows(table_name, rows)
}

fn cell_to_string(cell: &calamine::Data) -> String {
    match cell {
        calamine::Data::String(s) => s.clone(),
        calamine::Data::Int(n) => n.to_string(),
        calamine::Data::Float(n) if n.fract() == 0.0 => format!("{}", *n as i64),
        calamine::Data::Float(n) => n.to_string(),
        calamine::Data::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Shared row handling for both table formats.
fn parse_rows<I>(table_name: &str, rows: I) -> Result<Vec<Rule>, TableError>
where
    I: Iterator<Item = (usize, Vec<String>)>,
{
    let mut rules = Vec::new();
    let mut seen_header = false;

    for (line_number, mut fields) in rows {
        let first = fields.first().map(String::as_str).unwrap_or("");
        if first.starts_with('#') || fields.iter().all(|f| f.trim().is_empty()) {
            continue;
        }

        if is_header(&fields) {
            seen_header = true;
            continue;
        }
        if !seen_header {
            return Err(TableError::MalformedTable {
                table: table_name.to_string(),
                line: line_number,
                reason: format!("expected header row '{}'", COLUMNS.join(" ")),
            });
        }

        if fields.len() >= MIN_COLUMNS && fields.len() < COLUMNS.len() {
            fields.resize(COLUMNS.len(), String::new());
        }
        if fields.len() != COLUMNS.len() {
            return Err(TableError::MalformedTable {
                table: table_name.to_string(),
                line: line_number,
                reason: format!("{} columns instead of {}", fields.len(), COLUMNS.len()),
            });
        }

        let mut rule = parse_rule_row(table_name, line_number, &fields)?;
        rule.index = rules.len();
        rules.push(rule);
    }

    if !seen_header {
        return Err(TableError::MalformedTable {
            table: table_name.to_string(),
            line: 0,
            reason: "no header row".to_string(),
        });
    }

    Ok(rules)
}

fn is_header(fields: &[String]) -> bool {
    fields.len() == COLUMNS.len() && fields.iter().zip(COLUMNS).all(|(f, c)| f.trim() == c)
}

/// Turn one 15-column row into a rule.
pub fn parse_rule_row(
    table_name: &str,
    line_number: usize,
    fields: &[String],
) -> Result<Rule, TableError> {
    let field = |i: usize| fields.get(i).map(String::as_str).unwrap_or("");

    let (match_kind, repeat) =
        parse_rule_type(field(0)).ok_or_else(|| TableError::InvalidRuleType {
            table: table_name.to_string(),
            line: line_number,
            code: field(0).to_string(),
        })?;

    let search_case = parse_case(table_name, line_number, "SCase", field(8))?.unwrap_or_default();
    let replace_case =
        parse_case(table_name, line_number, "RCase", field(11))?.unwrap_or(search_case);

    let search_text = field(9).to_string();
    if search_text.is_empty() {
        return Err(TableError::EmptySearchText {
            table: table_name.to_string(),
            line: line_number,
        });
    }

    let name = field(13).trim();

    Ok(Rule {
        index: 0,
        table: table_name.to_string(),
        line_number,
        match_kind,
        repeat,
        include_books: parse_list(field(1)),
        exclude_books: parse_list(field(2)),
        include_markers: parse_list(field(3)),
        exclude_markers: parse_list(field(4)),
        include_refs: parse_list(field(5)),
        exclude_refs: parse_list(field(6)),
        pre_text: field(7).to_string(),
        post_text: field(10).to_string(),
        search_case,
        search_text,
        replace_case,
        replace_text: field(12).to_string(),
        name: (!name.is_empty()).then(|| name.to_string()),
        comment: field(14).to_string(),
    })
}

/// `w`, `i`, `a` or `r`, optionally followed by `l` (repeat).
/// An empty type is a plain substring rule.
pub fn parse_rule_type(code: &str) -> Option<(MatchKind, bool)> {
    let mut chars = code.trim().chars();
    let kind = match chars.next() {
        None => return Some((MatchKind::Any, false)),
        Some(c) => MatchKind::from_code(c)?,
    };
    let repeat = match chars.next() {
        None => false,
        Some('l') => true,
        Some(_) => return None,
    };
    if chars.next().is_some() {
        return None;
    }
    Some((kind, repeat))
}

fn parse_case(
    table_name: &str,
    line_number: usize,
    column: &'static str,
    code: &str,
) -> Result<Option<CaseMode>, TableError> {
    let code = code.trim();
    if code.is_empty() {
        return Ok(None);
    }
    CaseMode::from_code(code)
        .map(Some)
        .ok_or_else(|| TableError::InvalidCaseMode {
            table: table_name.to_string(),
            line: line_number,
            column,
            code: code.to_string(),
        })
}

fn parse_list(field: &str) -> BTreeSet<String> {
    field
        .split(LIST_DELIMITER)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Concatenate tables in order, renumbering rules across the whole list.
pub fn merge_tables(tables: Vec<Vec<Rule>>) -> Vec<Rule> {
    let mut merged: Vec<Rule> = tables.into_iter().flatten().collect();
    for (index, rule) in merged.iter_mut().enumerate() {
        rule.index = index;
    }
    merged
}
