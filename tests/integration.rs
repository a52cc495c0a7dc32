//! Integration tests for scripted-editor.
//!
//! These tests drive whole books through table loading, compilation and
//! application, the way the command line tool does.

use scripted_editor::apply::{apply_documents, RuleEngine};
use scripted_editor::control::BatchRun;
use scripted_editor::models::{ApplyOptions, DocumentLine};
use scripted_editor::output::write_json;
use scripted_editor::table::{load_rule_table, merge_tables, parse_rule_table, COLUMNS};
use scripted_editor::usfm::UsfmDocument;
use std::path::Path;

const GENESIS: &str = "\\id GEN Sample\n\
\\h Genesis\n\
\\mt1 The First Book of Moses\n\
\\c 1\n\
\\s1 The Creation\n\
\\p\n\
\\v 1 In the beginning God created the heaven and the earth.\n\
\\v 2 And the earth was without form, and void; and darkness was upon the face of the deep.\n\
\\v 3 And God said, Let there be light: and there was light.\n\
\\c 2\n\
\\v 1 Thus the heavens and the earth were finished.\n";

/// Build table text from rows given as (column index, value) pairs.
fn table_text(rows: &[&[(usize, &str)]]) -> String {
    let mut text = format!("# test table\n{}\n", COLUMNS.join("\t"));
    for row in rows {
        let mut cells = vec![""; COLUMNS.len()];
        for &(i, value) in row.iter() {
            cells[i] = value;
        }
        text.push_str(&cells.join("\t"));
        text.push('\n');
    }
    text
}

fn engine(rows: &[&[(usize, &str)]]) -> RuleEngine {
    let rules = parse_rule_table("test", &table_text(rows)).unwrap();
    RuleEngine::new(rules, ApplyOptions::default()).unwrap()
}

fn line_text(document: &UsfmDocument, reference: &str) -> String {
    document
        .lines
        .iter()
        .find(|l| l.reference.as_deref() == Some(reference))
        .map(|l| l.text.clone())
        .unwrap()
}

#[test]
fn test_zero_matches_round_trip() {
    let engine = engine(&[&[(0, "w"), (9, "unicorn"), (12, "horse")]]);
    let book = UsfmDocument::parse(GENESIS, "GEN");
    let (edited, report) = engine.apply_document(&book);

    assert_eq!(edited.to_text(), GENESIS);
    assert_eq!(report.total_matches(), 0);
    assert!(!report.changed());
}

#[test]
fn test_scoped_edits_on_a_book() {
    let engine = engine(&[
        // Verse text only
        &[(0, "w"), (3, "v"), (9, "heaven"), (12, "sky")],
        // Whole chapter 1 verse 3 only
        &[(0, "w"), (5, "1:3"), (8, "-s"), (9, "and"), (12, "so")],
        // Never in headings
        &[(0, "w"), (4, "s1,mt1"), (8, "-i"), (9, "the"), (12, "this")],
    ]);
    let book = UsfmDocument::parse(GENESIS, "GEN");
    let (edited, report) = engine.apply_document(&book);

    assert_eq!(
        line_text(&edited, "1:1"),
        "1 In this beginning God created this sky and this earth."
    );
    assert_eq!(
        line_text(&edited, "1:3"),
        "3 So God said, Let there be light: so there was light."
    );
    assert_eq!(edited.lines[4].text, "The Creation");
    assert_eq!(edited.lines[2].text, "The First Book of Moses");
    assert_eq!(report.book_code, "GEN");
    assert_eq!(report.rules[1].substitutions, 2);
    assert_eq!(report.rules[1].lines_touched, 1);
}

#[test]
fn test_book_exclusion() {
    let engine = engine(&[&[(0, "a"), (2, "GEN"), (9, "God"), (12, "Elohim")]]);
    let genesis = UsfmDocument::parse(GENESIS, "GEN");
    let ruth = UsfmDocument::parse("\\id RUT\n\\c 1\n\\v 1 God\n", "RUT");

    let results = apply_documents(&engine, &[genesis, ruth], false);
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].1.total_substitutions(), 0);
    assert!(!results[0].1.rules[0].enabled);
    assert_eq!(results[1].0.to_text(), "\\id RUT\n\\c 1\n\\v 1 Elohim\n");
}

#[test]
fn test_pre_text_inside_word() {
    let inside = engine(&[&[(0, "i"), (7, "re"), (9, "do"), (12, "done")]]);
    let whole = engine(&[&[(0, "w"), (7, "re"), (9, "do"), (12, "done")]]);
    let line = [DocumentLine::new("GEN", "v", Some("1:1"), "redo")];

    let result = inside.apply_lines(&line);
    assert_eq!(result.lines, vec!["redone"]);
    assert_eq!(result.report.rules[0].matches, 1);

    let result = whole.apply_lines(&line);
    assert_eq!(result.lines, vec!["redo"]);
    assert_eq!(result.report.rules[0].matches, 0);
}

#[test]
fn test_sentence_case_search_and_replace() {
    let engine = engine(&[&[(0, "w"), (8, "-s"), (9, "thou"), (12, "you")]]);
    let lines = [DocumentLine::new("GEN", "v", Some("3:11"), "Thou hast eaten? thou art THOU")];
    let result = engine.apply_lines(&lines);
    assert_eq!(result.lines, vec!["You hast eaten? you art THOU"]);
}

#[test]
fn test_tables_apply_in_declared_order() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.tsv");
    let second = dir.path().join("second.tsv");
    std::fs::write(&first, table_text(&[&[(0, "w"), (9, "cat"), (12, "dog")]])).unwrap();
    std::fs::write(&second, table_text(&[&[(0, "w"), (9, "dog"), (12, "fish")]])).unwrap();

    let load = |paths: &[&Path]| {
        let tables = paths.iter().map(|p| load_rule_table(p).unwrap()).collect();
        RuleEngine::new(merge_tables(tables), ApplyOptions::default()).unwrap()
    };
    let line = [DocumentLine::new("GEN", "p", None, "the cat")];

    let (first, second) = (first.as_path(), second.as_path());
    assert_eq!(load(&[first, second]).apply_lines(&line).lines, vec!["the fish"]);
    assert_eq!(load(&[second, first]).apply_lines(&line).lines, vec!["the dog"]);

    let engine = load(&[first, second]);
    let tables: Vec<&str> = engine.rules().map(|r| r.table.as_str()).collect();
    assert_eq!(tables, vec!["first", "second"]);
}

#[test]
fn test_control_file_run() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::write(
        root.join("edits.tsv"),
        table_text(&[&[(0, "w"), (8, "-i"), (9, "heaven"), (12, "sky"), (13, "sky")]]),
    )
    .unwrap();
    std::fs::write(
        root.join("editor.toml"),
        "title = \"Test\"\n\
         inputFolder = \"in\"\n\
         outputFolder = \"out\"\n\
         inputFilenameTemplate = \"BBB.SFM\"\n\
         createOutputFolder = true\n\
         [commandTables]\n\
         edits = \"edits.tsv\"\n",
    )
    .unwrap();
    std::fs::create_dir(root.join("in")).unwrap();
    std::fs::write(root.join("in/GEN.SFM"), GENESIS).unwrap();

    let run = BatchRun::load(&root.join("editor.toml"), ApplyOptions::default()).unwrap();
    let summary = run.run(false).unwrap();

    assert_eq!(summary.files_written, 1);
    // "heavens" is a different word
    assert_eq!(summary.documents[0].rule_named("sky").unwrap().substitutions, 1);

    let written = UsfmDocument::read(&root.join("out/GEN.SFM"), "GEN").unwrap();
    assert_eq!(written.lines[1].marker, "rem");
    assert_eq!(
        line_text(&written, "1:1"),
        "1 In the beginning God created the sky and the earth."
    );
    assert_eq!(
        line_text(&written, "2:1"),
        "1 Thus the heavens and the earth were finished."
    );

    let mut json = Vec::new();
    write_json(&summary, &mut json).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
    assert_eq!(value["files_written"], 1);
    assert_eq!(value["documents"][0]["book_code"], "GEN");
}
