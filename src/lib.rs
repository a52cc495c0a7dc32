//! Scripted Bible Editor Library
//!
//! Applies ordered tables of search-and-replace rules to USFM Bible books.
//! Each rule can be limited to books, markers and verse references, can
//! match whole words, word fragments, substrings or regular expressions, and
//! can carry the capitalization of the matched text over to its replacement.
//!
//! # Example
//!
//! ```no_run
//! use scripted_editor::prelude::*;
//! use std::path::Path;
//!
//! // Load and compile the rules
//! let rules = load_rule_table(Path::new("modernise.tsv")).unwrap();
//! let engine = RuleEngine::new(rules, ApplyOptions::default()).unwrap();
//!
//! // Edit one book
//! let book = UsfmDocument::read(Path::new("GEN.usfm"), "GEN").unwrap();
//! let (edited, report) = engine.apply_document(&book);
//!
//! println!("{} substitutions", report.total_substitutions());
//! edited.write(Path::new("out/GEN.usfm")).unwrap();
//! ```
//!
//! # Control File Example
//!
//! ```no_run
//! use scripted_editor::prelude::*;
//! use std::path::Path;
//!
//! // Tables, folders and filename templates all come from the control file
//! let run = BatchRun::load(Path::new("ScriptedBibleEditor.control.toml"), ApplyOptions::default()).unwrap();
//! let summary = run.run(true).unwrap();
//!
//! print_summary(&summary);
//! ```

pub mod apply;
pub mod case;
pub mod control;
pub mod models;
pub mod output;
pub mod pattern;
pub mod scope;
pub mod table;
pub mod usfm;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::apply::{apply_documents, rewrite, CompiledRule, RuleEngine, RuntimeMatchError};
    pub use crate::case::{apply_case, capitalize_first, replacement_for, sentence_case};
    pub use crate::control::{
        edit_timestamp, unix_now, utc_timestamp, BatchInput, BatchRun, ControlError, ControlFile,
        FilenameTemplate,
    };
    pub use crate::models::{
        ApplicationReport, ApplyOptions, BatchSummary, CaseMode, DocumentLine, DocumentResult,
        MatchKind, MatchSpan, Rule, RuleStats, RuleWarning,
    };
    pub use crate::output::{
        csv_field, format_report_line, format_rule, print_report, print_rules, print_summary,
        print_warnings, write_csv, write_csv_file, write_json, write_json_file, OutputError,
    };
    pub use crate::pattern::{is_word_char, CompiledPattern, PatternError};
    pub use crate::scope::{book_in_scope, in_scope};
    pub use crate::table::{
        load_named_rule_table, load_rule_table, merge_tables, parse_rule_table, TableError,
        COLUMNS,
    };
    pub use crate::usfm::{edit_note, split_marker, UsfmDocument};
}

// Re-export commonly used types at the crate root
pub use apply::RuleEngine;
pub use models::{ApplicationReport, ApplyOptions, DocumentLine, Rule};
pub use usfm::UsfmDocument;
