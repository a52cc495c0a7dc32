//! Control file loading and batch runs over a folder of books.
//!
//! A control file names the edit tables (in order), the input and output
//! folders and the filename templates. Paths are relative to the folder the
//! control file lives in. `BBB` (or `UUU`) in a template stands for the
//! three-character book code.

use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::apply::{apply_documents, RuleEngine};
use crate::models::{ApplyOptions, BatchSummary};
use crate::pattern::PatternError;
use crate::table::{load_named_rule_table, merge_tables, TableError};
use crate::usfm::{edit_note, UsfmDocument};

pub const DEFAULT_APPLY_ORDER: &str = "AllTablesFirst";

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error("unsupported apply order {0:?}")]
    UnsupportedApplyOrder(String),
    #[error("command table {name:?} must be given as a file path")]
    InvalidTablePath { name: String },
    #[error("control file names no command tables")]
    NoTables,
    #[error("invalid filename template: {0}")]
    Template(#[from] regex::Error),
    #[error("folder not found: {}", .0.display())]
    MissingFolder(PathBuf),
    #[error("no input files match {template:?} in {}", .folder.display())]
    NoInputFiles { folder: PathBuf, template: String },
}

fn default_apply_order() -> String {
    DEFAULT_APPLY_ORDER.to_string()
}

fn default_true() -> bool {
    true
}

/// Contents of a control file
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlFile {
    #[serde(default)]
    pub title: String,
    /// Table name -> path, in declared order
    #[serde(default)]
    pub command_tables: toml::Table,
    pub input_folder: PathBuf,
    pub output_folder: PathBuf,
    pub input_filename_template: String,
    #[serde(default)]
    pub output_filename_template: Option<String>,
    #[serde(default)]
    pub clear_output_folder: bool,
    #[serde(default)]
    pub create_output_folder: bool,
    #[serde(default = "default_apply_order")]
    pub apply_order: String,
    #[serde(default = "default_true")]
    pub stamp_edits: bool,
}

impl ControlFile {
    pub fn parse(contents: &str) -> Result<Self, ControlError> {
        let control: ControlFile = toml::from_str(contents)?;
        if control.apply_order != DEFAULT_APPLY_ORDER {
            return Err(ControlError::UnsupportedApplyOrder(control.apply_order));
        }
        Ok(control)
    }

    pub fn load(path: &Path) -> Result<Self, ControlError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Table names and paths in declared order.
    pub fn table_paths(&self) -> Result<Vec<(String, PathBuf)>, ControlError> {
        self.command_tables
            .iter()
            .map(|(name, value)| match value.as_str() {
                Some(path) => Ok((name.clone(), PathBuf::from(path))),
                None => Err(ControlError::InvalidTablePath { name: name.clone() }),
            })
            .collect()
    }
}

/// Filename template with a `BBB`/`UUU` book code wildcard
#[derive(Debug, Clone)]
pub struct FilenameTemplate {
    template: String,
    regex: Regex,
}

impl FilenameTemplate {
    const WILDCARDS: [&'static str; 2] = ["BBB", "UUU"];

    pub fn new(template: &str) -> Result<Self, ControlError> {
        let mut pattern = regex::escape(template);
        let mut captured = false;
        for wildcard in Self::WILDCARDS {
            while pattern.contains(wildcard) {
                let group = if captured {
                    "[0-9A-Za-z]{3}"
                } else {
                    "(?P<book>[0-9A-Za-z]{3})"
                };
                pattern = pattern.replacen(wildcard, group, 1);
                captured = true;
            }
        }

        let regex = Regex::new(&format!("^{}$", pattern))?;
        Ok(FilenameTemplate {
            template: template.to_string(),
            regex,
        })
    }

    /// The book code a filename stands for, if it fits the template.
    /// Templates without a wildcard use the file stem.
    pub fn book_code(&self, filename: &str) -> Option<String> {
        let caps = self.regex.captures(filename)?;
        Some(match caps.name("book") {
            Some(book) => book.as_str().to_string(),
            None => Path::new(filename)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
        })
    }

    /// Fill the wildcards with `book_code`.
    pub fn render(&self, book_code: &str) -> String {
        Self::WILDCARDS
            .iter()
            .fold(self.template.clone(), |name, wildcard| name.replace(wildcard, book_code))
    }
}

/// One input book found in the input folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchInput {
    pub path: PathBuf,
    pub book_code: String,
    pub output_name: String,
}

/// A loaded control file with its rules compiled, ready to run.
#[derive(Debug)]
pub struct BatchRun {
    pub control: ControlFile,
    base: PathBuf,
    engine: RuleEngine,
}

impl BatchRun {
    /// Load the control file and every table it names, then compile the
    /// rules. Nothing is written.
    pub fn load(control_path: &Path, options: ApplyOptions) -> Result<Self, ControlError> {
        let control = ControlFile::load(control_path)?;
        let base = control_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let tables = control.table_paths()?;
        if tables.is_empty() {
            return Err(ControlError::NoTables);
        }

        let mut loaded = Vec::with_capacity(tables.len());
        for (name, path) in &tables {
            loaded.push(load_named_rule_table(name, &base.join(path))?);
        }
        let rules = merge_tables(loaded);
        info!(
            "Loaded {} rules from {} tables for {:?}",
            rules.len(),
            tables.len(),
            control.title
        );

        let engine = RuleEngine::new(rules, options)?;
        if engine.is_empty() {
            warn!("No rules loaded for {:?}; no book will change", control.title);
        }
        Ok(BatchRun {
            control,
            base,
            engine,
        })
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    pub fn input_folder(&self) -> PathBuf {
        self.base.join(&self.control.input_folder)
    }

    pub fn output_folder(&self) -> PathBuf {
        self.base.join(&self.control.output_folder)
    }

    /// Input files that fit the input template, sorted by name.
    pub fn inputs(&self) -> Result<Vec<BatchInput>, ControlError> {
        let folder = self.input_folder();
        if !folder.is_dir() {
            return Err(ControlError::MissingFolder(folder));
        }

        let input_template = FilenameTemplate::new(&self.control.input_filename_template)?;
        let output_template = self
            .control
            .output_filename_template
            .as_deref()
            .map(FilenameTemplate::new)
            .transpose()?;

        let mut inputs = Vec::new();
        for entry in std::fs::read_dir(&folder)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().into_owned();
            let Some(book_code) = input_template.book_code(&filename) else {
                continue;
            };
            let output_name = match &output_template {
                Some(template) => template.render(&book_code),
                None => filename.clone(),
            };
            inputs.push(BatchInput {
                path: entry.path(),
                book_code,
                output_name,
            });
        }

        if inputs.is_empty() {
            return Err(ControlError::NoInputFiles {
                folder,
                template: self.control.input_filename_template.clone(),
            });
        }
        inputs.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(inputs)
    }

    fn prepare_output_folder(&self) -> Result<PathBuf, ControlError> {
        let folder = self.output_folder();

        if self.control.clear_output_folder && folder.is_dir() {
            if self.control.create_output_folder {
                std::fs::remove_dir_all(&folder)?;
            } else {
                // Files only, subfolders stay
                for entry in std::fs::read_dir(&folder)? {
                    let entry = entry?;
                    if entry.file_type()?.is_file() {
                        std::fs::remove_file(entry.path())?;
                    }
                }
            }
        }
        if self.control.create_output_folder {
            std::fs::create_dir_all(&folder)?;
        }
        if !folder.is_dir() {
            return Err(ControlError::MissingFolder(folder));
        }
        Ok(folder)
    }

    /// Read every input book, apply the rules and write the changed books.
    pub fn run(&self, show_progress: bool) -> Result<BatchSummary, ControlError> {
        let inputs = self.inputs()?;
        let documents = inputs
            .iter()
            .map(|input| UsfmDocument::read(&input.path, &input.book_code))
            .collect::<Result<Vec<_>, _>>()?;
        info!(
            "Applying {} rules to {} files in {}",
            self.engine.len(),
            documents.len(),
            self.input_folder().display()
        );

        let results = apply_documents(&self.engine, &documents, show_progress);

        let output_folder = self.prepare_output_folder()?;
        let now = unix_now();
        let note = edit_note(&edit_timestamp(now));
        let mut summary = BatchSummary {
            version: env!("CARGO_PKG_VERSION").to_string(),
            generated_at: utc_timestamp(now),
            rule_count: self.engine.len(),
            documents: Vec::with_capacity(results.len()),
            files_written: 0,
        };

        for (input, (mut document, report)) in inputs.iter().zip(results) {
            if report.changed() {
                if self.control.stamp_edits {
                    document.stamp(&note);
                }
                let path = output_folder.join(&input.output_name);
                document.write(&path)?;
                debug!("Wrote {}", path.display());
                summary.files_written += 1;
            }
            summary.documents.push(report);
        }

        info!(
            "{} substitutions, {} files written to {}",
            summary.total_substitutions(),
            summary.files_written,
            output_folder.display()
        );
        Ok(summary)
    }
}

/// Seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// `secs` as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn utc_timestamp(secs: u64) -> String {
    let (year, month, day, hour, minute, second) = civil_from_secs(secs);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year, month, day, hour, minute, second
    )
}

/// `secs` as `YYYY-MM-DD HH:MM`, the form used in edit notes.
pub fn edit_timestamp(secs: u64) -> String {
    let (year, month, day, hour, minute, _) = civil_from_secs(secs);
    format!("{:04}-{:02}-{:02} {:02}:{:02}", year, month, day, hour, minute)
}

/// Split seconds since the epoch into UTC date and time (no leap seconds).
fn civil_from_secs(secs: u64) -> (u64, u64, u64, u64, u64, u64) {
    let mut remaining_days = secs / 86400;
    let secs_today = secs % 86400;

    let mut year = 1970;
    loop {
        let days_in_year = if is_leap_year(year) { 366 } else { 365 };
        if remaining_days < days_in_year {
            break;
        }
        remaining_days -= days_in_year;
        year += 1;
    }

    let month_days = if is_leap_year(year) {
        [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    } else {
        [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31]
    };

    let mut month = 1;
    for days in month_days {
        if remaining_days < days {
            break;
        }
        remaining_days -= days;
        month += 1;
    }

    (
        year,
        month,
        remaining_days + 1,
        secs_today / 3600,
        (secs_today % 3600) / 60,
        secs_today % 60,
    )
}

fn is_leap_year(year: u64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0)
}
