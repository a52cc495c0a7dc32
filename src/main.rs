//! Scripted Bible Editor
//!
//! Applies tables of search-and-replace rules to USFM Bible books, either
//! one book at a time or a whole folder driven by a control file.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use scripted_editor::control::{edit_timestamp, unix_now, utc_timestamp, BatchRun};
use scripted_editor::models::{ApplyOptions, BatchSummary};
use scripted_editor::output::{
    print_report, print_rules, print_summary, print_warnings, write_csv_file, write_json_file,
};
use scripted_editor::table::{load_rule_table, merge_tables};
use scripted_editor::usfm::{edit_note, UsfmDocument};
use scripted_editor::RuleEngine;

#[derive(Parser)]
#[command(name = "scripted-editor")]
#[command(about = "Apply scripted edit tables to USFM Bible books")]
#[command(version)]
struct Cli {
    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Rule selection and limits shared by the editing commands
#[derive(clap::Args)]
struct RuleArgs {
    /// Only run rules with this name (repeatable)
    #[arg(long)]
    only: Vec<String>,

    /// Never run rules with this name (repeatable)
    #[arg(long)]
    skip: Vec<String>,

    /// Time limit for one regex rule on one line, in milliseconds
    #[arg(long)]
    regex_timeout_ms: Option<u64>,

    /// Passes allowed for a repeating rule on one line [default: 32]
    #[arg(long)]
    max_repeat_passes: Option<usize>,
}

impl RuleArgs {
    fn options(self) -> ApplyOptions {
        let defaults = ApplyOptions::default();
        ApplyOptions {
            only: self.only,
            skip: self.skip,
            regex_time_limit: self.regex_timeout_ms.map(Duration::from_millis),
            max_repeat_passes: self.max_repeat_passes.unwrap_or(defaults.max_repeat_passes),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Edit every book named by a control file
    Run {
        /// Path to the control file (TOML)
        #[arg(long)]
        control: PathBuf,

        /// Write the batch summary as JSON
        #[arg(long)]
        report: Option<PathBuf>,

        /// Write per-rule counters as CSV
        #[arg(long)]
        csv: Option<PathBuf>,

        #[command(flatten)]
        rules: RuleArgs,

        /// Suppress progress and summary output
        #[arg(long)]
        quiet: bool,
    },

    /// Edit a single USFM book
    Apply {
        /// Edit table (.tsv or .xlsx); repeat to apply several in order
        #[arg(long, required = true)]
        table: Vec<PathBuf>,

        /// Input USFM file
        #[arg(long)]
        input: PathBuf,

        /// Output USFM file
        #[arg(long)]
        output: PathBuf,

        /// Book code to use when the file has no \id line
        #[arg(long)]
        book: Option<String>,

        /// Write the edit report as JSON
        #[arg(long)]
        report: Option<PathBuf>,

        /// Insert a \rem line noting the edit when the book changed
        #[arg(long)]
        stamp: bool,

        #[command(flatten)]
        rules: RuleArgs,

        /// Suppress the report on stdout
        #[arg(long)]
        quiet: bool,
    },

    /// Load and compile edit tables without editing anything
    Check {
        /// Edit table (.tsv or .xlsx); repeat to check several
        #[arg(long, required = true)]
        table: Vec<PathBuf>,

        /// Print at most this many rules
        #[arg(long)]
        limit: Option<usize>,
    },
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_engine(tables: &[PathBuf], options: ApplyOptions) -> Result<RuleEngine, Box<dyn std::error::Error>> {
    let loaded = tables
        .iter()
        .map(|path| load_rule_table(path))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(RuleEngine::new(merge_tables(loaded), options)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run {
            control,
            report,
            csv,
            rules,
            quiet,
        } => {
            let run = BatchRun::load(&control, rules.options())?;
            if !quiet && !run.control.title.is_empty() {
                eprintln!("Control file: {}", run.control.title);
            }

            let summary = run.run(!quiet)?;

            if let Some(path) = report {
                write_json_file(&summary, &path)?;
            }
            if let Some(path) = csv {
                write_csv_file(&summary.documents, &path)?;
            }

            if !quiet {
                print_summary(&summary);
                eprintln!("\nOutput: {}", run.output_folder().display());
            }
            for document in &summary.documents {
                print_warnings(&document.warnings);
            }
        }

        Commands::Apply {
            table,
            input,
            output,
            book,
            report,
            stamp,
            rules,
            quiet,
        } => {
            let engine = load_engine(&table, rules.options())?;

            let fallback = book.unwrap_or_else(|| {
                input
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
            let document = UsfmDocument::read(&input, &fallback)?;
            let (mut edited, result) = engine.apply_document(&document);

            let now = unix_now();
            if stamp && result.changed() {
                edited.stamp(&edit_note(&edit_timestamp(now)));
            }
            edited.write(&output)?;

            if let Some(path) = report {
                let summary = BatchSummary {
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    generated_at: utc_timestamp(now),
                    rule_count: engine.len(),
                    documents: vec![result.clone()],
                    files_written: 1,
                };
                write_json_file(&summary, &path)?;
            }

            if quiet {
                print_warnings(&result.warnings);
            } else {
                print_report(&result);
                eprintln!("\nOutput: {}", output.display());
            }
        }

        Commands::Check { table, limit } => {
            let engine = load_engine(&table, ApplyOptions::default())?;
            let rules: Vec<_> = engine.rules().cloned().collect();
            print_rules(&rules, limit);
            println!("\n{} rules from {} tables compiled", engine.len(), table.len());
        }
    }

    Ok(())
}
