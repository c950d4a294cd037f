//! Ctrl-Q Import/Export Engine
//!
//! Reads tabular task definitions (delimited text or spreadsheet), resolves
//! references across the server, same-run, and name namespaces, creates the
//! population in two phases, and projects a task graph back into the same
//! tabular grammar.

pub mod columns;
pub mod error;
pub mod export;
pub mod import;
pub mod parse;
pub mod resolve;
pub mod source;

pub use columns::{AppColumn, ColRefBy, ColumnResolver, ColumnSpec, TaskColumn};
pub use error::{Diagnostics, EntityRef, ImportError, ImportIssue, ImportResult};
pub use export::export_task_rows;
pub use import::{
    AppOutcome, CreateSink, DryRunSink, EventOutcome, ImportOptions, ImportSummary, Importer,
    QrsSink, TaskOutcome, UpdateMode,
};
pub use parse::{
    parse_app_sheet, parse_app_sheet_with, parse_task_sheet, parse_task_sheet_with,
    AppImportRecord, CompositeEventRecord, ParserOptions, RuleRecord, TaskImportRecord,
};
pub use resolve::{ResolvedRule, Resolver};
pub use source::{read_delimited, read_spreadsheet, RowData, SheetRows};
