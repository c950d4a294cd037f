//! Import engine error types.
//!
//! Every user-visible failure carries the logical entity it belongs to
//! (task / event / rule / app counter) and the column or status that
//! triggered it.

use thiserror::Error;

/// Logical coordinates of the entity an error belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntityRef {
    pub task_counter: Option<u32>,
    pub event_counter: Option<u32>,
    pub rule_counter: Option<u32>,
    pub app_counter: Option<u32>,
}

impl EntityRef {
    pub fn task(task_counter: u32) -> Self {
        Self {
            task_counter: Some(task_counter),
            ..Default::default()
        }
    }

    pub fn event(task_counter: u32, event_counter: u32) -> Self {
        Self {
            task_counter: Some(task_counter),
            event_counter: Some(event_counter),
            ..Default::default()
        }
    }

    pub fn rule(task_counter: u32, event_counter: u32, rule_counter: u32) -> Self {
        Self {
            task_counter: Some(task_counter),
            event_counter: Some(event_counter),
            rule_counter: Some(rule_counter),
            ..Default::default()
        }
    }

    pub fn app(app_counter: u32) -> Self {
        Self {
            app_counter: Some(app_counter),
            ..Default::default()
        }
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if let Some(counter) = self.app_counter {
            parts.push(format!("app {}", counter));
        }
        if let Some(counter) = self.task_counter {
            parts.push(format!("task {}", counter));
        }
        if let Some(counter) = self.event_counter {
            parts.push(format!("event {}", counter));
        }
        if let Some(counter) = self.rule_counter {
            parts.push(format!("rule {}", counter));
        }
        if parts.is_empty() {
            write!(f, "source")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Errors raised by the parser, resolver, importer, and exporter.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Cannot read source file '{path}': {source}")]
    Source {
        path: String,
        source: std::io::Error,
    },

    #[error("Cannot read spreadsheet '{path}': {message}")]
    Spreadsheet { path: String, message: String },

    #[error("Sheet '{0}' not found in workbook")]
    SheetNotFound(String),

    #[error("Delimited source error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Source has no header row")]
    EmptySource,

    #[error("Mandatory column '{0}' missing from header")]
    MissingColumn(&'static str),

    #[error("Row {row}, column '{column}' ({entity}): {message}")]
    CellValue {
        row: usize,
        column: &'static str,
        entity: EntityRef,
        message: String,
    },

    #[error("Row {row} ({entity}): {message}")]
    RowValue {
        row: usize,
        entity: EntityRef,
        message: String,
    },

    #[error("Unknown tag '{0}'")]
    UnknownTag(String),

    #[error("Unknown custom property '{0}'")]
    UnknownCustomProperty(String),

    #[error("Value '{value}' is not among the choices of custom property '{property}'")]
    InvalidCustomPropertyValue { property: String, value: String },

    #[error("App reference '{0}' does not resolve to an existing or uploaded app")]
    UnresolvedApp(String),

    #[error("Rule task reference '{0}' matches neither a server task nor a task in this import")]
    UnresolvedRuleRef(String),

    #[error("Update mode '{0}' is not supported; only 'create' is")]
    UnsupportedUpdateMode(String),

    #[error("Repository error: {0}")]
    Qrs(#[from] ctrlq_qrs::QrsError),
}

/// Result type for import operations.
pub type ImportResult<T> = Result<T, ImportError>;

/// One validation finding, kept for end-of-parse reporting.
#[derive(Debug)]
pub struct ImportIssue {
    pub error: ImportError,
}

impl std::fmt::Display for ImportIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

/// Collector for parser findings.
///
/// Fail-fast mode (the default) turns the first finding into the parse
/// error. Collect-all mode accumulates findings, skips the offending
/// group, and leaves reporting to the caller.
#[derive(Debug, Default)]
pub struct Diagnostics {
    collect_all: bool,
    issues: Vec<ImportIssue>,
}

impl Diagnostics {
    pub fn fail_fast() -> Self {
        Self::default()
    }

    pub fn collect_all() -> Self {
        Self {
            collect_all: true,
            issues: Vec::new(),
        }
    }

    /// Record a finding. In fail-fast mode the finding is returned as the
    /// error instead of being kept.
    pub fn push(&mut self, error: ImportError) -> ImportResult<()> {
        if self.collect_all {
            self.issues.push(ImportIssue { error });
            Ok(())
        } else {
            Err(error)
        }
    }

    pub fn issues(&self) -> &[ImportIssue] {
        &self.issues
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_ref_display() {
        assert_eq!(EntityRef::task(3).to_string(), "task 3");
        assert_eq!(EntityRef::rule(1, 2, 3).to_string(), "task 1, event 2, rule 3");
        assert_eq!(EntityRef::app(4).to_string(), "app 4");
        assert_eq!(EntityRef::default().to_string(), "source");
    }
}
