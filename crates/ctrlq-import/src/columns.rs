//! Logical column sets and the column resolver.
//!
//! All row access goes through [`ColumnResolver`]; the parser never touches
//! header strings directly.

use std::collections::HashMap;
use std::hash::Hash;

use crate::error::{ImportError, ImportResult};

/// How header columns are matched to logical columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColRefBy {
    /// Match by exact header name; column order is free.
    #[default]
    Name,
    /// Match by position in the documented canonical order.
    Position,
}

impl std::str::FromStr for ColRefBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "position" => Ok(Self::Position),
            other => Err(format!("unknown column reference mode '{}'", other)),
        }
    }
}

/// A logical column set: canonical order, header names, and the mandatory
/// subset.
pub trait ColumnSpec: Copy + Eq + Hash + 'static {
    fn header_name(self) -> &'static str;
    fn all() -> &'static [Self];
    fn mandatory() -> &'static [Self];
}

/// Columns of the task sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskColumn {
    TaskCounter,
    TaskType,
    TaskName,
    TaskId,
    TaskEnabled,
    TaskTimeout,
    TaskRetries,
    AppId,
    PartialReload,
    ManuallyTriggered,
    ExternalProgramPath,
    ExternalProgramParameters,
    Tags,
    CustomProperties,
    EventCounter,
    EventType,
    EventName,
    EventEnabled,
    SchemaIncrementOption,
    SchemaIncrementDescription,
    DaylightSavingsTime,
    SchemaStart,
    SchemaExpiration,
    SchemaFilterDescription,
    SchemaTimeZone,
    TimeConstraintSeconds,
    TimeConstraintMinutes,
    TimeConstraintHours,
    TimeConstraintDays,
    RuleCounter,
    RuleState,
    RuleTaskName,
    RuleTaskId,
}

impl ColumnSpec for TaskColumn {
    fn header_name(self) -> &'static str {
        match self {
            Self::TaskCounter => "Task counter",
            Self::TaskType => "Task type",
            Self::TaskName => "Task name",
            Self::TaskId => "Task id",
            Self::TaskEnabled => "Task enabled",
            Self::TaskTimeout => "Task timeout",
            Self::TaskRetries => "Task retries",
            Self::AppId => "App id",
            Self::PartialReload => "Partial reload",
            Self::ManuallyTriggered => "Manually triggered",
            Self::ExternalProgramPath => "External program path",
            Self::ExternalProgramParameters => "External program parameters",
            Self::Tags => "Tags",
            Self::CustomProperties => "Custom properties",
            Self::EventCounter => "Event counter",
            Self::EventType => "Event type",
            Self::EventName => "Event name",
            Self::EventEnabled => "Event enabled",
            Self::SchemaIncrementOption => "Schema increment option",
            Self::SchemaIncrementDescription => "Schema increment description",
            Self::DaylightSavingsTime => "Daylight savings time",
            Self::SchemaStart => "Schema start",
            Self::SchemaExpiration => "Schema expiration",
            Self::SchemaFilterDescription => "Schema filter description",
            Self::SchemaTimeZone => "Schema time zone",
            Self::TimeConstraintSeconds => "Time constraint seconds",
            Self::TimeConstraintMinutes => "Time constraint minutes",
            Self::TimeConstraintHours => "Time constraint hours",
            Self::TimeConstraintDays => "Time constraint days",
            Self::RuleCounter => "Rule counter",
            Self::RuleState => "Rule state",
            Self::RuleTaskName => "Rule task name",
            Self::RuleTaskId => "Rule task id",
        }
    }

    fn all() -> &'static [Self] {
        &[
            Self::TaskCounter,
            Self::TaskType,
            Self::TaskName,
            Self::TaskId,
            Self::TaskEnabled,
            Self::TaskTimeout,
            Self::TaskRetries,
            Self::AppId,
            Self::PartialReload,
            Self::ManuallyTriggered,
            Self::ExternalProgramPath,
            Self::ExternalProgramParameters,
            Self::Tags,
            Self::CustomProperties,
            Self::EventCounter,
            Self::EventType,
            Self::EventName,
            Self::EventEnabled,
            Self::SchemaIncrementOption,
            Self::SchemaIncrementDescription,
            Self::DaylightSavingsTime,
            Self::SchemaStart,
            Self::SchemaExpiration,
            Self::SchemaFilterDescription,
            Self::SchemaTimeZone,
            Self::TimeConstraintSeconds,
            Self::TimeConstraintMinutes,
            Self::TimeConstraintHours,
            Self::TimeConstraintDays,
            Self::RuleCounter,
            Self::RuleState,
            Self::RuleTaskName,
            Self::RuleTaskId,
        ]
    }

    fn mandatory() -> &'static [Self] {
        &[
            Self::TaskCounter,
            Self::TaskType,
            Self::TaskName,
            Self::TaskId,
            Self::TaskEnabled,
            Self::TaskTimeout,
            Self::TaskRetries,
            Self::AppId,
            Self::PartialReload,
            Self::ManuallyTriggered,
            Self::Tags,
            Self::CustomProperties,
            Self::EventCounter,
            Self::EventType,
            Self::EventName,
            Self::EventEnabled,
            Self::SchemaIncrementOption,
            Self::SchemaIncrementDescription,
            Self::DaylightSavingsTime,
            Self::SchemaStart,
            Self::SchemaExpiration,
            Self::SchemaFilterDescription,
            Self::SchemaTimeZone,
            Self::TimeConstraintSeconds,
            Self::TimeConstraintMinutes,
            Self::TimeConstraintHours,
            Self::TimeConstraintDays,
            Self::RuleCounter,
            Self::RuleState,
            Self::RuleTaskName,
            Self::RuleTaskId,
        ]
    }
}

/// Columns of the app-import sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppColumn {
    AppCounter,
    AppName,
    QvfDirectory,
    QvfName,
    ExcludeDataConnections,
    AppTags,
    AppCustomProperties,
    OwnerUserDirectory,
    OwnerUserId,
    PublishToStream,
}

impl ColumnSpec for AppColumn {
    fn header_name(self) -> &'static str {
        match self {
            Self::AppCounter => "App counter",
            Self::AppName => "App name",
            Self::QvfDirectory => "QVF directory",
            Self::QvfName => "QVF name",
            Self::ExcludeDataConnections => "Exclude data connections",
            Self::AppTags => "App tags",
            Self::AppCustomProperties => "App custom properties",
            Self::OwnerUserDirectory => "Owner user directory",
            Self::OwnerUserId => "Owner user id",
            Self::PublishToStream => "Publish to stream",
        }
    }

    fn all() -> &'static [Self] {
        &[
            Self::AppCounter,
            Self::AppName,
            Self::QvfDirectory,
            Self::QvfName,
            Self::ExcludeDataConnections,
            Self::AppTags,
            Self::AppCustomProperties,
            Self::OwnerUserDirectory,
            Self::OwnerUserId,
            Self::PublishToStream,
        ]
    }

    fn mandatory() -> &'static [Self] {
        Self::all()
    }
}

/// Maps logical columns to cell positions for one header.
///
/// Unknown header columns are retained in the source rows but never
/// addressed.
#[derive(Debug, Clone)]
pub struct ColumnResolver<C: ColumnSpec> {
    positions: HashMap<C, usize>,
}

impl<C: ColumnSpec> ColumnResolver<C> {
    /// Build a resolver for a header, checking the mandatory set.
    pub fn new(header: &[String], by: ColRefBy) -> ImportResult<Self> {
        let mut positions: HashMap<C, usize> = HashMap::new();
        match by {
            ColRefBy::Name => {
                for column in C::all() {
                    if let Some(position) =
                        header.iter().position(|h| h.trim() == column.header_name())
                    {
                        positions.insert(*column, position);
                    }
                }
            }
            ColRefBy::Position => {
                for (position, column) in C::all().iter().enumerate() {
                    if position < header.len() {
                        positions.insert(*column, position);
                    }
                }
            }
        }
        for column in C::mandatory() {
            if !positions.contains_key(column) {
                return Err(ImportError::MissingColumn(column.header_name()));
            }
        }
        Ok(Self { positions })
    }

    /// Cell value for a logical column, trimmed. Missing optional columns
    /// and short rows read as `None`.
    pub fn get<'r>(&self, cells: &'r [String], column: C) -> Option<&'r str> {
        self.positions
            .get(&column)
            .and_then(|position| cells.get(*position))
            .map(|cell| cell.trim())
    }

    /// Like [`Self::get`] but treating the empty string as absent.
    pub fn get_non_empty<'r>(&self, cells: &'r [String], column: C) -> Option<&'r str> {
        self.get(cells, column).filter(|cell| !cell.is_empty())
    }
}
