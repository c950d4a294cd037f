//! Row grouping, type coercion, and validation of import sources.
//!
//! Rows sharing a `Task counter` describe one task; within a task, rows
//! sharing an `Event counter` describe one trigger; within a composite
//! event, rows sharing a `Rule counter` describe one rule. Grouping is by
//! counter value, so row order within a group never changes the parse.

use chrono::{DateTime, Utc};
use ctrlq_core::{CustomPropertyValue, RuleState, SchemaEvent, TaskKind, TimeConstraint};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::columns::{AppColumn, ColRefBy, ColumnResolver, ColumnSpec, TaskColumn};
use crate::error::{Diagnostics, EntityRef, ImportError, ImportResult};
use crate::source::{RowData, SheetRows};

/// Parser configuration.
#[derive(Debug, Clone, Default)]
pub struct ParserOptions {
    pub col_ref_by: ColRefBy,
    /// When > 0, only task groups with `Task counter <= limit` are kept.
    pub limit_import_count: u32,
}

/// One rule row of a composite event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleRecord {
    pub rule_counter: u32,
    pub source_row: usize,
    pub state: RuleState,
    pub task_name: String,
    /// Raw reference: a server GUID or the `Task id` of another row in the
    /// same import.
    pub task_id: String,
}

/// One composite event declared on a task's rows.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeEventRecord {
    pub event_counter: u32,
    pub source_row: usize,
    pub name: String,
    pub enabled: bool,
    pub time_constraint: TimeConstraint,
    pub rules: Vec<RuleRecord>,
}

/// One task parsed from the source, references still unresolved.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskImportRecord {
    pub task_counter: u32,
    pub source_row: usize,
    /// Raw `Task id`: a local counter when referenced by rules, otherwise
    /// free-form.
    pub task_id: String,
    pub kind: TaskKind,
    pub name: String,
    pub enabled: bool,
    pub timeout_minutes: u32,
    pub max_retries: u32,
    pub app_ref: Option<String>,
    pub partial_reload: Option<bool>,
    pub manually_triggered: bool,
    pub program_path: Option<String>,
    pub program_parameters: Option<String>,
    pub tags: Vec<String>,
    pub custom_properties: Vec<CustomPropertyValue>,
    pub schema_events: Vec<SchemaEvent>,
    pub composite_events: Vec<CompositeEventRecord>,
}

/// One app-upload row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppImportRecord {
    pub app_counter: u32,
    pub source_row: usize,
    pub name: String,
    pub qvf_directory: String,
    pub qvf_name: String,
    pub exclude_data_connections: bool,
    pub tags: Vec<String>,
    pub custom_properties: Vec<CustomPropertyValue>,
    pub owner_user_directory: Option<String>,
    pub owner_user_id: Option<String>,
    pub publish_to_stream: Option<String>,
}

/// Parse the task sheet into task records, grouped and type-checked.
/// The first validation finding aborts the parse.
pub fn parse_task_sheet(
    sheet: &SheetRows,
    options: &ParserOptions,
) -> ImportResult<Vec<TaskImportRecord>> {
    parse_task_sheet_with(sheet, options, &mut Diagnostics::fail_fast())
}

/// Parse the task sheet, routing validation findings through the given
/// collector. With a collect-all collector the offending group is skipped
/// and parsing continues; header problems are fatal in both modes.
pub fn parse_task_sheet_with(
    sheet: &SheetRows,
    options: &ParserOptions,
    diagnostics: &mut Diagnostics,
) -> ImportResult<Vec<TaskImportRecord>> {
    let resolver: ColumnResolver<TaskColumn> =
        ColumnResolver::new(&sheet.header, options.col_ref_by)?;

    let mut groups: BTreeMap<u32, Vec<&RowData>> = BTreeMap::new();
    for row in &sheet.rows {
        match required_u32(
            &resolver,
            row,
            TaskColumn::TaskCounter,
            1,
            EntityRef::default(),
        ) {
            Ok(counter) => {
                groups.entry(counter).or_default().push(row);
            }
            Err(error) => diagnostics.push(error)?,
        }
    }

    if options.limit_import_count > 0 {
        groups.retain(|counter, _| *counter <= options.limit_import_count);
    }

    let mut records: Vec<TaskImportRecord> = Vec::with_capacity(groups.len());
    for (counter, rows) in groups {
        match parse_task_group(&resolver, counter, &rows) {
            Ok(record) => records.push(record),
            Err(error) => diagnostics.push(error)?,
        }
    }
    Ok(records)
}

fn parse_task_group(
    resolver: &ColumnResolver<TaskColumn>,
    task_counter: u32,
    rows: &[&RowData],
) -> ImportResult<TaskImportRecord> {
    let entity = EntityRef::task(task_counter);
    let head = rows[0];

    let kind: TaskKind = required_parse(resolver, head, TaskColumn::TaskType, entity)?;
    let name = required_string(resolver, head, TaskColumn::TaskName, entity)?;
    let task_id = resolver
        .get_non_empty(&head.cells, TaskColumn::TaskId)
        .unwrap_or_default()
        .to_string();
    let enabled = cell_bool01(resolver, head, TaskColumn::TaskEnabled, entity)?;
    let timeout_minutes = required_u32(resolver, head, TaskColumn::TaskTimeout, 1, entity)?;
    let max_retries = cell_u32(resolver, head, TaskColumn::TaskRetries, 0, entity)?.unwrap_or(0);
    let manually_triggered = cell_bool01(resolver, head, TaskColumn::ManuallyTriggered, entity)?;

    let app_ref = resolver
        .get_non_empty(&head.cells, TaskColumn::AppId)
        .map(str::to_string);
    let program_path = resolver
        .get_non_empty(&head.cells, TaskColumn::ExternalProgramPath)
        .map(str::to_string);
    let program_parameters = resolver
        .get_non_empty(&head.cells, TaskColumn::ExternalProgramParameters)
        .map(str::to_string);

    // Kind determines which payload columns may be populated.
    let (app_ref, partial_reload) = match kind {
        TaskKind::Reload => {
            if program_path.is_some() {
                return Err(ImportError::RowValue {
                    row: head.number,
                    entity,
                    message: "reload task must not carry an external program path".to_string(),
                });
            }
            let app_ref = app_ref.ok_or(ImportError::CellValue {
                row: head.number,
                column: TaskColumn::AppId.header_name(),
                entity,
                message: "reload task requires an app reference".to_string(),
            })?;
            let partial = cell_bool01(resolver, head, TaskColumn::PartialReload, entity)?;
            (Some(app_ref), Some(partial))
        }
        TaskKind::ExternalProgram => {
            if app_ref.is_some()
                || resolver
                    .get_non_empty(&head.cells, TaskColumn::PartialReload)
                    .is_some()
            {
                return Err(ImportError::RowValue {
                    row: head.number,
                    entity,
                    message: "external program task must not carry reload fields".to_string(),
                });
            }
            if program_path.is_none() {
                return Err(ImportError::CellValue {
                    row: head.number,
                    column: TaskColumn::ExternalProgramPath.header_name(),
                    entity,
                    message: "external program task requires a path".to_string(),
                });
            }
            (None, None)
        }
    };

    let tags = split_list(
        resolver
            .get_non_empty(&head.cells, TaskColumn::Tags)
            .unwrap_or_default(),
    );
    let custom_properties = parse_custom_properties(
        resolver
            .get_non_empty(&head.cells, TaskColumn::CustomProperties)
            .unwrap_or_default(),
        head.number,
        entity,
    )?;

    // Event rows, grouped by counter value.
    let mut event_groups: BTreeMap<u32, Vec<&RowData>> = BTreeMap::new();
    for &row in rows {
        if let Some(counter) = cell_u32(resolver, row, TaskColumn::EventCounter, 1, entity)? {
            event_groups.entry(counter).or_default().push(row);
        }
    }

    let mut schema_events: Vec<SchemaEvent> = Vec::new();
    let mut composite_events: Vec<CompositeEventRecord> = Vec::new();
    for (event_counter, event_rows) in event_groups {
        let entity = EntityRef::event(task_counter, event_counter);
        let head = event_rows[0];
        let event_type = resolver
            .get_non_empty(&head.cells, TaskColumn::EventType)
            .ok_or(ImportError::CellValue {
                row: head.number,
                column: TaskColumn::EventType.header_name(),
                entity,
                message: "event type is required".to_string(),
            })?;
        match event_type {
            "Schema" => schema_events.push(parse_schema_event(resolver, head, entity)?),
            "Composite" => composite_events.push(parse_composite_event(
                resolver,
                task_counter,
                event_counter,
                &event_rows,
            )?),
            other => {
                return Err(ImportError::CellValue {
                    row: head.number,
                    column: TaskColumn::EventType.header_name(),
                    entity,
                    message: format!("unknown event type '{}'", other),
                })
            }
        }
    }

    Ok(TaskImportRecord {
        task_counter,
        source_row: head.number,
        task_id,
        kind,
        name,
        enabled,
        timeout_minutes,
        max_retries,
        app_ref,
        partial_reload,
        manually_triggered,
        program_path,
        program_parameters,
        tags,
        custom_properties,
        schema_events,
        composite_events,
    })
}

fn parse_schema_event(
    resolver: &ColumnResolver<TaskColumn>,
    row: &RowData,
    entity: EntityRef,
) -> ImportResult<SchemaEvent> {
    let event = SchemaEvent {
        name: required_string(resolver, row, TaskColumn::EventName, entity)?,
        enabled: cell_bool01(resolver, row, TaskColumn::EventEnabled, entity)?,
        increment_option: required_parse(resolver, row, TaskColumn::SchemaIncrementOption, entity)?,
        increment_description: required_parse(
            resolver,
            row,
            TaskColumn::SchemaIncrementDescription,
            entity,
        )?,
        daylight_saving: required_parse(resolver, row, TaskColumn::DaylightSavingsTime, entity)?,
        start: required_timestamp(resolver, row, TaskColumn::SchemaStart, entity)?,
        expiration: required_timestamp(resolver, row, TaskColumn::SchemaExpiration, entity)?,
        filter_description: resolver
            .get_non_empty(&row.cells, TaskColumn::SchemaFilterDescription)
            .unwrap_or_default()
            .to_string(),
        time_zone: required_string(resolver, row, TaskColumn::SchemaTimeZone, entity)?,
    };
    event.validate().map_err(|e| ImportError::RowValue {
        row: row.number,
        entity,
        message: e.to_string(),
    })?;
    Ok(event)
}

fn parse_composite_event(
    resolver: &ColumnResolver<TaskColumn>,
    task_counter: u32,
    event_counter: u32,
    rows: &[&RowData],
) -> ImportResult<CompositeEventRecord> {
    let entity = EntityRef::event(task_counter, event_counter);
    let head = rows[0];

    let time_constraint = TimeConstraint {
        seconds: cell_u32(resolver, head, TaskColumn::TimeConstraintSeconds, 0, entity)?
            .unwrap_or(0),
        minutes: cell_u32(resolver, head, TaskColumn::TimeConstraintMinutes, 0, entity)?
            .unwrap_or(0),
        hours: cell_u32(resolver, head, TaskColumn::TimeConstraintHours, 0, entity)?.unwrap_or(0),
        days: cell_u32(resolver, head, TaskColumn::TimeConstraintDays, 0, entity)?.unwrap_or(0),
    };

    let mut rule_groups: BTreeMap<u32, Vec<&RowData>> = BTreeMap::new();
    for &row in rows {
        if let Some(counter) = cell_u32(resolver, row, TaskColumn::RuleCounter, 1, entity)? {
            rule_groups.entry(counter).or_default().push(row);
        }
    }

    let mut rules: Vec<RuleRecord> = Vec::new();
    for (rule_counter, rule_rows) in rule_groups {
        let entity = EntityRef::rule(task_counter, event_counter, rule_counter);
        let head = rule_rows[0];
        rules.push(RuleRecord {
            rule_counter,
            source_row: head.number,
            state: required_parse(resolver, head, TaskColumn::RuleState, entity)?,
            task_name: resolver
                .get_non_empty(&head.cells, TaskColumn::RuleTaskName)
                .unwrap_or_default()
                .to_string(),
            task_id: required_string(resolver, head, TaskColumn::RuleTaskId, entity)?,
        });
    }

    if rules.is_empty() {
        return Err(ImportError::RowValue {
            row: head.number,
            entity,
            message: "composite event has no rules".to_string(),
        });
    }

    Ok(CompositeEventRecord {
        event_counter,
        source_row: head.number,
        name: required_string(resolver, head, TaskColumn::EventName, entity)?,
        enabled: cell_bool01(resolver, head, TaskColumn::EventEnabled, entity)?,
        time_constraint,
        rules,
    })
}

/// Parse the app sheet into upload records. The first validation finding
/// aborts the parse.
pub fn parse_app_sheet(
    sheet: &SheetRows,
    options: &ParserOptions,
) -> ImportResult<Vec<AppImportRecord>> {
    parse_app_sheet_with(sheet, options, &mut Diagnostics::fail_fast())
}

/// Parse the app sheet, routing validation findings through the given
/// collector.
pub fn parse_app_sheet_with(
    sheet: &SheetRows,
    options: &ParserOptions,
    diagnostics: &mut Diagnostics,
) -> ImportResult<Vec<AppImportRecord>> {
    let resolver: ColumnResolver<AppColumn> =
        ColumnResolver::new(&sheet.header, options.col_ref_by)?;

    let mut groups: BTreeMap<u32, Vec<&RowData>> = BTreeMap::new();
    for row in &sheet.rows {
        match app_required_u32(&resolver, row, AppColumn::AppCounter) {
            Ok(counter) => {
                groups.entry(counter).or_default().push(row);
            }
            Err(error) => diagnostics.push(error)?,
        }
    }

    let mut records: Vec<AppImportRecord> = Vec::with_capacity(groups.len());
    for (app_counter, rows) in groups {
        match parse_app_group(&resolver, app_counter, &rows) {
            Ok(record) => records.push(record),
            Err(error) => diagnostics.push(error)?,
        }
    }
    Ok(records)
}

fn parse_app_group(
    resolver: &ColumnResolver<AppColumn>,
    app_counter: u32,
    rows: &[&RowData],
) -> ImportResult<AppImportRecord> {
    let entity = EntityRef::app(app_counter);
    let head = rows[0];
    let owner_user_directory = resolver
        .get_non_empty(&head.cells, AppColumn::OwnerUserDirectory)
        .map(str::to_string);
    let owner_user_id = resolver
        .get_non_empty(&head.cells, AppColumn::OwnerUserId)
        .map(str::to_string);
    if owner_user_directory.is_some() != owner_user_id.is_some() {
        return Err(ImportError::RowValue {
            row: head.number,
            entity,
            message: "owner user directory and id must both be given or both empty".to_string(),
        });
    }
    Ok(AppImportRecord {
        app_counter,
        source_row: head.number,
        name: app_required_string(resolver, head, AppColumn::AppName, entity)?,
        qvf_directory: app_required_string(resolver, head, AppColumn::QvfDirectory, entity)?,
        qvf_name: app_required_string(resolver, head, AppColumn::QvfName, entity)?,
        exclude_data_connections: app_bool01(
            resolver,
            head,
            AppColumn::ExcludeDataConnections,
            entity,
        )?,
        tags: split_list(
            resolver
                .get_non_empty(&head.cells, AppColumn::AppTags)
                .unwrap_or_default(),
        ),
        custom_properties: parse_custom_properties(
            resolver
                .get_non_empty(&head.cells, AppColumn::AppCustomProperties)
                .unwrap_or_default(),
            head.number,
            entity,
        )?,
        owner_user_directory,
        owner_user_id,
        publish_to_stream: resolver
            .get_non_empty(&head.cells, AppColumn::PublishToStream)
            .map(str::to_string),
    })
}

// Coercion helpers. Integer columns accept the empty string as "absent";
// bool columns accept 0, 1, or empty (empty = false).

fn cell_u32(
    resolver: &ColumnResolver<TaskColumn>,
    row: &RowData,
    column: TaskColumn,
    min: u32,
    entity: EntityRef,
) -> ImportResult<Option<u32>> {
    match resolver.get_non_empty(&row.cells, column) {
        None => Ok(None),
        Some(cell) => match cell.parse::<u32>() {
            Ok(value) if value >= min => Ok(Some(value)),
            _ => Err(ImportError::CellValue {
                row: row.number,
                column: column.header_name(),
                entity,
                message: format!("expected an integer >= {}, got '{}'", min, cell),
            }),
        },
    }
}

fn required_u32(
    resolver: &ColumnResolver<TaskColumn>,
    row: &RowData,
    column: TaskColumn,
    min: u32,
    entity: EntityRef,
) -> ImportResult<u32> {
    cell_u32(resolver, row, column, min, entity)?.ok_or(ImportError::CellValue {
        row: row.number,
        column: column.header_name(),
        entity,
        message: format!("expected an integer >= {}, got an empty cell", min),
    })
}

fn cell_bool01(
    resolver: &ColumnResolver<TaskColumn>,
    row: &RowData,
    column: TaskColumn,
    entity: EntityRef,
) -> ImportResult<bool> {
    bool01(
        resolver.get(&row.cells, column).unwrap_or_default(),
        row.number,
        column.header_name(),
        entity,
    )
}

fn bool01(cell: &str, row: usize, column: &'static str, entity: EntityRef) -> ImportResult<bool> {
    match cell {
        "" | "0" => Ok(false),
        "1" => Ok(true),
        other => Err(ImportError::CellValue {
            row,
            column,
            entity,
            message: format!("expected 0, 1, or empty, got '{}'", other),
        }),
    }
}

fn required_string(
    resolver: &ColumnResolver<TaskColumn>,
    row: &RowData,
    column: TaskColumn,
    entity: EntityRef,
) -> ImportResult<String> {
    resolver
        .get_non_empty(&row.cells, column)
        .map(str::to_string)
        .ok_or(ImportError::CellValue {
            row: row.number,
            column: column.header_name(),
            entity,
            message: "value is required".to_string(),
        })
}

fn required_parse<T>(
    resolver: &ColumnResolver<TaskColumn>,
    row: &RowData,
    column: TaskColumn,
    entity: EntityRef,
) -> ImportResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let cell = resolver
        .get_non_empty(&row.cells, column)
        .ok_or(ImportError::CellValue {
            row: row.number,
            column: column.header_name(),
            entity,
            message: "value is required".to_string(),
        })?;
    cell.parse::<T>().map_err(|e| ImportError::CellValue {
        row: row.number,
        column: column.header_name(),
        entity,
        message: e.to_string(),
    })
}

fn required_timestamp(
    resolver: &ColumnResolver<TaskColumn>,
    row: &RowData,
    column: TaskColumn,
    entity: EntityRef,
) -> ImportResult<DateTime<Utc>> {
    let cell = resolver
        .get_non_empty(&row.cells, column)
        .ok_or(ImportError::CellValue {
            row: row.number,
            column: column.header_name(),
            entity,
            message: "timestamp is required".to_string(),
        })?;
    DateTime::parse_from_rfc3339(cell)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| ImportError::CellValue {
            row: row.number,
            column: column.header_name(),
            entity,
            message: format!("expected an ISO-8601 timestamp, got '{}'", cell),
        })
}

fn app_required_u32(
    resolver: &ColumnResolver<AppColumn>,
    row: &RowData,
    column: AppColumn,
) -> ImportResult<u32> {
    let cell = resolver
        .get_non_empty(&row.cells, column)
        .ok_or(ImportError::CellValue {
            row: row.number,
            column: column.header_name(),
            entity: EntityRef::default(),
            message: "expected an integer >= 1, got an empty cell".to_string(),
        })?;
    match cell.parse::<u32>() {
        Ok(value) if value >= 1 => Ok(value),
        _ => Err(ImportError::CellValue {
            row: row.number,
            column: column.header_name(),
            entity: EntityRef::default(),
            message: format!("expected an integer >= 1, got '{}'", cell),
        }),
    }
}

fn app_required_string(
    resolver: &ColumnResolver<AppColumn>,
    row: &RowData,
    column: AppColumn,
    entity: EntityRef,
) -> ImportResult<String> {
    resolver
        .get_non_empty(&row.cells, column)
        .map(str::to_string)
        .ok_or(ImportError::CellValue {
            row: row.number,
            column: column.header_name(),
            entity,
            message: "value is required".to_string(),
        })
}

fn app_bool01(
    resolver: &ColumnResolver<AppColumn>,
    row: &RowData,
    column: AppColumn,
    entity: EntityRef,
) -> ImportResult<bool> {
    bool01(
        resolver.get(&row.cells, column).unwrap_or_default(),
        row.number,
        column.header_name(),
        entity,
    )
}

/// Split a `a / b / c` list cell.
fn split_list(cell: &str) -> Vec<String> {
    cell.split('/')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a `name=value / name=value` cell.
fn parse_custom_properties(
    cell: &str,
    row: usize,
    entity: EntityRef,
) -> ImportResult<Vec<CustomPropertyValue>> {
    split_list(cell)
        .into_iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(name, value)| CustomPropertyValue {
                    name: name.trim().to_string(),
                    value: value.trim().to_string(),
                })
                .ok_or_else(|| ImportError::RowValue {
                    row,
                    entity,
                    message: format!("custom property '{}' is not on the name=value form", pair),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> Vec<String> {
        TaskColumn::all()
            .iter()
            .map(|c| c.header_name().to_string())
            .collect()
    }

    fn row(number: usize, values: &[(TaskColumn, &str)]) -> RowData {
        let mut cells = vec![String::new(); TaskColumn::all().len()];
        for (column, value) in values {
            let position = TaskColumn::all().iter().position(|c| c == column).unwrap();
            cells[position] = value.to_string();
        }
        RowData { number, cells }
    }

    fn reload_row(number: usize, counter: &str, name: &str) -> RowData {
        row(
            number,
            &[
                (TaskColumn::TaskCounter, counter),
                (TaskColumn::TaskType, "Reload"),
                (TaskColumn::TaskName, name),
                (TaskColumn::TaskId, counter),
                (TaskColumn::TaskEnabled, "1"),
                (TaskColumn::TaskTimeout, "1440"),
                (TaskColumn::TaskRetries, "0"),
                (
                    TaskColumn::AppId,
                    "a1b2c3d4-0000-0000-0000-000000000001",
                ),
            ],
        )
    }

    fn sheet(rows: Vec<RowData>) -> SheetRows {
        SheetRows {
            header: header(),
            rows,
        }
    }

    #[test]
    fn test_single_task_no_events() {
        let records =
            parse_task_sheet(&sheet(vec![reload_row(2, "1", "T1")]), &ParserOptions::default())
                .unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.name, "T1");
        assert_eq!(record.kind, TaskKind::Reload);
        assert!(record.schema_events.is_empty());
        assert!(record.composite_events.is_empty());
    }

    #[test]
    fn test_schema_event_row() {
        let event_row = row(
            3,
            &[
                (TaskColumn::TaskCounter, "1"),
                (TaskColumn::EventCounter, "1"),
                (TaskColumn::EventType, "Schema"),
                (TaskColumn::EventName, "Daily at midnight"),
                (TaskColumn::EventEnabled, "1"),
                (TaskColumn::SchemaIncrementOption, "daily"),
                (TaskColumn::SchemaIncrementDescription, "0 0 1 0"),
                (TaskColumn::DaylightSavingsTime, "ObserveDaylightSavingTime"),
                (TaskColumn::SchemaStart, "2024-01-01T00:00:00.000Z"),
                (TaskColumn::SchemaExpiration, "9999-01-01T00:00:00.000Z"),
                (TaskColumn::SchemaFilterDescription, "* * - * * * * *"),
                (TaskColumn::SchemaTimeZone, "Europe/Stockholm"),
            ],
        );
        let records = parse_task_sheet(
            &sheet(vec![reload_row(2, "1", "T1"), event_row]),
            &ParserOptions::default(),
        )
        .unwrap();
        assert_eq!(records[0].schema_events.len(), 1);
        let event = &records[0].schema_events[0];
        assert_eq!(event.name, "Daily at midnight");
        assert!(event.never_expires());
    }

    #[test]
    fn test_composite_event_with_rules() {
        let rule_row = |n: usize, rule: &str, target: &str| {
            row(
                n,
                &[
                    (TaskColumn::TaskCounter, "2"),
                    (TaskColumn::EventCounter, "1"),
                    (TaskColumn::EventType, "Composite"),
                    (TaskColumn::EventName, "When upstreams done"),
                    (TaskColumn::EventEnabled, "1"),
                    (TaskColumn::TimeConstraintMinutes, "360"),
                    (TaskColumn::RuleCounter, rule),
                    (TaskColumn::RuleState, "TaskSuccessful"),
                    (TaskColumn::RuleTaskId, target),
                ],
            )
        };
        let records = parse_task_sheet(
            &sheet(vec![
                reload_row(2, "1", "T1"),
                reload_row(3, "2", "T2"),
                rule_row(4, "1", "1"),
                rule_row(5, "2", "f2a193f5-fd34-4b62-9b4e-8c7a0b5e18c2"),
            ]),
            &ParserOptions::default(),
        )
        .unwrap();
        let composite = &records[1].composite_events[0];
        assert_eq!(composite.time_constraint.minutes, 360);
        assert_eq!(composite.rules.len(), 2);
        assert_eq!(composite.rules[0].task_id, "1");
    }

    #[test]
    fn test_rule_rows_merge_and_order_is_irrelevant() {
        let rule_row = |n: usize, rule: &str| {
            row(
                n,
                &[
                    (TaskColumn::TaskCounter, "2"),
                    (TaskColumn::EventCounter, "1"),
                    (TaskColumn::EventType, "Composite"),
                    (TaskColumn::EventName, "Dep"),
                    (TaskColumn::EventEnabled, "1"),
                    (TaskColumn::RuleCounter, rule),
                    (TaskColumn::RuleState, "TaskSuccessful"),
                    (TaskColumn::RuleTaskId, "1"),
                ],
            )
        };
        let forwards = parse_task_sheet(
            &sheet(vec![
                reload_row(2, "1", "T1"),
                reload_row(3, "2", "T2"),
                rule_row(4, "1"),
                rule_row(5, "2"),
            ]),
            &ParserOptions::default(),
        )
        .unwrap();
        let backwards = parse_task_sheet(
            &sheet(vec![
                rule_row(2, "2"),
                rule_row(3, "1"),
                reload_row(4, "2", "T2"),
                reload_row(5, "1", "T1"),
            ]),
            &ParserOptions::default(),
        )
        .unwrap();
        assert_eq!(
            forwards[1].composite_events[0].rules.len(),
            backwards[1].composite_events[0].rules.len()
        );
        assert_eq!(forwards[1].name, backwards[1].name);
    }

    #[test]
    fn test_composite_without_rules_rejected() {
        let event_row = row(
            3,
            &[
                (TaskColumn::TaskCounter, "1"),
                (TaskColumn::EventCounter, "1"),
                (TaskColumn::EventType, "Composite"),
                (TaskColumn::EventName, "Orphan"),
                (TaskColumn::EventEnabled, "1"),
            ],
        );
        let result = parse_task_sheet(
            &sheet(vec![reload_row(2, "1", "T1"), event_row]),
            &ParserOptions::default(),
        );
        assert!(matches!(result, Err(ImportError::RowValue { .. })));
    }

    #[test]
    fn test_collect_all_keeps_valid_tasks_and_gathers_issues() {
        let mut bad_enabled = reload_row(3, "2", "T2");
        let position = TaskColumn::all()
            .iter()
            .position(|c| *c == TaskColumn::TaskEnabled)
            .unwrap();
        bad_enabled.cells[position] = "yes".to_string();
        let missing_path = row(
            4,
            &[
                (TaskColumn::TaskCounter, "3"),
                (TaskColumn::TaskType, "External program"),
                (TaskColumn::TaskName, "T3"),
                (TaskColumn::TaskEnabled, "1"),
                (TaskColumn::TaskTimeout, "60"),
            ],
        );

        let mut diagnostics = Diagnostics::collect_all();
        let records = parse_task_sheet_with(
            &sheet(vec![reload_row(2, "1", "T1"), bad_enabled, missing_path]),
            &ParserOptions::default(),
            &mut diagnostics,
        )
        .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "T1");
        assert_eq!(diagnostics.issues().len(), 2);
        assert!(!diagnostics.is_empty());
    }

    #[test]
    fn test_fail_fast_is_the_default_mode() {
        let mut bad = reload_row(2, "1", "T1");
        let position = TaskColumn::all()
            .iter()
            .position(|c| *c == TaskColumn::TaskEnabled)
            .unwrap();
        bad.cells[position] = "yes".to_string();
        // The plain entry point aborts on the first finding.
        let result = parse_task_sheet(
            &sheet(vec![bad, reload_row(3, "2", "T2")]),
            &ParserOptions::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_type_coercion_diagnostic_names_column_and_row() {
        let mut bad = reload_row(7, "1", "T1");
        let position = TaskColumn::all()
            .iter()
            .position(|c| *c == TaskColumn::TaskEnabled)
            .unwrap();
        bad.cells[position] = "yes".to_string();
        let result = parse_task_sheet(&sheet(vec![bad]), &ParserOptions::default());
        match result {
            Err(ImportError::CellValue { row, column, .. }) => {
                assert_eq!(row, 7);
                assert_eq!(column, "Task enabled");
            }
            other => panic!("expected a cell diagnostic, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_stray_reload_fields_on_external_program_task() {
        let bad = row(
            2,
            &[
                (TaskColumn::TaskCounter, "1"),
                (TaskColumn::TaskType, "External program"),
                (TaskColumn::TaskName, "Run script"),
                (TaskColumn::TaskEnabled, "1"),
                (TaskColumn::TaskTimeout, "60"),
                (TaskColumn::AppId, "a1b2c3d4-0000-0000-0000-000000000001"),
                (TaskColumn::ExternalProgramPath, "/usr/bin/true"),
            ],
        );
        let result = parse_task_sheet(&sheet(vec![bad]), &ParserOptions::default());
        assert!(matches!(result, Err(ImportError::RowValue { .. })));
    }

    #[test]
    fn test_limit_import_count() {
        let rows = vec![
            reload_row(2, "1", "T1"),
            reload_row(3, "2", "T2"),
            reload_row(4, "3", "T3"),
        ];
        let unlimited =
            parse_task_sheet(&sheet(rows.clone()), &ParserOptions::default()).unwrap();
        assert_eq!(unlimited.len(), 3);

        let limited = parse_task_sheet(
            &sheet(rows),
            &ParserOptions {
                limit_import_count: 1,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].name, "T1");
    }

    #[test]
    fn test_app_sheet_parse() {
        let header: Vec<String> = AppColumn::all()
            .iter()
            .map(|c| c.header_name().to_string())
            .collect();
        let mut cells = vec![String::new(); header.len()];
        cells[0] = "1".to_string();
        cells[1] = "Sales".to_string();
        cells[2] = "/data/qvf".to_string();
        cells[3] = "sales.qvf".to_string();
        cells[4] = "1".to_string();
        cells[5] = "finance".to_string();
        let records = parse_app_sheet(
            &SheetRows {
                header,
                rows: vec![RowData { number: 2, cells }],
            },
            &ParserOptions::default(),
        )
        .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Sales");
        assert!(records[0].exclude_data_connections);
        assert_eq!(records[0].tags, vec!["finance"]);
        assert!(records[0].owner_user_directory.is_none());
    }

    #[test]
    fn test_app_owner_requires_both_fields() {
        let header: Vec<String> = AppColumn::all()
            .iter()
            .map(|c| c.header_name().to_string())
            .collect();
        let mut cells = vec![String::new(); header.len()];
        cells[0] = "1".to_string();
        cells[1] = "Sales".to_string();
        cells[2] = "/data/qvf".to_string();
        cells[3] = "sales.qvf".to_string();
        cells[7] = "ACME".to_string();
        let result = parse_app_sheet(
            &SheetRows {
                header,
                rows: vec![RowData { number: 2, cells }],
            },
            &ParserOptions::default(),
        );
        assert!(matches!(result, Err(ImportError::RowValue { .. })));
    }
}
