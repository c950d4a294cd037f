//! Tabular task projection.

use chrono::{DateTime, Utc};
use ctrlq_core::TaskFilter;
use serde::Serialize;
use std::str::FromStr;

use crate::model::{TaskGraph, TaskNode};

/// Column blocks selectable with `--table-details`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableDetails {
    Common,
    LastExecution,
    Tag,
    CustomProperty,
    SchemaTrigger,
    CompositeTrigger,
}

impl TableDetails {
    pub const ALL: [TableDetails; 6] = [
        Self::Common,
        Self::LastExecution,
        Self::Tag,
        Self::CustomProperty,
        Self::SchemaTrigger,
        Self::CompositeTrigger,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::LastExecution => "lastexecution",
            Self::Tag => "tag",
            Self::CustomProperty => "customproperty",
            Self::SchemaTrigger => "schematrigger",
            Self::CompositeTrigger => "compositetrigger",
        }
    }
}

impl FromStr for TableDetails {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "common" => Ok(Self::Common),
            "lastexecution" => Ok(Self::LastExecution),
            "tag" => Ok(Self::Tag),
            "customproperty" => Ok(Self::CustomProperty),
            "schematrigger" => Ok(Self::SchemaTrigger),
            "compositetrigger" => Ok(Self::CompositeTrigger),
            other => Err(format!("unknown table detail block '{}'", other)),
        }
    }
}

/// Header plus rows, ready for a terminal, CSV, Excel, or JSON sink.
#[derive(Debug, Clone, Serialize)]
pub struct TaskTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Project the tasks matching `filter` into a table with the selected
/// column blocks, one row per task.
pub fn build_task_table(
    graph: &TaskGraph,
    filter: &TaskFilter,
    details: &[TableDetails],
) -> TaskTable {
    let mut header: Vec<String> = Vec::new();
    for block in details {
        match block {
            TableDetails::Common => header.extend(
                [
                    "Task id",
                    "Task name",
                    "Task type",
                    "Task enabled",
                    "Task timeout",
                    "Task retries",
                    "App id",
                    "App name",
                    "Partial reload",
                    "Manually triggered",
                ]
                .map(String::from),
            ),
            TableDetails::LastExecution => header.extend(
                [
                    "Last execution status",
                    "Last execution start",
                    "Last execution stop",
                    "Next execution",
                ]
                .map(String::from),
            ),
            TableDetails::Tag => header.push("Tags".to_string()),
            TableDetails::CustomProperty => header.push("Custom properties".to_string()),
            TableDetails::SchemaTrigger => header.push("Schema triggers".to_string()),
            TableDetails::CompositeTrigger => header.push("Composite triggers".to_string()),
        }
    }

    let rows = graph
        .select_tasks(filter)
        .into_iter()
        .filter(|n| !n.tombstone)
        .map(|node| task_row(graph, node, details))
        .collect();

    TaskTable { header, rows }
}

fn task_row(graph: &TaskGraph, node: &TaskNode, details: &[TableDetails]) -> Vec<String> {
    let mut row: Vec<String> = Vec::new();
    for block in details {
        match block {
            TableDetails::Common => {
                row.push(node.id.to_string());
                row.push(node.name.clone());
                row.push(node.kind.as_str().to_string());
                row.push(bool_cell(node.enabled));
                row.push(node.session_timeout_minutes.to_string());
                row.push(node.max_retries.to_string());
                row.push(opt_cell(node.app_id.map(|id| id.to_string())));
                row.push(opt_cell(node.app_name.clone()));
                row.push(opt_cell(node.partial_reload.map(bool_cell)));
                row.push(opt_cell(node.manually_triggered.map(bool_cell)));
            }
            TableDetails::LastExecution => {
                row.push(opt_cell(node.last_status.clone()));
                row.push(opt_cell(node.last_start.map(timestamp_cell)));
                row.push(opt_cell(node.last_stop.map(timestamp_cell)));
                row.push(opt_cell(node.next_start.map(timestamp_cell)));
            }
            TableDetails::Tag => row.push(node.tags.join(" / ")),
            TableDetails::CustomProperty => row.push(
                node.custom_properties
                    .iter()
                    .map(|cp| format!("{}={}", cp.name, cp.value))
                    .collect::<Vec<_>>()
                    .join(" / "),
            ),
            TableDetails::SchemaTrigger => row.push(
                node.schedule_triggers
                    .iter()
                    .map(|t| match t.increment_option {
                        Some(option) => format!("{} [{}]", t.name, option.as_str()),
                        None => t.name.clone(),
                    })
                    .collect::<Vec<_>>()
                    .join(" / "),
            ),
            TableDetails::CompositeTrigger => row.push(
                graph
                    .edges_to(node.id)
                    .iter()
                    .map(|edge| {
                        let upstream = graph
                            .task(edge.upstream)
                            .map(|n| n.name.clone())
                            .unwrap_or_else(|| edge.upstream.to_string());
                        format!("{} <- {} ({})", node.name, upstream, edge.state.as_str())
                    })
                    .collect::<Vec<_>>()
                    .join(" / "),
            ),
        }
    }
    row
}

fn bool_cell(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

fn opt_cell(value: Option<String>) -> String {
    value.unwrap_or_default()
}

fn timestamp_cell(value: DateTime<Utc>) -> String {
    value.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
