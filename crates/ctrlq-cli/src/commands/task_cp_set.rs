//! Set a custom-property value on existing tasks.

use anyhow::{bail, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use serde_json::json;
use uuid::Uuid;

use ctrlq_core::{TaskFilter, TaskKind};

use super::ConnectionArgs;
use crate::output;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CpUpdateMode {
    /// Add the values to whatever is already set
    Append,
    /// Replace existing values of this property
    Replace,
}

#[derive(Args)]
pub struct TaskCpSetArgs {
    /// Task GUIDs to update
    #[arg(long = "task-id", num_args(1..))]
    pub task_id: Vec<String>,

    /// Update all tasks carrying any of these tags
    #[arg(long = "task-tag", num_args(1..))]
    pub task_tag: Vec<String>,

    /// Custom property to set
    #[arg(long)]
    pub custom_property_name: String,

    /// Values to set; each must be among the property's choices
    #[arg(long, num_args(1..))]
    pub custom_property_value: Vec<String>,

    /// How existing values of the property are treated
    #[arg(long, value_enum, default_value_t = CpUpdateMode::Append)]
    pub update_mode: CpUpdateMode,

    /// Apply without asking for confirmation
    #[arg(long)]
    pub overwrite: bool,
}

pub async fn execute(args: TaskCpSetArgs, connection: &ConnectionArgs) -> Result<()> {
    if args.task_id.is_empty() && args.task_tag.is_empty() {
        bail!("give at least one --task-id or --task-tag");
    }

    let qrs = connection.qrs_client()?;

    // Validate the property and every value against the server's choices.
    let definition = qrs
        .custom_property_by_name(&args.custom_property_name)
        .await?
        .ok_or_else(|| {
            anyhow::anyhow!("unknown custom property '{}'", args.custom_property_name)
        })?;
    for value in &args.custom_property_value {
        if !definition.choice_values.iter().any(|c| c == value) {
            bail!(
                "'{}' is not among the choices of custom property '{}'",
                value,
                definition.name
            );
        }
    }

    let graph = super::load_task_graph(&qrs).await?;
    let mut filter = TaskFilter::default();
    for id in &args.task_id {
        filter.task_ids.push(
            Uuid::parse_str(id).map_err(|_| anyhow::anyhow!("'{}' is not a valid task GUID", id))?,
        );
    }
    filter.task_tags = args.task_tag.clone();

    let tasks: Vec<_> = graph
        .select_tasks(&filter)
        .into_iter()
        .filter(|n| !n.tombstone)
        .map(|n| (n.id, n.kind, n.name.clone()))
        .collect();
    if tasks.is_empty() {
        println!("{}", "No matching tasks found.".dimmed());
        return Ok(());
    }

    if !args.overwrite {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!(
                "Set custom property '{}' on {} task(s)?",
                definition.name,
                tasks.len()
            ))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("{} Aborted, nothing changed.", output::warn_glyph());
            return Ok(());
        }
    }

    let mut failures = 0usize;
    for (id, kind, name) in &tasks {
        let definition_id = definition.id;
        let definition_name = definition.name.clone();
        let values = args.custom_property_value.clone();
        let mode = args.update_mode;
        let patch = move |task: &mut serde_json::Value| {
            apply_property(task, definition_id, &definition_name, &values, mode);
        };
        let result = match kind {
            TaskKind::Reload => qrs.patch_reload_task(*id, patch).await,
            TaskKind::ExternalProgram => qrs.patch_external_program_task(*id, patch).await,
        };
        match result {
            Ok(()) => println!("{} {}", output::ok_glyph(), name.cyan()),
            Err(error) => {
                failures += 1;
                println!("{} {}: {}", output::fail_glyph(), name.cyan(), error);
            }
        }
    }

    if failures > 0 {
        bail!("{} task update(s) failed", failures);
    }
    Ok(())
}

/// Rewrite the `customProperties` array of a full task object.
fn apply_property(
    task: &mut serde_json::Value,
    definition_id: Uuid,
    definition_name: &str,
    values: &[String],
    mode: CpUpdateMode,
) {
    let mut properties: Vec<serde_json::Value> = task
        .get("customProperties")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    if mode == CpUpdateMode::Replace {
        properties.retain(|p| {
            p.pointer("/definition/name")
                .and_then(|n| n.as_str())
                .map(|n| n != definition_name)
                .unwrap_or(true)
        });
    }

    for value in values {
        let exists = properties.iter().any(|p| {
            p.pointer("/definition/name").and_then(|n| n.as_str()) == Some(definition_name)
                && p.get("value").and_then(|v| v.as_str()) == Some(value.as_str())
        });
        if !exists {
            properties.push(json!({
                "value": value,
                "definition": { "id": definition_id, "name": definition_name },
            }));
        }
    }

    task["customProperties"] = serde_json::Value::Array(properties);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_with(values: &[(&str, &str)]) -> serde_json::Value {
        let properties: Vec<serde_json::Value> = values
            .iter()
            .map(|(name, value)| {
                json!({"value": value, "definition": {"id": Uuid::nil(), "name": name}})
            })
            .collect();
        json!({"name": "T1", "customProperties": properties})
    }

    #[test]
    fn test_append_keeps_existing_values() {
        let mut task = task_with(&[("Department", "Finance")]);
        apply_property(
            &mut task,
            Uuid::nil(),
            "Department",
            &["Ops".to_string()],
            CpUpdateMode::Append,
        );
        let properties = task["customProperties"].as_array().unwrap();
        assert_eq!(properties.len(), 2);
    }

    #[test]
    fn test_replace_drops_only_this_property() {
        let mut task = task_with(&[("Department", "Finance"), ("Region", "EU")]);
        apply_property(
            &mut task,
            Uuid::nil(),
            "Department",
            &["Ops".to_string()],
            CpUpdateMode::Replace,
        );
        let properties = task["customProperties"].as_array().unwrap();
        assert_eq!(properties.len(), 2);
        let names: Vec<&str> = properties
            .iter()
            .filter_map(|p| p.pointer("/definition/name").and_then(|n| n.as_str()))
            .collect();
        assert!(names.contains(&"Region"));
        let department_value = properties
            .iter()
            .find(|p| p.pointer("/definition/name").and_then(|n| n.as_str()) == Some("Department"))
            .and_then(|p| p.get("value"))
            .and_then(|v| v.as_str());
        assert_eq!(department_value, Some("Ops"));
    }

    #[test]
    fn test_append_is_idempotent_for_same_value() {
        let mut task = task_with(&[("Department", "Finance")]);
        apply_property(
            &mut task,
            Uuid::nil(),
            "Department",
            &["Finance".to_string()],
            CpUpdateMode::Append,
        );
        let properties = task["customProperties"].as_array().unwrap();
        assert_eq!(properties.len(), 1);
    }
}
