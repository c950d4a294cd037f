//! Creation payloads for the Repository's create endpoints.
//!
//! `/qrs/reloadtask/create` and `/qrs/externalprogramtask/create` accept a
//! bundle of the task plus its schedule events, created atomically.
//! Composite events are posted separately once every endpoint task exists.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::types::{QrsCustomPropertyValue, QrsTag, QrsTimeConstraint};

/// Bare `{id}` reference accepted by create endpoints.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct IdRef {
    pub id: Uuid,
}

/// Bundle for `/qrs/reloadtask/create`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadTaskCreate {
    pub task: ReloadTaskSpec,
    pub schema_events: Vec<SchemaEventSpec>,
    /// Always empty: composite events are Phase B work.
    pub composite_events: Vec<CompositeEventSpec>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadTaskSpec {
    pub name: String,
    pub enabled: bool,
    pub task_session_timeout: u32,
    pub max_retries: u32,
    pub app: IdRef,
    pub is_partial_reload: bool,
    pub is_manually_triggered: bool,
    pub tags: Vec<QrsTag>,
    pub custom_properties: Vec<QrsCustomPropertyValue>,
}

/// Bundle for `/qrs/externalprogramtask/create`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalProgramTaskCreate {
    pub task: ExternalProgramTaskSpec,
    pub schema_events: Vec<SchemaEventSpec>,
    pub composite_events: Vec<CompositeEventSpec>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalProgramTaskSpec {
    pub name: String,
    pub enabled: bool,
    pub task_session_timeout: u32,
    pub max_retries: u32,
    pub path: String,
    pub parameters: String,
    pub tags: Vec<QrsTag>,
    pub custom_properties: Vec<QrsCustomPropertyValue>,
}

/// Schedule event embedded in a task-creation bundle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaEventSpec {
    pub name: String,
    pub enabled: bool,
    /// 0 = schema event on the QRS wire.
    pub event_type: i32,
    pub increment_option: i32,
    pub increment_description: String,
    pub schema_filter_description: Vec<String>,
    pub start_date: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
    pub time_zone: String,
    pub daylight_saving_time: i32,
}

/// Payload for `/qrs/compositeevent` (Phase B).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeEventSpec {
    pub name: String,
    pub enabled: bool,
    /// 1 = composite event on the QRS wire.
    pub event_type: i32,
    pub time_constraint: QrsTimeConstraint,
    pub composite_rules: Vec<CompositeRuleSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reload_task: Option<IdRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_program_task: Option<IdRef>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeRuleSpec {
    pub rule_state: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reload_task: Option<IdRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_program_task: Option<IdRef>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_reload_bundle_serializes_camel_case() {
        let bundle = ReloadTaskCreate {
            task: ReloadTaskSpec {
                name: "T1".to_string(),
                enabled: true,
                task_session_timeout: 1440,
                max_retries: 0,
                app: IdRef { id: Uuid::nil() },
                is_partial_reload: false,
                is_manually_triggered: false,
                tags: vec![],
                custom_properties: vec![],
            },
            schema_events: vec![SchemaEventSpec {
                name: "daily".to_string(),
                enabled: true,
                event_type: 0,
                increment_option: 2,
                increment_description: "0 0 1 0".to_string(),
                schema_filter_description: vec!["* * - * * * * *".to_string()],
                start_date: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                expiration_date: Utc.with_ymd_and_hms(9999, 1, 1, 0, 0, 0).unwrap(),
                time_zone: "UTC".to_string(),
                daylight_saving_time: 0,
            }],
            composite_events: vec![],
        };
        let value = serde_json::to_value(&bundle).unwrap();
        assert_eq!(value["task"]["taskSessionTimeout"], 1440);
        assert_eq!(value["schemaEvents"][0]["incrementOption"], 2);
        assert!(value["compositeEvents"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_rule_spec_skips_absent_task_kind() {
        let rule = CompositeRuleSpec {
            rule_state: 1,
            reload_task: Some(IdRef { id: Uuid::nil() }),
            external_program_task: None,
        };
        let value = serde_json::to_value(&rule).unwrap();
        assert!(value.get("externalProgramTask").is_none());
        assert_eq!(value["ruleState"], 1);
    }
}
