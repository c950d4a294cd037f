//! QRS wire types.
//!
//! Field names follow the Repository's camelCase JSON. Numeric wire enums
//! (increment option, daylight saving, rule state, execution status) are
//! mapped to and from the core model here so nothing else touches the raw
//! codes.

use chrono::{DateTime, Utc};
use ctrlq_core::{DaylightSaving, IncrementOption, RuleState};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A server-wide tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrsTag {
    pub id: Uuid,
    pub name: String,
}

/// A custom-property definition with its declared choice set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrsCustomPropertyDefinition {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub choice_values: Vec<String>,
}

/// A custom-property value attached to a task or app.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrsCustomPropertyValue {
    pub value: String,
    pub definition: QrsCustomPropertyRef,
}

/// Condensed reference to a custom-property definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrsCustomPropertyRef {
    pub id: Uuid,
    pub name: String,
}

/// A stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrsStream {
    pub id: Uuid,
    pub name: String,
}

/// Condensed app reference embedded in task objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrsAppCondensed {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub published: bool,
}

/// An app as returned by upload and lookup endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrsApp {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub stream: Option<QrsStream>,
    #[serde(default)]
    pub tags: Vec<QrsTag>,
    #[serde(default)]
    pub custom_properties: Vec<QrsCustomPropertyValue>,
}

/// Condensed task reference embedded in event objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrsTaskRef {
    pub id: Uuid,
    pub name: String,
}

/// Last/next execution details nested under `operational`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrsTaskOperational {
    #[serde(default)]
    pub last_execution_result: Option<QrsExecutionResult>,
    #[serde(default)]
    pub next_execution: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrsExecutionResult {
    pub status: i32,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stop_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration: Option<i64>,
}

/// A reload task as returned by `/qrs/reloadtask/full`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrsReloadTask {
    pub id: Uuid,
    pub name: String,
    pub enabled: bool,
    pub task_session_timeout: u32,
    pub max_retries: u32,
    pub app: QrsAppCondensed,
    #[serde(default)]
    pub is_partial_reload: bool,
    #[serde(default)]
    pub is_manually_triggered: bool,
    #[serde(default)]
    pub tags: Vec<QrsTag>,
    #[serde(default)]
    pub custom_properties: Vec<QrsCustomPropertyValue>,
    #[serde(default)]
    pub operational: Option<QrsTaskOperational>,
}

/// An external-program task as returned by `/qrs/externalprogramtask/full`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrsExternalProgramTask {
    pub id: Uuid,
    pub name: String,
    pub enabled: bool,
    pub task_session_timeout: u32,
    pub max_retries: u32,
    pub path: String,
    #[serde(default)]
    pub parameters: String,
    #[serde(default)]
    pub tags: Vec<QrsTag>,
    #[serde(default)]
    pub custom_properties: Vec<QrsCustomPropertyValue>,
    #[serde(default)]
    pub operational: Option<QrsTaskOperational>,
}

/// A schema (schedule) event as returned by `/qrs/schemaevent/full`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrsSchemaEvent {
    pub id: Uuid,
    pub name: String,
    pub enabled: bool,
    pub increment_option: i32,
    #[serde(default)]
    pub increment_description: String,
    #[serde(default)]
    pub schema_filter_description: Vec<String>,
    pub start_date: DateTime<Utc>,
    pub expiration_date: DateTime<Utc>,
    #[serde(default)]
    pub time_zone: String,
    pub daylight_saving_time: i32,
    #[serde(default)]
    pub reload_task: Option<QrsTaskRef>,
    #[serde(default)]
    pub external_program_task: Option<QrsTaskRef>,
}

impl QrsSchemaEvent {
    /// GUID of the owning task, whichever kind it is.
    pub fn owner_task_id(&self) -> Option<Uuid> {
        self.reload_task
            .as_ref()
            .or(self.external_program_task.as_ref())
            .map(|t| t.id)
    }
}

/// Sliding-window constraint of a composite event.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrsTimeConstraint {
    pub seconds: u32,
    pub minutes: u32,
    pub hours: u32,
    pub days: u32,
}

/// A composite rule edge as stored by the Repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrsCompositeRule {
    pub rule_state: i32,
    #[serde(default)]
    pub reload_task: Option<QrsTaskRef>,
    #[serde(default)]
    pub external_program_task: Option<QrsTaskRef>,
}

impl QrsCompositeRule {
    /// GUID of the upstream task the rule points at.
    pub fn upstream_task_id(&self) -> Option<Uuid> {
        self.reload_task
            .as_ref()
            .or(self.external_program_task.as_ref())
            .map(|t| t.id)
    }
}

/// A composite event as returned by `/qrs/compositeevent/full`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrsCompositeEvent {
    pub id: Uuid,
    pub name: String,
    pub enabled: bool,
    #[serde(default)]
    pub time_constraint: QrsTimeConstraint,
    #[serde(default)]
    pub composite_rules: Vec<QrsCompositeRule>,
    #[serde(default)]
    pub reload_task: Option<QrsTaskRef>,
    #[serde(default)]
    pub external_program_task: Option<QrsTaskRef>,
}

impl QrsCompositeEvent {
    /// GUID of the downstream task owning this event.
    pub fn owner_task_id(&self) -> Option<Uuid> {
        self.reload_task
            .as_ref()
            .or(self.external_program_task.as_ref())
            .map(|t| t.id)
    }
}

// Wire-code mappings. The Repository stores these enums as small integers.

pub fn increment_option_to_wire(option: IncrementOption) -> i32 {
    match option {
        IncrementOption::Once => 0,
        IncrementOption::Hourly => 1,
        IncrementOption::Daily => 2,
        IncrementOption::Weekly => 3,
        IncrementOption::Monthly => 4,
        IncrementOption::Custom => 5,
    }
}

pub fn increment_option_from_wire(code: i32) -> Option<IncrementOption> {
    match code {
        0 => Some(IncrementOption::Once),
        1 => Some(IncrementOption::Hourly),
        2 => Some(IncrementOption::Daily),
        3 => Some(IncrementOption::Weekly),
        4 => Some(IncrementOption::Monthly),
        5 => Some(IncrementOption::Custom),
        _ => None,
    }
}

pub fn daylight_saving_to_wire(mode: DaylightSaving) -> i32 {
    match mode {
        DaylightSaving::ObserveDaylightSavingTime => 0,
        DaylightSaving::PermanentStandardTime => 1,
        DaylightSaving::PermanentDaylightSavingTime => 2,
    }
}

pub fn daylight_saving_from_wire(code: i32) -> Option<DaylightSaving> {
    match code {
        0 => Some(DaylightSaving::ObserveDaylightSavingTime),
        1 => Some(DaylightSaving::PermanentStandardTime),
        2 => Some(DaylightSaving::PermanentDaylightSavingTime),
        _ => None,
    }
}

pub fn rule_state_to_wire(state: RuleState) -> i32 {
    match state {
        RuleState::TaskSuccessful => 1,
        RuleState::TaskFail => 2,
    }
}

pub fn rule_state_from_wire(code: i32) -> Option<RuleState> {
    match code {
        1 => Some(RuleState::TaskSuccessful),
        2 => Some(RuleState::TaskFail),
        _ => None,
    }
}

/// Human-readable name of a task execution status code.
pub fn execution_status_name(code: i32) -> &'static str {
    match code {
        0 => "NeverStarted",
        1 => "Triggered",
        2 => "Started",
        3 => "Queued",
        4 => "AbortInitiated",
        5 => "Aborting",
        6 => "Aborted",
        7 => "FinishedSuccess",
        8 => "FinishedFail",
        9 => "Skipped",
        10 => "Retry",
        11 => "Error",
        12 => "Reset",
        _ => "Unknown",
    }
}
