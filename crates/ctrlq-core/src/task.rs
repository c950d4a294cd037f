//! Task domain models.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::ModelError;
use crate::event::{CompositeEvent, SchemaEvent};
use crate::ids::{AppRef, ObjectRef};

/// Kind of a QSEoW task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    Reload,
    ExternalProgram,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reload => "Reload",
            Self::ExternalProgram => "External program",
        }
    }
}

impl FromStr for TaskKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Reload" => Ok(Self::Reload),
            "External program" => Ok(Self::ExternalProgram),
            other => Err(ModelError::InvalidEnum {
                what: "task type",
                value: other.to_string(),
            }),
        }
    }
}

/// Kind-specific task payload. The kind of a task is fully determined by
/// which variant it carries; fields of the other kind are a validation error
/// at parse time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskPayload {
    Reload {
        app: AppRef,
        partial_reload: bool,
        manually_triggered: bool,
    },
    ExternalProgram {
        path: String,
        parameters: String,
    },
}

/// Name/value pair for a custom property attached to a task or app.
///
/// The value must be one of the property's declared choices; that check is
/// done by the resolver against the server population.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomPropertyValue {
    pub name: String,
    pub value: String,
}

/// A unit of work scheduled by QSEoW.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: ObjectRef,
    pub name: String,
    pub enabled: bool,
    pub session_timeout_minutes: u32,
    pub max_retries: u32,
    pub payload: TaskPayload,
    pub tags: Vec<String>,
    pub custom_properties: Vec<CustomPropertyValue>,
    pub schema_events: Vec<SchemaEvent>,
    pub composite_events: Vec<CompositeEvent>,
}

impl Task {
    pub fn kind(&self) -> TaskKind {
        match self.payload {
            TaskPayload::Reload { .. } => TaskKind::Reload,
            TaskPayload::ExternalProgram { .. } => TaskKind::ExternalProgram,
        }
    }

    /// App referenced by a reload task, if any.
    pub fn app_ref(&self) -> Option<AppRef> {
        match &self.payload {
            TaskPayload::Reload { app, .. } => Some(*app),
            TaskPayload::ExternalProgram { .. } => None,
        }
    }

    /// Validate cross-field invariants that the constructors cannot enforce.
    pub fn validate(&self) -> Result<(), ModelError> {
        for event in &self.schema_events {
            event.validate()?;
        }
        for event in &self.composite_events {
            event.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CompositeRule, RuleState, TimeConstraint};
    use uuid::Uuid;

    fn reload_task(name: &str) -> Task {
        Task {
            id: ObjectRef::Local(1),
            name: name.to_string(),
            enabled: true,
            session_timeout_minutes: 1440,
            max_retries: 0,
            payload: TaskPayload::Reload {
                app: AppRef::Guid(Uuid::nil()),
                partial_reload: false,
                manually_triggered: false,
            },
            tags: vec![],
            custom_properties: vec![],
            schema_events: vec![],
            composite_events: vec![],
        }
    }

    #[test]
    fn test_task_kind_round_trip() {
        assert_eq!("Reload".parse::<TaskKind>().unwrap(), TaskKind::Reload);
        assert_eq!(
            "External program".parse::<TaskKind>().unwrap(),
            TaskKind::ExternalProgram
        );
        assert_eq!(TaskKind::ExternalProgram.as_str(), "External program");
        assert!("Distribute".parse::<TaskKind>().is_err());
    }

    #[test]
    fn test_kind_follows_payload() {
        let task = reload_task("T1");
        assert_eq!(task.kind(), TaskKind::Reload);
        assert!(task.app_ref().is_some());
    }

    #[test]
    fn test_validate_rejects_empty_rule_list() {
        let mut task = reload_task("T1");
        task.composite_events.push(CompositeEvent {
            name: "after upstream".to_string(),
            enabled: true,
            time_constraint: TimeConstraint::default(),
            rules: vec![],
        });
        assert!(task.validate().is_err());

        task.composite_events[0].rules.push(CompositeRule {
            upstream: ObjectRef::Local(2),
            state: RuleState::TaskSuccessful,
        });
        assert!(task.validate().is_ok());
    }
}
