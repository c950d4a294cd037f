//! Schedule and composite trigger models.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;
use crate::ids::ObjectRef;

/// Timestamp the Repository uses for "never happened".
pub fn never_timestamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(1753, 1, 1, 0, 0, 0).unwrap()
}

/// Timestamp the Repository uses for "no expiration".
pub fn no_expiration_timestamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(9999, 1, 1, 0, 0, 0).unwrap()
}

/// Repetition mode of a schedule trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncrementOption {
    Once,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Custom,
}

impl IncrementOption {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Once => "once",
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Custom => "custom",
        }
    }
}

impl FromStr for IncrementOption {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "once" => Ok(Self::Once),
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "custom" => Ok(Self::Custom),
            other => Err(ModelError::InvalidEnum {
                what: "schema increment option",
                value: other.to_string(),
            }),
        }
    }
}

/// Daylight-saving handling of a schedule trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DaylightSaving {
    ObserveDaylightSavingTime,
    PermanentStandardTime,
    PermanentDaylightSavingTime,
}

impl DaylightSaving {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ObserveDaylightSavingTime => "ObserveDaylightSavingTime",
            Self::PermanentStandardTime => "PermanentStandardTime",
            Self::PermanentDaylightSavingTime => "PermanentDaylightSavingTime",
        }
    }
}

impl FromStr for DaylightSaving {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ObserveDaylightSavingTime" => Ok(Self::ObserveDaylightSavingTime),
            "PermanentStandardTime" => Ok(Self::PermanentStandardTime),
            "PermanentDaylightSavingTime" => Ok(Self::PermanentDaylightSavingTime),
            other => Err(ModelError::InvalidEnum {
                what: "daylight savings time",
                value: other.to_string(),
            }),
        }
    }
}

/// The four-integer repetition step of a schedule trigger:
/// minutes, hours, days, weeks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementDescription {
    pub minutes: u32,
    pub hours: u32,
    pub days: u32,
    pub weeks: u32,
}

impl FromStr for IncrementDescription {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        if parts.len() != 4 {
            return Err(ModelError::InvalidIncrement(s.to_string()));
        }
        let mut values = [0u32; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part
                .parse()
                .map_err(|_| ModelError::InvalidIncrement(s.to_string()))?;
        }
        Ok(Self {
            minutes: values[0],
            hours: values[1],
            days: values[2],
            weeks: values[3],
        })
    }
}

impl fmt::Display for IncrementDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.minutes, self.hours, self.days, self.weeks
        )
    }
}

/// A time-based fire rule attached to exactly one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaEvent {
    pub name: String,
    pub enabled: bool,
    pub increment_option: IncrementOption,
    pub increment_description: IncrementDescription,
    pub daylight_saving: DaylightSaving,
    pub start: DateTime<Utc>,
    pub expiration: DateTime<Utc>,
    /// Seven-field scheduling window spec, passed through verbatim.
    pub filter_description: String,
    /// IANA time zone name.
    pub time_zone: String,
}

impl SchemaEvent {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.expiration < self.start {
            return Err(ModelError::ExpirationBeforeStart {
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    /// True when the trigger carries the "no expiration" sentinel.
    pub fn never_expires(&self) -> bool {
        self.expiration == no_expiration_timestamp()
    }
}

/// Sliding window within which all rule dependencies must have fired.
///
/// All-zero fields are passed to the Repository verbatim; the server decides
/// what the degenerate window means.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeConstraint {
    pub seconds: u32,
    pub minutes: u32,
    pub hours: u32,
    pub days: u32,
}

/// Required terminal state of an upstream task for a composite rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleState {
    TaskSuccessful,
    TaskFail,
}

impl RuleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskSuccessful => "TaskSuccessful",
            Self::TaskFail => "TaskFail",
        }
    }
}

impl FromStr for RuleState {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "TaskSuccessful" => Ok(Self::TaskSuccessful),
            "TaskFail" => Ok(Self::TaskFail),
            other => Err(ModelError::InvalidEnum {
                what: "rule state",
                value: other.to_string(),
            }),
        }
    }
}

/// An edge from an upstream task to a composite event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeRule {
    pub upstream: ObjectRef,
    pub state: RuleState,
}

/// A dependency-based fire rule attached to exactly one downstream task.
/// The rule list is a conjunction and must be non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeEvent {
    pub name: String,
    pub enabled: bool,
    pub time_constraint: TimeConstraint,
    pub rules: Vec<CompositeRule>,
}

impl CompositeEvent {
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.rules.is_empty() {
            return Err(ModelError::EmptyRuleList {
                name: self.name.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_description_round_trip() {
        let inc: IncrementDescription = "0 0 1 0".parse().unwrap();
        assert_eq!(inc.days, 1);
        assert_eq!(inc.to_string(), "0 0 1 0");
        assert!("0 0 1".parse::<IncrementDescription>().is_err());
        assert!("a b c d".parse::<IncrementDescription>().is_err());
    }

    #[test]
    fn test_expiration_before_start_rejected() {
        let event = SchemaEvent {
            name: "daily".to_string(),
            enabled: true,
            increment_option: IncrementOption::Daily,
            increment_description: "0 0 1 0".parse().unwrap(),
            daylight_saving: DaylightSaving::ObserveDaylightSavingTime,
            start: Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap(),
            expiration: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            filter_description: "* * - * * * * *".to_string(),
            time_zone: "Europe/Stockholm".to_string(),
        };
        assert!(event.validate().is_err());
    }

    #[test]
    fn test_no_expiration_sentinel() {
        let event = SchemaEvent {
            name: "daily".to_string(),
            enabled: true,
            increment_option: IncrementOption::Daily,
            increment_description: IncrementDescription::default(),
            daylight_saving: DaylightSaving::ObserveDaylightSavingTime,
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            expiration: no_expiration_timestamp(),
            filter_description: String::new(),
            time_zone: "UTC".to_string(),
        };
        assert!(event.never_expires());
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_rule_state_parse() {
        assert_eq!(
            "TaskSuccessful".parse::<RuleState>().unwrap(),
            RuleState::TaskSuccessful
        );
        assert_eq!("TaskFail".parse::<RuleState>().unwrap(), RuleState::TaskFail);
        assert!("TaskSkipped".parse::<RuleState>().is_err());
    }
}
