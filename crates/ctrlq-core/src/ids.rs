//! Object references: server GUIDs and per-run local counters.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ModelError;

/// Reference to a Sense object: a server-assigned GUID, or a local counter
/// valid only within a single import run.
///
/// Local counters are resolved to GUIDs by the importer and never leave the
/// process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ObjectRef {
    Guid(Uuid),
    Local(u32),
}

impl ObjectRef {
    /// Return the GUID if this reference is already server-assigned.
    pub fn as_guid(&self) -> Option<Uuid> {
        match self {
            Self::Guid(id) => Some(*id),
            Self::Local(_) => None,
        }
    }

    /// Return the local counter if this reference is run-local.
    pub fn as_local(&self) -> Option<u32> {
        match self {
            Self::Guid(_) => None,
            Self::Local(n) => Some(*n),
        }
    }
}

impl FromStr for ObjectRef {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(id) = Uuid::parse_str(s) {
            return Ok(Self::Guid(id));
        }
        match s.parse::<u32>() {
            Ok(n) if n >= 1 => Ok(Self::Local(n)),
            _ => Err(ModelError::InvalidRef(s.to_string())),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Guid(id) => write!(f, "{}", id),
            Self::Local(n) => write!(f, "{}", n),
        }
    }
}

/// Reference to a Sense app: an existing GUID, or `newapp-<n>` pointing at
/// the app uploaded with `App counter = n` earlier in the same run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AppRef {
    Guid(Uuid),
    New(u32),
}

impl FromStr for AppRef {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(id) = Uuid::parse_str(s) {
            return Ok(Self::Guid(id));
        }
        if let Some(counter) = s.strip_prefix("newapp-") {
            match counter.parse::<u32>() {
                Ok(n) if n >= 1 => return Ok(Self::New(n)),
                _ => {}
            }
        }
        Err(ModelError::InvalidAppRef(s.to_string()))
    }
}

impl fmt::Display for AppRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Guid(id) => write!(f, "{}", id),
            Self::New(n) => write!(f, "newapp-{}", n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_ref_guid() {
        let id = "f2a193f5-fd34-4b62-9b4e-8c7a0b5e18c2";
        let r: ObjectRef = id.parse().unwrap();
        assert_eq!(r.as_guid(), Some(Uuid::parse_str(id).unwrap()));
        assert_eq!(r.as_local(), None);
    }

    #[test]
    fn test_object_ref_local_counter() {
        let r: ObjectRef = "3".parse().unwrap();
        assert_eq!(r.as_local(), Some(3));
    }

    #[test]
    fn test_object_ref_rejects_zero_and_garbage() {
        assert!("0".parse::<ObjectRef>().is_err());
        assert!("task-one".parse::<ObjectRef>().is_err());
        assert!("".parse::<ObjectRef>().is_err());
    }

    #[test]
    fn test_app_ref_newapp() {
        let r: AppRef = "newapp-2".parse().unwrap();
        assert_eq!(r, AppRef::New(2));
        assert_eq!(r.to_string(), "newapp-2");
    }

    #[test]
    fn test_app_ref_rejects_bad_counter() {
        assert!("newapp-0".parse::<AppRef>().is_err());
        assert!("newapp-".parse::<AppRef>().is_err());
        assert!("oldapp-1".parse::<AppRef>().is_err());
    }
}
