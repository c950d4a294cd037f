//! Ctrl-Q Core Library
//!
//! Data model shared by the repository client, the task graph, and the
//! import/export engine.

pub mod error;
pub mod event;
pub mod filter;
pub mod ids;
pub mod task;

pub use error::{ModelError, ModelResult};
pub use event::{
    never_timestamp, no_expiration_timestamp, CompositeEvent, CompositeRule, DaylightSaving,
    IncrementDescription, IncrementOption, RuleState, SchemaEvent, TimeConstraint,
};
pub use filter::TaskFilter;
pub use ids::{AppRef, ObjectRef};
pub use task::{CustomPropertyValue, Task, TaskKind, TaskPayload};
