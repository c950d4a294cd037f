//! Ctrl-Q Repository Client
//!
//! Typed wrapper over the QSEoW Repository (QRS) REST endpoints the core
//! consumes: tasks, triggers, tags, custom properties, streams, and apps.

pub mod app;
pub mod client;
pub mod create;
pub mod error;
pub mod types;

pub use client::QrsClient;
pub use error::{QrsError, QrsResult};
