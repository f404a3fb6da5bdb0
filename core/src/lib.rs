//! Core library for Quill, the editor extension that rewrites or extends a
//! text selection with a remote LLM.
//!
//! Module boundaries:
//! - [`agents`] holds provider kinds, settings, the HTTP transport and the
//!   three provider adapters.
//! - [`registry`] knows which models exist and which provider serves each.
//! - [`dispatcher`] turns a prompt and model id into a generation outcome.
//! - [`api`] exposes the commands the editor host invokes.
//! - [`db`] initialises the SQLite database and applies migrations.
//! - [`errors`] keeps the error catalogue with stable codes.
//! - [`logging`] writes structured events to the event log table.
//! - [`templates`] loads prompt templates from a folder.

pub mod agents;
pub mod api;
pub mod db;
pub mod dispatcher;
pub mod errors;
pub mod logging;
pub mod registry;
pub mod templates;

pub use agents::{GenerationOutcome, GenerationRequest};
pub use dispatcher::GenerationDispatcher;
pub use errors::{FailureKind, GenerationFailure, QuillError};
pub use registry::ModelRegistry;
