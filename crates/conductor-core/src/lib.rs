//! Core types and error definitions for the Conductor engine.
//!
//! This crate provides the foundational types shared across all Conductor
//! crates: the error taxonomy, transcript messages, tool call abstractions
//! and the consent types used by the approval gate.
//!
//! # Main types
//!
//! - [`ConductorError`]: Unified error enum for all Conductor subsystems.
//! - [`ConductorResult`]: Convenience alias for `Result<T, ConductorError>`.
//! - [`Message`]: A single entry of a run transcript.
//! - [`ToolCall`] / [`ToolResult`]: Tool invocation request and its outcome.
//! - [`Consent`]: The user's answer to a side-effect approval request.

/// Consent and approval request types for the side-effect gate.
pub mod approval;
/// Error taxonomy.
pub mod error;
/// Transcript messages.
pub mod message;
/// Tool call and tool result types.
pub mod tool;

pub use approval::{ApprovalRequest, Consent};
pub use error::{ConductorError, ConductorResult};
pub use message::{Message, MessageKind, Role, WorkScope};
pub use tool::{ToolCall, ToolResult};
