//! Security primitives for the Conductor engine.
//!
//! Provides the static tool safety classification that drives the
//! side-effect approval gate, and the append-only audit trail.
//!
//! # Main types
//!
//! - [`ToolSafety`]: Safety class of a tool.
//! - [`SafetyClassifier`]: Static tool name → class map, failing closed.
//! - [`AuditLog`]: Append-only audit trail persisted to disk.

/// Audit logging module.
pub mod audit;
/// Tool safety classes and the classifier.
pub mod safety;

pub use audit::{AuditEntry, AuditLog, AuditOutcome};
pub use safety::{SafetyClassifier, ToolSafety};
