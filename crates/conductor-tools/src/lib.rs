//! Tool abstractions for Conductor workers.
//!
//! # Main types
//!
//! - [`Tool`]: Trait implemented by every tool.
//! - [`ToolDescriptor`]: Name, description and JSON schema shown to providers.
//! - [`ToolRegistry`]: Central registry of available tools.
//! - [`ToolExecutor`]: Runs a batch of calls concurrently with a per-call timeout.

/// Concurrent tool execution.
pub mod executor;
/// Tool registry.
pub mod registry;
/// Tool trait and descriptor.
pub mod tool;

pub use executor::ToolExecutor;
pub use registry::ToolRegistry;
pub use tool::{Tool, ToolDescriptor};
