//! Multi-agent run orchestration.
//!
//! A run moves through a fixed set of nodes (clarifier, planner, workers,
//! evaluator, finalizer). Nodes read a snapshot and return a delta; the
//! engine merges deltas through the versioned state store, asks the router
//! for the next node and pauses whenever the user has to answer.
//!
//! # Main types
//!
//! - [`Gateway`]: Caller-facing API to create, resume, inspect and cancel runs.
//! - [`Orchestrator`]: The superstep loop.
//! - [`NodeRegistry`]: One node per [`NodeName`], checked once at build time.
//! - [`route`]: Static routing table.
//! - [`EngineConfig`]: Timeouts and budgets.

/// Engine configuration.
pub mod config;
/// Superstep loop.
pub mod engine;
/// Caller-facing run API.
pub mod gateway;
/// Node trait and node names.
pub mod node;
/// Node implementations.
pub mod nodes;
/// System prompts and prompt formatting.
pub mod prompts;
/// Node registry and per-node providers.
pub mod registry;
/// Routing table.
pub mod router;

pub use config::EngineConfig;
pub use engine::Orchestrator;
pub use gateway::Gateway;
pub use node::{Node, NodeName};
pub use registry::{NodeProviders, NodeRegistry};
pub use router::{route, Route};
