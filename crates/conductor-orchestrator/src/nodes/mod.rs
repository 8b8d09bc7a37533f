//! The seven nodes of a run.

/// Clarifier node.
pub mod clarifier;
/// Evaluator node.
pub mod evaluator;
/// Finalizer node.
pub mod finalizer;
/// Planner node.
pub mod planner;
/// Summarizer node.
pub mod summarizer;
/// Researcher and executor nodes.
pub mod worker;

pub use clarifier::ClarifierNode;
pub use evaluator::EvaluatorNode;
pub use finalizer::FinalizerNode;
pub use planner::PlannerNode;
pub use summarizer::SummarizerNode;
pub use worker::WorkerNode;

use crate::node::NodeName;
use conductor_core::{Message, MessageKind};

/// An assistant message authored by `node`.
pub(crate) fn say(node: NodeName, kind: MessageKind, content: impl Into<String>) -> Message {
    Message::assistant(content)
        .with_name(node.as_str())
        .with_kind(kind)
}
