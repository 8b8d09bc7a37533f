use async_trait::async_trait;
use conductor_core::ConductorResult;
use conductor_session::{RunPhase, RunState, StateDelta, WorkerKind};
use serde::{Deserialize, Serialize};

/// Name of every node a run can visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeName {
    /// Decides whether the user must answer before work continues.
    Clarifier,
    /// Turns the conversation into subtasks and success criteria.
    Planner,
    /// Gathers information with read-only tools.
    Researcher,
    /// Performs actions, behind the approval gate.
    Executor,
    /// Condenses earlier results.
    Summarizer,
    /// Judges safety, quality and the need to replan.
    Evaluator,
    /// Writes the single user-facing answer.
    Finalizer,
}

impl NodeName {
    /// Every node, in the order a typical run first reaches them.
    pub const ALL: [NodeName; 7] = [
        NodeName::Clarifier,
        NodeName::Planner,
        NodeName::Researcher,
        NodeName::Executor,
        NodeName::Summarizer,
        NodeName::Evaluator,
        NodeName::Finalizer,
    ];

    /// Lowercase name, as used in config and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            NodeName::Clarifier => "clarifier",
            NodeName::Planner => "planner",
            NodeName::Researcher => "researcher",
            NodeName::Executor => "executor",
            NodeName::Summarizer => "summarizer",
            NodeName::Evaluator => "evaluator",
            NodeName::Finalizer => "finalizer",
        }
    }

    /// Phase recorded while this node runs.
    pub fn phase(self) -> RunPhase {
        match self {
            NodeName::Clarifier => RunPhase::Clarifying,
            NodeName::Planner => RunPhase::Planning,
            NodeName::Researcher => RunPhase::Researching,
            NodeName::Executor => RunPhase::Executing,
            NodeName::Summarizer => RunPhase::Summarizing,
            NodeName::Evaluator => RunPhase::Evaluating,
            NodeName::Finalizer => RunPhase::Finalizing,
        }
    }

    /// The worker kind, for nodes that own subtasks.
    pub fn worker(self) -> Option<WorkerKind> {
        match self {
            NodeName::Researcher => Some(WorkerKind::Researcher),
            NodeName::Executor => Some(WorkerKind::Executor),
            NodeName::Summarizer => Some(WorkerKind::Summarizer),
            _ => None,
        }
    }
}

impl From<WorkerKind> for NodeName {
    fn from(kind: WorkerKind) -> Self {
        match kind {
            WorkerKind::Researcher => NodeName::Researcher,
            WorkerKind::Executor => NodeName::Executor,
            WorkerKind::Summarizer => NodeName::Summarizer,
        }
    }
}

impl std::fmt::Display for NodeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work in a run.
///
/// A node reads the snapshot it is given and describes its changes as a
/// [`StateDelta`]. It never sees other nodes and never picks the next one.
#[async_trait]
pub trait Node: Send + Sync {
    /// Registry key of the node.
    fn name(&self) -> NodeName;

    /// Reads `state` and returns the update to merge.
    async fn run(&self, state: &RunState) -> ConductorResult<StateDelta>;
}
