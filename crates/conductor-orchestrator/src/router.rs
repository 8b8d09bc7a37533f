use crate::node::NodeName;
use conductor_core::Consent;
use conductor_session::{RunState, WorkerKind};

/// Where a run goes after a node has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Run this node next.
    Node(NodeName),
    /// Pause until the user answers.
    Wait,
    /// The run is finished.
    End,
}

/// Picks the next step from the node that just ran and the merged state.
///
/// Precedence is the same after every node: finished, aborted, waiting on
/// the user, refused side effects, planning, evaluating, then the owner of
/// the subtask at the cursor. Approval blocking outranks remaining work.
pub fn route(from: NodeName, state: &RunState) -> Route {
    if from == NodeName::Finalizer {
        return Route::End;
    }
    if state.aborted.is_some() {
        return Route::Node(NodeName::Finalizer);
    }
    if state.user_input_needed {
        return if from == NodeName::Clarifier {
            Route::Wait
        } else {
            Route::Node(NodeName::Clarifier)
        };
    }
    if state.side_effects_requested && state.user_side_effects_confirmed == Consent::Declined {
        return Route::Node(NodeName::Finalizer);
    }
    if state.subtasks.is_empty() {
        return Route::Node(NodeName::Planner);
    }

    if from == NodeName::Evaluator {
        return match state.current_subtask() {
            // The evaluator does not judge itself twice; a block goes to the user.
            Some(s) if s.owner == WorkerKind::Executor && state.approval_blocked() => {
                Route::Node(NodeName::Clarifier)
            }
            Some(s) => Route::Node(s.owner.into()),
            None if !state.success_criteria_met && state.replan_needed => {
                Route::Node(NodeName::Planner)
            }
            None => Route::Node(NodeName::Finalizer),
        };
    }

    match state.current_subtask() {
        None => Route::Node(NodeName::Evaluator),
        Some(s) if s.owner == WorkerKind::Executor && state.approval_blocked() => {
            Route::Node(NodeName::Evaluator)
        }
        Some(s) => Route::Node(s.owner.into()),
    }
}
