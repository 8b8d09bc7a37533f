//! Consent types for the side-effect approval gate.
//!
//! These live in `conductor-core` so the session crate (which stores consent
//! on the run state) and the orchestrator (which asks for it) share one
//! definition.

use serde::{Deserialize, Serialize};

/// The user's answer to the most recent approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Consent {
    /// No answer has been given since the last request.
    #[default]
    Unset,
    /// The user allowed the side effects.
    Granted,
    /// The user refused the side effects.
    Declined,
}

impl Consent {
    /// Maps a tri-state boolean (`None` = no answer) to consent.
    pub fn from_answer(answer: Option<bool>) -> Self {
        match answer {
            Some(true) => Consent::Granted,
            Some(false) => Consent::Declined,
            None => Consent::Unset,
        }
    }

    /// `true` only for an explicit grant.
    pub fn is_granted(self) -> bool {
        self == Consent::Granted
    }
}

/// A request shown to the user before side-effecting tools run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// The subtask the tools belong to.
    pub subtask: String,
    /// Tools that need permission, in call order, deduplicated.
    pub tools: Vec<String>,
}

impl ApprovalRequest {
    /// Builds a request, dropping repeated tool names.
    pub fn new(subtask: impl Into<String>, tools: impl IntoIterator<Item = String>) -> Self {
        let mut names: Vec<String> = Vec::new();
        for tool in tools {
            if !names.contains(&tool) {
                names.push(tool);
            }
        }
        Self {
            subtask: subtask.into(),
            tools: names,
        }
    }

    /// Text of the transcript message announcing the request.
    pub fn describe(&self) -> String {
        format!(
            "Requesting approval for side-effectful actions using tools: {}",
            self.tools.join(", ")
        )
    }

    /// Question the clarifier falls back to when it has none of its own.
    pub fn question(&self) -> String {
        format!(
            "To complete \"{}\" I need to run {}. Do you approve? (yes/no)",
            self.subtask,
            self.tools.join(", ")
        )
    }
}
