use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Safety class of a tool. The class is the only input to the approval gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSafety {
    /// Observes the world without changing it.
    ReadOnly,
    /// Computes in an isolated environment; only gated when the subtask
    /// itself is marked as side-effecting.
    SandboxedCompute,
    /// Changes state outside the engine and cannot be undone.
    Irreversible,
}

impl fmt::Display for ToolSafety {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ToolSafety::ReadOnly => "read_only",
            ToolSafety::SandboxedCompute => "sandboxed_compute",
            ToolSafety::Irreversible => "irreversible",
        };
        f.write_str(s)
    }
}

/// Classes of the builtin tools.
const DEFAULT_CLASSES: &[(&str, ToolSafety)] = &[
    ("read_file", ToolSafety::ReadOnly),
    ("list_directory", ToolSafety::ReadOnly),
    ("file_search", ToolSafety::ReadOnly),
    ("http_fetch", ToolSafety::ReadOnly),
    ("web_search", ToolSafety::ReadOnly),
    ("shell", ToolSafety::SandboxedCompute),
    ("write_file", ToolSafety::Irreversible),
    ("file_delete", ToolSafety::Irreversible),
    ("move_file", ToolSafety::Irreversible),
    ("copy_file", ToolSafety::Irreversible),
    ("send_message", ToolSafety::Irreversible),
];

/// Static tool name → safety class map.
///
/// Built once from data and never mutated while a run is in flight. Tools
/// missing from the map classify as [`ToolSafety::Irreversible`].
#[derive(Debug, Clone, Default)]
pub struct SafetyClassifier {
    classes: HashMap<String, ToolSafety>,
}

impl SafetyClassifier {
    /// An empty classifier: every tool is irreversible.
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifier preloaded with the builtin tool classes.
    pub fn with_defaults() -> Self {
        Self::from_entries(
            DEFAULT_CLASSES
                .iter()
                .map(|(name, class)| ((*name).to_string(), *class)),
        )
    }

    /// Builds a classifier from explicit entries.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, ToolSafety)>) -> Self {
        Self {
            classes: entries.into_iter().collect(),
        }
    }

    /// Adds or replaces entries, e.g. from configuration overrides.
    pub fn extend(&mut self, overrides: impl IntoIterator<Item = (String, ToolSafety)>) {
        self.classes.extend(overrides);
    }

    /// Safety class of `tool`.
    pub fn classify(&self, tool: &str) -> ToolSafety {
        self.classes
            .get(tool)
            .copied()
            .unwrap_or(ToolSafety::Irreversible)
    }

    /// Whether running `tool` for a subtask needs prior user approval.
    pub fn requires_approval(&self, tool: &str, subtask_requires_side_effects: bool) -> bool {
        let gated = match self.classify(tool) {
            ToolSafety::Irreversible => true,
            ToolSafety::SandboxedCompute => subtask_requires_side_effects,
            ToolSafety::ReadOnly => false,
        };
        debug!(tool, gated, "Classified tool call");
        gated
    }

    /// Whether the tool is known to the classifier.
    pub fn is_known(&self, tool: &str) -> bool {
        self.classes.contains_key(tool)
    }
}
