use crate::tool::{ToolCall, ToolResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of the participant that authored a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A human end-user.
    User,
    /// A node speaking on behalf of the engine.
    Assistant,
    /// A provider instruction. Never stored in a run transcript.
    System,
    /// Output produced by a tool invocation.
    Tool,
}

/// What a transcript entry means to the engine.
///
/// Nodes look messages up by kind instead of parsing content, e.g. the
/// clarifier only reads consent from user messages that follow the most
/// recent [`MessageKind::ApprovalRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Ordinary conversation.
    #[default]
    Chat,
    /// A clarifying question to the user.
    Question,
    /// A request for permission to run side-effecting tools.
    ApprovalRequest,
    /// Evaluator feedback.
    Feedback,
    /// The output of a tool call.
    ToolResult,
    /// The single user-facing answer of a finished run.
    FinalAnswer,
    /// A recorded node or tool failure.
    Failure,
}

/// Which subtask of which plan produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkScope {
    /// Planning counter at the time the message was produced.
    pub plan_revision: u32,
    /// Index of the subtask being worked on.
    pub subtask_index: usize,
}

/// A single entry of a run transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for this message.
    pub id: Uuid,
    /// The role of the message author.
    pub role: Role,
    /// The textual content of the message.
    pub content: String,
    /// Engine-level meaning of the message.
    #[serde(default)]
    pub kind: MessageKind,
    /// Node name for assistant messages, tool name for tool messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool calls requested alongside this assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Call this tool message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Subtask the message belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<WorkScope>,
    /// UTC timestamp of when the message was created.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Creates a new chat message with the given role and content.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            kind: MessageKind::Chat,
            name: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            scope: None,
            timestamp: Utc::now(),
        }
    }

    /// Creates a new message with [`Role::User`].
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates a new message with [`Role::Assistant`].
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Creates a new message with [`Role::System`].
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Creates a tool message from a result.
    pub fn tool_result(tool_name: impl Into<String>, result: &ToolResult) -> Self {
        let mut msg = Self::new(Role::Tool, result.content.clone());
        msg.kind = if result.is_error {
            MessageKind::Failure
        } else {
            MessageKind::ToolResult
        };
        msg.name = Some(tool_name.into());
        msg.tool_call_id = Some(result.call_id.clone());
        msg
    }

    /// Sets the message kind.
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Sets the author name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attaches tool call references.
    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.tool_calls = calls;
        self
    }

    /// Scopes the message to a subtask.
    pub fn with_scope(mut self, scope: WorkScope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Whether the message was authored by the user.
    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}
