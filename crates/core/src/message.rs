//! Message domain types.
//!
//! These are the value objects that flow through a run:
//! the invoice arrives as a human message → the agent answers (possibly with
//! proposed actions) → each action is answered by a tool-result message.

use crate::action::ProposedAction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageRole {
    /// External input (the invoice)
    #[serde(rename = "human")]
    Human,
    /// The agent's proposal
    #[serde(rename = "agent")]
    Agent,
    /// Result, block notice, or rejection answering one proposed action
    #[serde(rename = "tool-result")]
    ToolResult,
    /// Preamble and operator notices
    #[serde(rename = "system")]
    System,
}

/// A single message in a thread. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,

    pub role: MessageRole,

    pub content: String,

    /// Actions proposed by the agent (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ProposedAction>,

    /// If this is a tool result, which proposed action it answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn build(role: MessageRole, content: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            actions: Vec::new(),
            correlation_id: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a new human message.
    pub fn human(content: impl Into<String>) -> Self {
        Self::build(MessageRole::Human, content.into())
    }

    /// Create a new agent message without proposals.
    pub fn agent(content: impl Into<String>) -> Self {
        Self::build(MessageRole::Agent, content.into())
    }

    /// Create an agent message carrying proposed actions.
    pub fn agent_with_actions(content: impl Into<String>, actions: Vec<ProposedAction>) -> Self {
        let mut msg = Self::build(MessageRole::Agent, content.into());
        msg.actions = actions;
        msg
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::build(MessageRole::System, content.into())
    }

    /// Create a tool result message answering one proposed action.
    pub fn tool_result(correlation_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::build(MessageRole::ToolResult, content.into());
        msg.correlation_id = Some(correlation_id.into());
        msg
    }

    pub fn has_actions(&self) -> bool {
        !self.actions.is_empty()
    }
}
