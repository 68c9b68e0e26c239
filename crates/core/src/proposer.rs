//! Proposer trait: the abstraction over the agent-proposal function.
//!
//! A Proposer takes the message history (with the system preamble already
//! prefixed) and returns the agent's next message, which may carry proposed
//! actions. The pipeline treats it as opaque and untrusted.

use crate::action::ActionDefinition;
use crate::error::AgentError;
use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Input to one agent turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalRequest {
    /// The history the agent may see, preamble first
    pub messages: Vec<Message>,

    /// Actions the agent may propose
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<ActionDefinition>,
}

/// The agent-proposal function.
///
/// Implementations may fail transiently, or return
/// [`AgentError::RecursionLimit`] to signal that they looped; the turn engine
/// turns the latter into a loop outcome rather than a failure.
#[async_trait]
pub trait Proposer: Send + Sync {
    /// A human-readable name for this proposer (e.g., "groq").
    fn name(&self) -> &str;

    /// Produce the agent's next message.
    async fn propose(&self, request: ProposalRequest) -> std::result::Result<Message, AgentError>;
}
