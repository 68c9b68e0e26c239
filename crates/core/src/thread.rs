//! Thread: one governed run of the agent.
//!
//! A thread owns the append-only message history of a run, its status, and
//! (while suspended) the action awaiting an external decision. Status changes
//! go through the turn engine's transition function; this module only holds
//! the data.

use crate::action::ProposedAction;
use crate::context::ExecutionContext;
use crate::message::{Message, MessageRole};
use crate::variant::Variant;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ThreadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    Running,
    SuspendedForApproval,
    Completed,
    Failed,
}

impl ThreadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadStatus::Running => "running",
            ThreadStatus::SuspendedForApproval => "suspended_for_approval",
            ThreadStatus::Completed => "completed",
            ThreadStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ThreadStatus::Completed | ThreadStatus::Failed)
    }
}

impl fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a thread stopped where it did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The agent stopped proposing actions.
    Answered,
    /// A gate blocked the turn's actions.
    Blocked { gate: String },
    /// Waiting on an external approval decision.
    AwaitingApproval,
    /// The agent kept proposing until the turn bound was hit: the injected
    /// instructions drove it into a loop.
    LoopBoundExceeded { turns: u32 },
    /// An operator rejected the suspended action.
    Rejected,
    /// The judgment function failed; the turn failed closed.
    JudgmentUnavailable { cause: String },
    /// The agent-proposal function failed.
    AgentFailed { cause: String },
}

/// The action a thread is paused on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuspendedAction {
    /// The action whose policy predicate triggered the suspension
    pub action: ProposedAction,
    /// Every action of the suspended turn, in proposal order
    pub pending: Vec<ProposedAction>,
    pub reason: String,
    pub suspended_at: DateTime<Utc>,
}

/// An external decision on a suspended thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl From<bool> for Decision {
    fn from(approved: bool) -> Self {
        if approved { Decision::Approve } else { Decision::Reject }
    }
}

/// A governed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,

    /// Ordered, append-only messages
    pub messages: Vec<Message>,

    pub status: ThreadStatus,

    /// Present only while `status` is `suspended_for_approval`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspended: Option<SuspendedAction>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RunOutcome>,

    pub variant: Variant,

    /// Never shown to the agent
    pub context: ExecutionContext,

    /// Agent turns consumed so far
    pub turns: u32,

    pub max_turns: u32,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Thread {
    /// Create a new running thread with no messages.
    pub fn new(variant: Variant, context: ExecutionContext, max_turns: u32) -> Self {
        let now = Utc::now();
        Self {
            id: ThreadId::new(),
            messages: Vec::new(),
            status: ThreadStatus::Running,
            suspended: None,
            outcome: None,
            variant,
            context,
            turns: 0,
            max_turns,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// The external text the run started from (first human message).
    pub fn originating_text(&self) -> &str {
        self.messages
            .iter()
            .find(|m| m.role == MessageRole::Human)
            .map(|m| m.content.as_str())
            .unwrap_or("N/A")
    }

    /// The human-readable output of the run so far: the last message's text.
    pub fn final_output(&self) -> &str {
        self.messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or_default()
    }

    /// Tool-result messages answering the given correlation id.
    pub fn results_for(&self, correlation_id: &str) -> Vec<&Message> {
        self.messages
            .iter()
            .filter(|m| m.correlation_id.as_deref() == Some(correlation_id))
            .collect()
    }
}
