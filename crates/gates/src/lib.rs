//! Defense gates: policy components between "the agent proposed an action"
//! and "the action reached the ledger".
//!
//! ```text
//! ┌─────────────┐    ┌──────────────────────────┐    ┌──────────┐
//! │ Turn Engine │───▶│ Gate chain               │───▶│  Ledger  │
//! │ (proposals) │    │ judgment → approval      │    │ (permit) │
//! └─────────────┘    └──────────────────────────┘    └──────────┘
//!                          │
//!                    ┌─────┴─────┐
//!                    │  Verdict  │
//!                    │ Pass      │
//!                    │ Block     │
//!                    │ Suspend   │
//!                    └───────────┘
//! ```
//!
//! Which gates run for a pipeline variant is data: an ordered list of
//! [`GateKind`] descriptors turned into a [`GateChain`]. The permission check
//! is not a gate; it lives inside the ledger and always runs.

mod approval;
mod chain;
mod judgment;

pub use approval::{ApprovalGate, ApprovalPolicy, ApprovalPredicate, ApprovalRule};
pub use chain::{GateChain, GateSet};
pub use judgment::{BLOCK_NOTICE, JudgmentGate, is_block_signal};

use async_trait::async_trait;
use taxmate_core::{GateKind, JudgmentError, ProposedAction};

/// Errors from the gate subsystem.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// The judgment function failed; the turn must fail closed.
    #[error("{0}")]
    Judgment(#[from] JudgmentError),

    #[error("invalid approval policy: {reason}")]
    InvalidPolicy { reason: String },

    #[error("no {kind} gate is registered")]
    Unregistered { kind: &'static str },
}

impl From<GateError> for taxmate_core::Error {
    fn from(e: GateError) -> Self {
        match e {
            GateError::Judgment(j) => Self::Judgment(j),
            other => Self::config(other.to_string()),
        }
    }
}

/// What a gate sees of one agent turn.
#[derive(Debug, Clone, Copy)]
pub struct GateContext<'a> {
    pub thread_id: &'a str,
    /// Every action proposed in this turn, in proposal order
    pub pending: &'a [ProposedAction],
    /// The originating external text (the invoice)
    pub context_text: &'a str,
}

/// One terminal notice answering a pending action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockNotice {
    pub correlation_id: String,
    pub text: String,
}

/// The outcome of running a gate (or a whole chain) over a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// No objection; continue to the next gate or to execution.
    Pass,
    /// End the run; one notice per pending action.
    Block {
        gate: GateKind,
        notices: Vec<BlockNotice>,
    },
    /// Pause the run until an external decision on `action`.
    Suspend {
        gate: GateKind,
        action: ProposedAction,
        reason: String,
    },
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

/// A policy component interposed between proposal and execution.
#[async_trait]
pub trait Gate: Send + Sync {
    fn kind(&self) -> GateKind;

    async fn check(&self, ctx: &GateContext<'_>) -> Result<Verdict, GateError>;
}
