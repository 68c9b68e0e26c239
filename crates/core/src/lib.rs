//! # TaxMate Core
//!
//! Domain types, traits, and error definitions for the TaxMate governance
//! pipeline: the layer that sits between "the agent proposes an action" and
//! "the action is executed".
//!
//! This crate has **zero framework dependencies**. It defines the domain model
//! every other crate implements against.
//!
//! ## Design Philosophy
//!
//! The two external collaborators (the agent-proposal function and the
//! judgment function) are traits here. Implementations live elsewhere. This
//! enables:
//! - Swapping an LLM backend via configuration
//! - Testing the whole pipeline with scripted stubs
//! - Clean dependency graph (all crates depend inward on core)

pub mod action;
pub mod context;
pub mod error;
pub mod event;
pub mod invoice;
pub mod judge;
pub mod message;
pub mod proposer;
pub mod record;
pub mod thread;
pub mod variant;

// Re-export key types at crate root for ergonomics
pub use action::{ActionDefinition, ActionKind, ProposedAction};
pub use context::{ActorRole, ExecutionContext};
pub use error::{ActionError, AgentError, Error, JudgmentError, Result, ThreadError};
pub use event::{EventBus, GovernanceEvent};
pub use invoice::SAMPLE_INVOICE;
pub use judge::{Judge, JudgmentRequest};
pub use message::{Message, MessageRole};
pub use proposer::{ProposalRequest, Proposer};
pub use record::{Anomaly, AnomalyKind, LogEntry, LogOutcome, Severity};
pub use thread::{Decision, RunOutcome, SuspendedAction, Thread, ThreadId, ThreadStatus};
pub use variant::{GateKind, Variant};
