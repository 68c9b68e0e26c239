//! The turn engine: the heart of TaxMate.
//!
//! A run follows a **Propose → Gate → Execute** cycle:
//!
//! 1. **Receive** an invoice as the human message of a new thread
//! 2. **Propose**: the agent answers, possibly with proposed actions
//! 3. **Gate**: the variant's gate chain passes, blocks, or suspends them
//! 4. **Execute**: passed actions hit the ledger with the run's role, results loop back to step 2
//! 5. **Finish** when the agent answers without actions, a gate blocks, or the turn bound is hit
//!
//! A suspended thread is parked in the [`ThreadStore`] until
//! [`GovernanceService::resume_run`] resolves it.

pub mod engine;
pub mod executor;
pub mod service;
pub mod state;
pub mod store;

pub use engine::TurnEngine;
pub use executor::ActionExecutor;
pub use service::{GovernanceService, RunReport, ServiceError, StateReport};
pub use state::{TransitionEvent, apply, next_status};
pub use store::{MAX_THREADS, ThreadStore};
