//! Thread state machine.
//!
//! Status changes happen only through [`apply`], which checks the transition
//! against the table below and records the run outcome alongside the status.
//!
//! | from                     | event          | to                       |
//! |--------------------------|----------------|--------------------------|
//! | running                  | no_actions     | completed                |
//! | running                  | blocked        | completed                |
//! | running                  | loop_bound     | completed                |
//! | running                  | suspended      | suspended_for_approval   |
//! | running                  | judgment_failed| failed                   |
//! | running                  | agent_failed   | failed                   |
//! | suspended_for_approval   | approved       | running                  |
//! | suspended_for_approval   | rejected       | failed                   |

use chrono::Utc;
use taxmate_core::{RunOutcome, SuspendedAction, Thread, ThreadError, ThreadStatus};

/// Typed events that move a thread between states.
#[derive(Debug, Clone)]
pub enum TransitionEvent {
    /// The agent answered without proposing actions.
    NoActions,
    /// A gate blocked the turn.
    Blocked { gate: String },
    /// The turn bound was hit, or the agent signalled its own recursion limit.
    LoopBound { turns: u32 },
    /// A gate paused the turn pending an external decision.
    Suspended(SuspendedAction),
    /// The judgment function failed.
    JudgmentFailed { cause: String },
    /// The agent-proposal function failed.
    AgentFailed { cause: String },
    Approved,
    Rejected,
}

impl TransitionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TransitionEvent::NoActions => "no_actions",
            TransitionEvent::Blocked { .. } => "blocked",
            TransitionEvent::LoopBound { .. } => "loop_bound",
            TransitionEvent::Suspended(_) => "suspended",
            TransitionEvent::JudgmentFailed { .. } => "judgment_failed",
            TransitionEvent::AgentFailed { .. } => "agent_failed",
            TransitionEvent::Approved => "approved",
            TransitionEvent::Rejected => "rejected",
        }
    }
}

/// The status `event` leads to from `from`, if the transition is legal.
pub fn next_status(from: ThreadStatus, event: &TransitionEvent) -> Result<ThreadStatus, ThreadError> {
    use ThreadStatus::*;
    use TransitionEvent as E;

    match (from, event) {
        (Running, E::NoActions | E::Blocked { .. } | E::LoopBound { .. }) => Ok(Completed),
        (Running, E::Suspended(_)) => Ok(SuspendedForApproval),
        (Running, E::JudgmentFailed { .. } | E::AgentFailed { .. }) => Ok(Failed),
        (SuspendedForApproval, E::Approved) => Ok(Running),
        (SuspendedForApproval, E::Rejected) => Ok(Failed),
        (from, event) => Err(ThreadError::InvalidTransition {
            from: from.to_string(),
            event: event.name().to_string(),
        }),
    }
}

/// Apply `event` to `thread`, updating status, outcome, and suspension.
///
/// On error the thread is left untouched.
pub fn apply(thread: &mut Thread, event: TransitionEvent) -> Result<(), ThreadError> {
    let to = next_status(thread.status, &event)?;

    let outcome = match event {
        TransitionEvent::NoActions => Some(RunOutcome::Answered),
        TransitionEvent::Blocked { gate } => Some(RunOutcome::Blocked { gate }),
        TransitionEvent::LoopBound { turns } => Some(RunOutcome::LoopBoundExceeded { turns }),
        TransitionEvent::Suspended(suspended) => {
            thread.suspended = Some(suspended);
            Some(RunOutcome::AwaitingApproval)
        }
        TransitionEvent::JudgmentFailed { cause } => Some(RunOutcome::JudgmentUnavailable { cause }),
        TransitionEvent::AgentFailed { cause } => Some(RunOutcome::AgentFailed { cause }),
        TransitionEvent::Approved => {
            thread.suspended = None;
            None
        }
        TransitionEvent::Rejected => {
            thread.suspended = None;
            Some(RunOutcome::Rejected)
        }
    };

    thread.status = to;
    thread.outcome = outcome;
    thread.updated_at = Utc::now();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use taxmate_core::{ActionKind, ActorRole, ExecutionContext, ProposedAction, Variant};

    fn thread() -> Thread {
        Thread::new(Variant::ApprovalGated, ExecutionContext::new(ActorRole::Admin), 10)
    }

    fn suspension() -> SuspendedAction {
        let action = ProposedAction::with_id(
            "c1",
            ActionKind::SendMoney,
            serde_json::json!({"vendor": "V", "amount": 60000}),
        );
        SuspendedAction {
            action: action.clone(),
            pending: vec![action],
            reason: "big".into(),
            suspended_at: Utc::now(),
        }
    }

    #[test]
    fn running_to_completed() {
        let mut t = thread();
        apply(&mut t, TransitionEvent::NoActions).unwrap();
        assert_eq!(t.status, ThreadStatus::Completed);
        assert_eq!(t.outcome, Some(RunOutcome::Answered));
    }

    #[test]
    fn loop_bound_is_a_completed_run() {
        let mut t = thread();
        apply(&mut t, TransitionEvent::LoopBound { turns: 10 }).unwrap();
        assert_eq!(t.status, ThreadStatus::Completed);
        assert_eq!(t.outcome, Some(RunOutcome::LoopBoundExceeded { turns: 10 }));
    }

    #[test]
    fn suspend_then_approve_returns_to_running() {
        let mut t = thread();
        apply(&mut t, TransitionEvent::Suspended(suspension())).unwrap();
        assert_eq!(t.status, ThreadStatus::SuspendedForApproval);
        assert!(t.suspended.is_some());

        apply(&mut t, TransitionEvent::Approved).unwrap();
        assert_eq!(t.status, ThreadStatus::Running);
        assert!(t.suspended.is_none());
        assert!(t.outcome.is_none());
    }

    #[test]
    fn suspend_then_reject_fails() {
        let mut t = thread();
        apply(&mut t, TransitionEvent::Suspended(suspension())).unwrap();
        apply(&mut t, TransitionEvent::Rejected).unwrap();
        assert_eq!(t.status, ThreadStatus::Failed);
        assert_eq!(t.outcome, Some(RunOutcome::Rejected));
        assert!(t.suspended.is_none());
    }

    #[test]
    fn judgment_failure_fails_with_cause() {
        let mut t = thread();
        apply(
            &mut t,
            TransitionEvent::JudgmentFailed {
                cause: "timed out".into(),
            },
        )
        .unwrap();
        assert_eq!(t.status, ThreadStatus::Failed);
        assert_eq!(
            t.outcome,
            Some(RunOutcome::JudgmentUnavailable {
                cause: "timed out".into()
            })
        );
    }

    #[test]
    fn approving_a_running_thread_is_invalid_and_leaves_it_untouched() {
        let mut t = thread();
        let err = apply(&mut t, TransitionEvent::Approved).unwrap_err();
        assert!(matches!(err, ThreadError::InvalidTransition { .. }));
        assert_eq!(t.status, ThreadStatus::Running);
    }

    #[test]
    fn terminal_states_accept_nothing() {
        for event in [
            TransitionEvent::NoActions,
            TransitionEvent::Approved,
            TransitionEvent::Rejected,
            TransitionEvent::Suspended(suspension()),
        ] {
            assert!(next_status(ThreadStatus::Completed, &event).is_err());
            assert!(next_status(ThreadStatus::Failed, &event).is_err());
        }
    }
}
