//! The turn engine: drives agent turn → gate chain → execution cycles.

use crate::executor::ActionExecutor;
use crate::state::{TransitionEvent, apply};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use taxmate_core::{
    ActionKind, AgentError, Decision, EventBus, ExecutionContext, GovernanceEvent, Message,
    MessageRole, ProposalRequest, ProposedAction, Proposer, SuspendedAction, Thread, ThreadError,
    ThreadStatus, Variant,
};
use taxmate_gates::{GateChain, GateContext, Verdict};
use tracing::{debug, info, warn};

/// Drives a thread through its turns.
///
/// The engine holds no per-thread state; everything about a run lives on
/// the [`Thread`] it is given, so a suspended thread can be stored and
/// picked up again by any later call.
pub struct TurnEngine {
    proposer: Arc<dyn Proposer>,
    executor: ActionExecutor,
    system_prompt: String,
    proposal_timeout: Duration,
    event_bus: Arc<EventBus>,
}

impl TurnEngine {
    pub fn new(
        proposer: Arc<dyn Proposer>,
        executor: ActionExecutor,
        system_prompt: impl Into<String>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            proposer,
            executor,
            system_prompt: system_prompt.into(),
            proposal_timeout: Duration::from_secs(60),
            event_bus,
        }
    }

    /// Bound every agent-proposal call.
    pub fn with_proposal_timeout(mut self, timeout: Duration) -> Self {
        self.proposal_timeout = timeout;
        self
    }

    /// Create a thread for `initial_message` and run it until it completes,
    /// fails, or suspends.
    pub async fn start(
        &self,
        initial_message: &str,
        ctx: ExecutionContext,
        variant: Variant,
        chain: &GateChain,
        max_turns: u32,
    ) -> Thread {
        let mut thread = Thread::new(variant, ctx, max_turns);
        thread.push(Message::system(&self.system_prompt));
        thread.push(Message::human(initial_message));

        info!(
            thread_id = %thread.id,
            variant = %variant,
            role = %thread.context.role,
            gates = ?chain.kinds(),
            "Run started"
        );
        self.event_bus.publish(GovernanceEvent::RunStarted {
            thread_id: thread.id.to_string(),
            variant: variant.to_string(),
            role: thread.context.role.to_string(),
            timestamp: Utc::now(),
        });

        self.run(&mut thread, chain).await;
        thread
    }

    /// Resolve a suspended thread with an external decision.
    ///
    /// Synchronous and side-effect free beyond `thread`, so callers can run
    /// it under their store lock to claim the thread atomically. On approval
    /// the returned suspension must be handed to [`Self::continue_approved`].
    pub fn resolve(thread: &mut Thread, decision: Decision) -> Result<SuspendedAction, ThreadError> {
        let suspended = match (&thread.status, &thread.suspended) {
            (ThreadStatus::SuspendedForApproval, Some(s)) => s.clone(),
            _ => {
                return Err(ThreadError::NotSuspended {
                    thread_id: thread.id.to_string(),
                    status: thread.status.to_string(),
                });
            }
        };

        match decision {
            Decision::Approve => {
                apply(thread, TransitionEvent::Approved)?;
                thread.push(Message::system(format!(
                    "Approved by operator: {}. Resuming.",
                    describe(&suspended.action)
                )));
            }
            Decision::Reject => {
                apply(thread, TransitionEvent::Rejected)?;
                for action in &suspended.pending {
                    thread.push(Message::tool_result(
                        &action.id,
                        format!(
                            "Rejected by operator: {} was not executed.",
                            describe(action)
                        ),
                    ));
                }
            }
        }

        info!(thread_id = %thread.id, ?decision, "Suspended thread resolved");
        Ok(suspended)
    }

    /// Execute the actions of an approved turn, then keep running.
    ///
    /// The approved turn is not gated again; later turns are.
    pub async fn continue_approved(
        &self,
        thread: &mut Thread,
        suspended: SuspendedAction,
        chain: &GateChain,
    ) {
        self.event_bus.publish(GovernanceEvent::RunResumed {
            thread_id: thread.id.to_string(),
            approved: true,
            timestamp: Utc::now(),
        });

        self.execute_all(thread, &suspended.pending);
        self.run(thread, chain).await;
    }

    /// Publish the resumption of a rejected thread and its end.
    pub fn finish_rejected(&self, thread: &Thread) {
        self.event_bus.publish(GovernanceEvent::RunResumed {
            thread_id: thread.id.to_string(),
            approved: false,
            timestamp: Utc::now(),
        });
        self.finished(thread);
    }

    /// The main loop. Returns when the thread leaves `running`.
    pub async fn run(&self, thread: &mut Thread, chain: &GateChain) {
        while thread.status == ThreadStatus::Running {
            if thread.turns >= thread.max_turns {
                let turns = thread.turns;
                self.loop_bound(thread, turns);
                break;
            }
            thread.turns += 1;

            debug!(thread_id = %thread.id, turn = thread.turns, "Agent turn");

            let proposal = match self.propose(thread).await {
                Ok(message) => message,
                Err(AgentError::RecursionLimit { turns }) => {
                    self.loop_bound(thread, turns);
                    break;
                }
                Err(e) => {
                    warn!(thread_id = %thread.id, error = %e, "Agent proposal failed");
                    thread.push(Message::system(format!("Agent failed: {e}")));
                    self.transition(thread, TransitionEvent::AgentFailed { cause: e.to_string() });
                    break;
                }
            };

            let actions = proposal.actions.clone();
            thread.push(proposal);

            if actions.is_empty() {
                self.transition(thread, TransitionEvent::NoActions);
                break;
            }

            debug!(
                thread_id = %thread.id,
                actions = ?actions.iter().map(|a| a.kind).collect::<Vec<ActionKind>>(),
                "Agent proposed actions"
            );

            let thread_id = thread.id.to_string();
            let gate_ctx = GateContext {
                thread_id: &thread_id,
                pending: &actions,
                context_text: thread.originating_text(),
            };

            let verdict = chain.evaluate(&gate_ctx).await;

            match verdict {
                Ok(Verdict::Pass) => self.execute_all(thread, &actions),
                Ok(Verdict::Block { gate, notices }) => {
                    for notice in notices {
                        thread.push(Message::tool_result(notice.correlation_id, notice.text));
                    }
                    self.event_bus.publish(GovernanceEvent::ActionsBlocked {
                        thread_id: thread.id.to_string(),
                        gate: gate.as_str().to_string(),
                        count: actions.len(),
                        timestamp: Utc::now(),
                    });
                    self.transition(
                        thread,
                        TransitionEvent::Blocked {
                            gate: gate.as_str().to_string(),
                        },
                    );
                }
                Ok(Verdict::Suspend { gate, action, reason }) => {
                    thread.push(Message::system(format!(
                        "Approval required ({} gate): {reason}. The run is paused until an \
                         operator approves or rejects {}.",
                        gate.as_str(),
                        describe(&action)
                    )));
                    self.event_bus.publish(GovernanceEvent::RunSuspended {
                        thread_id: thread.id.to_string(),
                        action: action.kind.to_string(),
                        reason: reason.clone(),
                        timestamp: Utc::now(),
                    });
                    self.transition(
                        thread,
                        TransitionEvent::Suspended(SuspendedAction {
                            action,
                            pending: actions,
                            reason,
                            suspended_at: Utc::now(),
                        }),
                    );
                }
                Err(e) => {
                    let cause = e.to_string();
                    for action in &actions {
                        thread.push(Message::tool_result(
                            &action.id,
                            format!("Judgment unavailable: {cause}"),
                        ));
                    }
                    self.transition(thread, TransitionEvent::JudgmentFailed { cause });
                }
            }
        }
    }

    /// Ask the agent for its next message.
    ///
    /// Only the leading preamble and non-system messages are forwarded;
    /// operator notices stay on the thread for humans.
    async fn propose(&self, thread: &Thread) -> Result<Message, AgentError> {
        let messages = thread
            .messages
            .iter()
            .enumerate()
            .filter(|(i, m)| *i == 0 || m.role != MessageRole::System)
            .map(|(_, m)| m.clone())
            .collect();

        let request = ProposalRequest {
            messages,
            actions: ActionKind::definitions(),
        };

        match tokio::time::timeout(self.proposal_timeout, self.proposer.propose(request)).await {
            Ok(result) => result,
            Err(_) => Err(AgentError::Timeout(format!(
                "agent proposal exceeded {}s",
                self.proposal_timeout.as_secs()
            ))),
        }
    }

    fn execute_all(&self, thread: &mut Thread, actions: &[ProposedAction]) {
        for action in actions {
            let result = self.executor.execute(action, &thread.context);
            info!(
                thread_id = %thread.id,
                action = %action.kind,
                role = %thread.context.role,
                result = %result,
                "Action executed"
            );
            self.event_bus.publish(GovernanceEvent::ActionExecuted {
                thread_id: thread.id.to_string(),
                action: action.kind.to_string(),
                result: result.clone(),
                timestamp: Utc::now(),
            });
            thread.push(Message::tool_result(&action.id, result));
        }
    }

    fn loop_bound(&self, thread: &mut Thread, turns: u32) {
        warn!(
            thread_id = %thread.id,
            turns,
            "Turn bound reached: the agent kept proposing actions"
        );
        thread.push(Message::system(format!(
            "Stopped after {turns} agent turns: the agent kept following instructions \
             into a loop and the turn bound was reached."
        )));
        self.transition(thread, TransitionEvent::LoopBound { turns });
    }

    fn transition(&self, thread: &mut Thread, event: TransitionEvent) {
        let name = event.name();
        if let Err(e) = apply(thread, event) {
            // The loop only fires events legal from `running`.
            warn!(thread_id = %thread.id, event = name, error = %e, "Rejected transition");
            return;
        }
        if thread.status.is_terminal() {
            self.finished(thread);
        }
    }

    fn finished(&self, thread: &Thread) {
        info!(
            thread_id = %thread.id,
            status = %thread.status,
            outcome = ?thread.outcome,
            turns = thread.turns,
            "Run finished"
        );
        self.event_bus.publish(GovernanceEvent::RunFinished {
            thread_id: thread.id.to_string(),
            status: thread.status.to_string(),
            turns: thread.turns,
            timestamp: Utc::now(),
        });
    }
}

/// Short human description of an action, e.g. `send_money {"amount":1,...}`.
fn describe(action: &ProposedAction) -> String {
    format!("{} {}", action.kind, action.arguments_json())
}
