//! Governance service: the boundary surface transports call into.
//!
//! Wires the turn engine, the gate chains per variant, the ledger and the
//! thread store together, and turns threads into serializable reports.

use crate::engine::TurnEngine;
use crate::executor::ActionExecutor;
use crate::store::ThreadStore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use taxmate_config::AppConfig;
use taxmate_core::{
    ActorRole, Anomaly, Decision, EventBus, ExecutionContext, GovernanceEvent, Judge, LogEntry,
    Message, ProposedAction, Proposer, RunOutcome, Thread, ThreadError, ThreadStatus, Variant,
};
use taxmate_gates::{ApprovalGate, ApprovalPolicy, GateChain, GateError, GateSet, JudgmentGate};
use taxmate_ledger::{Ledger, TracingSink};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Gate(#[from] GateError),

    #[error(transparent)]
    Thread(#[from] ThreadError),
}

impl From<ServiceError> for taxmate_core::Error {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Gate(g) => g.into(),
            ServiceError::Thread(t) => Self::Thread(t),
        }
    }
}

/// Result of `start_run` and `resume_run`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub thread_id: String,
    pub status: ThreadStatus,
    pub outcome: Option<RunOutcome>,
    pub final_output: String,
    /// The action awaiting a decision, when suspended.
    pub pending_action: Option<ProposedAction>,
}

impl From<&Thread> for RunReport {
    fn from(thread: &Thread) -> Self {
        Self {
            thread_id: thread.id.to_string(),
            status: thread.status,
            outcome: thread.outcome.clone(),
            final_output: thread.final_output().to_string(),
            pending_action: thread.suspended.as_ref().map(|s| s.action.clone()),
        }
    }
}

/// Result of `get_state`.
#[derive(Debug, Clone, Serialize)]
pub struct StateReport {
    pub thread_id: String,
    pub thread_status: ThreadStatus,
    /// `await_approval` while suspended, `agent` while running, absent once terminal.
    pub pending_next_step: Option<&'static str>,
    pub variant: Variant,
    pub role: ActorRole,
    pub turns: u32,
    pub outcome: Option<RunOutcome>,
    pub pending_action: Option<ProposedAction>,
    pub messages: Vec<Message>,
}

impl From<&Thread> for StateReport {
    fn from(thread: &Thread) -> Self {
        let pending_next_step = match thread.status {
            ThreadStatus::SuspendedForApproval => Some("await_approval"),
            ThreadStatus::Running => Some("agent"),
            ThreadStatus::Completed | ThreadStatus::Failed => None,
        };
        Self {
            thread_id: thread.id.to_string(),
            thread_status: thread.status,
            pending_next_step,
            variant: thread.variant,
            role: thread.context.role,
            turns: thread.turns,
            outcome: thread.outcome.clone(),
            pending_action: thread.suspended.as_ref().map(|s| s.action.clone()),
            messages: thread.messages.clone(),
        }
    }
}

/// Run and resume calls drive the engine on a spawned task that owns the
/// thread until it is saved. Dropping the caller's future (a client hanging
/// up mid-request) never strands a thread half-executed in `running`.
pub struct GovernanceService {
    engine: Arc<TurnEngine>,
    ledger: Arc<Ledger>,
    chains: HashMap<Variant, GateChain>,
    store: Arc<ThreadStore>,
    max_turns: u32,
    event_bus: Arc<EventBus>,
}

impl GovernanceService {
    /// Build the service from configuration and the two collaborators.
    ///
    /// Every variant's gate chain is built up front, so a bad approval
    /// policy or an unknown gate descriptor fails here rather than mid-run.
    pub fn new(
        config: &AppConfig,
        proposer: Arc<dyn Proposer>,
        judge: Arc<dyn Judge>,
    ) -> Result<Self, GateError> {
        let ledger = Arc::new(Ledger::from_config(config).with_sink(Box::new(TracingSink)));

        let gates = GateSet::new()
            .with(Arc::new(JudgmentGate::from_config(judge, &config.judgment)))
            .with(Arc::new(ApprovalGate::new(ApprovalPolicy::from_config(
                &config.approval,
            )?)));

        let mut chains = HashMap::new();
        for variant in Variant::ALL {
            chains.insert(variant, gates.chain(config.variants.gates_for(variant))?);
        }

        let event_bus = Arc::new(EventBus::default());
        let engine = Arc::new(TurnEngine::new(
            proposer,
            ActionExecutor::new(ledger.clone()),
            config.agent.system_prompt.clone(),
            event_bus.clone(),
        )
        .with_proposal_timeout(Duration::from_secs(config.agent.proposal_timeout_secs)));

        info!(
            max_turns = config.agent.max_turns,
            chains = ?chains,
            "Governance service ready"
        );

        Ok(Self {
            engine,
            ledger,
            chains,
            store: Arc::new(ThreadStore::default()),
            max_turns: config.agent.max_turns,
            event_bus,
        })
    }

    /// Start a run over `invoice_text` under `variant`'s gate chain.
    pub async fn start_run(&self, invoice_text: &str, role: ActorRole, variant: Variant) -> RunReport {
        let engine = self.engine.clone();
        let store = self.store.clone();
        let chain = self.chain_for(variant);
        let invoice_text = invoice_text.to_string();
        let max_turns = self.max_turns;

        join(tokio::spawn(async move {
            let thread = engine
                .start(
                    &invoice_text,
                    ExecutionContext::new(role),
                    variant,
                    &chain,
                    max_turns,
                )
                .await;
            let report = RunReport::from(&thread);
            store.save(thread).await;
            report
        }))
        .await
    }

    /// Resolve a suspended run with an operator decision.
    ///
    /// Fails with [`ThreadError::NotFound`] for an unknown id and
    /// [`ThreadError::NotSuspended`] when the thread is not awaiting approval;
    /// in both cases nothing changes.
    pub async fn resume_run(&self, thread_id: &str, approved: bool) -> Result<RunReport, ServiceError> {
        let decision = Decision::from(approved);
        let (suspended, mut thread) = self
            .store
            .update(thread_id, |t| TurnEngine::resolve(t, decision))
            .await?;

        match decision {
            Decision::Approve => {
                let engine = self.engine.clone();
                let store = self.store.clone();
                let chain = self.chain_for(thread.variant);

                Ok(join(tokio::spawn(async move {
                    engine
                        .continue_approved(&mut thread, suspended, &chain)
                        .await;
                    let report = RunReport::from(&thread);
                    store.save(thread).await;
                    report
                }))
                .await)
            }
            Decision::Reject => {
                self.engine.finish_rejected(&thread);
                Ok(RunReport::from(&thread))
            }
        }
    }

    pub async fn get_state(&self, thread_id: &str) -> Result<StateReport, ServiceError> {
        self.store
            .get(thread_id)
            .await
            .map(|t| StateReport::from(&t))
            .ok_or_else(|| ThreadError::NotFound(thread_id.to_string()).into())
    }

    /// Clear the ledger log and restore the seeded accounts.
    ///
    /// Threads are kept; a suspended thread can still be resumed.
    pub fn reset(&self) {
        self.ledger.reset();
        info!("Ledger reset");
    }

    pub fn get_logs(&self) -> Vec<LogEntry> {
        self.ledger.get_logs()
    }

    pub fn audit(&self) -> Vec<Anomaly> {
        self.ledger.audit_logs()
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<GovernanceEvent>> {
        self.event_bus.subscribe()
    }

    fn chain_for(&self, variant: Variant) -> GateChain {
        // Every variant gets a chain in `new`.
        self.chains.get(&variant).cloned().unwrap_or_default()
    }
}

/// Wait for a run task, re-raising its panic on the caller.
async fn join<T>(task: JoinHandle<T>) -> T {
    match task.await {
        Ok(value) => value,
        Err(e) => match e.try_into_panic() {
            Ok(payload) => std::panic::resume_unwind(payload),
            // Run tasks are never aborted.
            Err(e) => unreachable!("run task cancelled: {e}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use taxmate_core::{
        ActionKind, AgentError, JudgmentError, JudgmentRequest, MessageRole, ProposalRequest,
    };
    use tokio::sync::Notify;

    struct ScriptedProposer {
        script: Mutex<Vec<Message>>,
    }

    impl ScriptedProposer {
        fn new(script: Vec<Message>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script),
            })
        }
    }

    #[async_trait]
    impl Proposer for ScriptedProposer {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn propose(&self, _request: ProposalRequest) -> Result<Message, AgentError> {
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Ok(Message::agent("Done."))
            } else {
                Ok(script.remove(0))
            }
        }
    }

    /// Proposes one payment, then holds every later turn until released.
    struct HeldProposer {
        amount: u64,
        calls: AtomicUsize,
        release: Notify,
    }

    impl HeldProposer {
        fn new(amount: u64) -> Arc<Self> {
            Arc::new(Self {
                amount,
                calls: AtomicUsize::new(0),
                release: Notify::new(),
            })
        }
    }

    #[async_trait]
    impl Proposer for HeldProposer {
        fn name(&self) -> &str {
            "held"
        }

        async fn propose(&self, _request: ProposalRequest) -> Result<Message, AgentError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                return Ok(payment(self.amount));
            }
            self.release.notified().await;
            Ok(Message::agent("Done."))
        }
    }

    struct AllowJudge;

    #[async_trait]
    impl Judge for AllowJudge {
        fn name(&self) -> &str {
            "allow"
        }

        async fn judge(&self, _request: &JudgmentRequest) -> Result<String, JudgmentError> {
            Ok("ALLOW".into())
        }
    }

    fn payment(amount: u64) -> Message {
        Message::agent_with_actions(
            "",
            vec![ProposedAction::with_id(
                "call_pay",
                ActionKind::SendMoney,
                serde_json::json!({"vendor": "Sakura Office Supplies", "amount": amount}),
            )],
        )
    }

    fn service(script: Vec<Message>) -> GovernanceService {
        GovernanceService::new(
            &AppConfig::default(),
            ScriptedProposer::new(script),
            Arc::new(AllowJudge),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn start_run_stores_the_thread() {
        let svc = service(vec![payment(1_000)]);
        let report = svc
            .start_run("invoice", ActorRole::Admin, Variant::JudgmentGated)
            .await;

        assert_eq!(report.status, ThreadStatus::Completed);
        assert_eq!(report.final_output, "Done.");
        assert!(report.pending_action.is_none());

        let state = svc.get_state(&report.thread_id).await.unwrap();
        assert_eq!(state.thread_status, ThreadStatus::Completed);
        assert_eq!(state.pending_next_step, None);
        assert_eq!(svc.get_logs().len(), 1);
    }

    #[tokio::test]
    async fn suspended_run_reports_pending_step_and_resumes() {
        let svc = service(vec![payment(60_000)]);
        let report = svc
            .start_run("invoice", ActorRole::Admin, Variant::ApprovalGated)
            .await;
        assert_eq!(report.status, ThreadStatus::SuspendedForApproval);
        assert_eq!(
            report.pending_action.as_ref().map(|a| a.kind),
            Some(ActionKind::SendMoney)
        );

        let state = svc.get_state(&report.thread_id).await.unwrap();
        assert_eq!(state.pending_next_step, Some("await_approval"));
        assert!(svc.get_logs().is_empty());

        let resumed = svc.resume_run(&report.thread_id, true).await.unwrap();
        assert_eq!(resumed.status, ThreadStatus::Completed);
        assert_eq!(svc.get_logs().len(), 1);
        assert!(svc.get_logs()[0].is_executed());

        let state = svc.get_state(&report.thread_id).await.unwrap();
        assert_eq!(state.thread_status, ThreadStatus::Completed);
    }

    #[tokio::test]
    async fn second_resume_is_rejected_and_changes_nothing() {
        let svc = service(vec![payment(60_000)]);
        let report = svc
            .start_run("invoice", ActorRole::Admin, Variant::ApprovalGated)
            .await;

        let rejected = svc.resume_run(&report.thread_id, false).await.unwrap();
        assert_eq!(rejected.status, ThreadStatus::Failed);
        assert_eq!(rejected.outcome, Some(RunOutcome::Rejected));

        let before = svc.get_state(&report.thread_id).await.unwrap().messages.len();
        let err = svc.resume_run(&report.thread_id, true).await.unwrap_err();
        assert!(matches!(err, ServiceError::Thread(ThreadError::NotSuspended { .. })));
        let after = svc.get_state(&report.thread_id).await.unwrap().messages.len();
        assert_eq!(before, after);
        assert!(svc.get_logs().is_empty());
    }

    #[tokio::test]
    async fn unknown_thread_is_not_found() {
        let svc = service(vec![]);
        assert!(matches!(
            svc.resume_run("nope", true).await,
            Err(ServiceError::Thread(ThreadError::NotFound(_)))
        ));
        assert!(matches!(
            svc.get_state("nope").await,
            Err(ServiceError::Thread(ThreadError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn reset_clears_logs_and_audit() {
        let svc = service(vec![payment(20_000)]);
        svc.start_run("invoice", ActorRole::Admin, Variant::Ungoverned)
            .await;
        assert_eq!(svc.get_logs().len(), 1);
        assert_eq!(svc.audit().len(), 1);

        svc.reset();
        assert!(svc.get_logs().is_empty());
        assert!(svc.audit().is_empty());
    }

    #[tokio::test]
    async fn audit_is_idempotent() {
        let svc = service(vec![payment(20_000)]);
        svc.start_run("invoice", ActorRole::Admin, Variant::Ungoverned)
            .await;
        assert_eq!(svc.audit(), svc.audit());
    }

    async fn wait_until_settled(svc: &GovernanceService, thread_id: &str) -> StateReport {
        for _ in 0..200 {
            // A fresh run is stored once its task finishes.
            if let Ok(state) = svc.get_state(thread_id).await {
                if state.thread_status != ThreadStatus::Running {
                    return state;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("thread {thread_id} never left running");
    }

    fn results_for(state: &StateReport, correlation_id: &str) -> usize {
        state
            .messages
            .iter()
            .filter(|m| {
                m.role == MessageRole::ToolResult && m.correlation_id.as_deref() == Some(correlation_id)
            })
            .count()
    }

    #[tokio::test]
    async fn dropped_resume_still_finishes_and_saves_the_thread() {
        let proposer = HeldProposer::new(60_000);
        let svc = GovernanceService::new(&AppConfig::default(), proposer.clone(), Arc::new(AllowJudge))
            .unwrap();
        let report = svc
            .start_run("invoice", ActorRole::Admin, Variant::ApprovalGated)
            .await;
        assert_eq!(report.status, ThreadStatus::SuspendedForApproval);

        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            svc.resume_run(&report.thread_id, true),
        )
        .await;
        assert!(abandoned.is_err());
        proposer.release.notify_one();

        let state = wait_until_settled(&svc, &report.thread_id).await;
        assert_eq!(state.thread_status, ThreadStatus::Completed);
        assert_eq!(results_for(&state, "call_pay"), 1);
        assert_eq!(svc.get_logs().len(), 1);

        let err = svc.resume_run(&report.thread_id, true).await.unwrap_err();
        assert!(matches!(err, ServiceError::Thread(ThreadError::NotSuspended { .. })));
        assert_eq!(svc.get_logs().len(), 1);
    }

    #[tokio::test]
    async fn dropped_start_still_stores_the_thread() {
        let proposer = HeldProposer::new(1_000);
        let svc = GovernanceService::new(&AppConfig::default(), proposer.clone(), Arc::new(AllowJudge))
            .unwrap();
        let mut events = svc.subscribe();

        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            svc.start_run("invoice", ActorRole::Admin, Variant::Ungoverned),
        )
        .await;
        assert!(abandoned.is_err());

        let thread_id = match events.recv().await.unwrap().as_ref() {
            GovernanceEvent::RunStarted { thread_id, .. } => thread_id.clone(),
            other => panic!("unexpected first event: {other:?}"),
        };
        proposer.release.notify_one();

        let state = wait_until_settled(&svc, &thread_id).await;
        assert_eq!(state.thread_status, ThreadStatus::Completed);
        assert_eq!(results_for(&state, "call_pay"), 1);
        assert_eq!(svc.get_logs().len(), 1);
    }

    #[test]
    fn invalid_policy_fails_construction() {
        let mut config = AppConfig::default();
        config.approval.rules[0].threshold = None;
        let result = GovernanceService::new(
            &config,
            ScriptedProposer::new(vec![]),
            Arc::new(AllowJudge),
        );
        assert!(matches!(result, Err(GateError::InvalidPolicy { .. })));
    }
}
