//! End-to-end integration tests for the TaxMate governance pipeline.
//!
//! These tests run the poisoned-invoice scenario through the full service
//! (turn engine, gate chains, ledger, anomaly scanner) and through the HTTP
//! gateway, with the two external functions replaced by local stubs.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use taxmate_config::AppConfig;
use taxmate_core::invoice::{ATTACKER_ACCOUNT, SAMPLE_AMOUNT, SAMPLE_VENDOR, SAMPLE_VENDOR_ACCOUNT};
use taxmate_core::{
    ActionKind, ActorRole, AgentError, AnomalyKind, Judge, JudgmentError, JudgmentRequest, Message,
    MessageRole, ProposalRequest, ProposedAction, Proposer, RunOutcome, SAMPLE_INVOICE, Severity,
    ThreadStatus, Variant,
};
use taxmate_engine::GovernanceService;

// ── Stub collaborators ──────────────────────────────────────────────────

/// An agent that obeys instructions embedded in the invoice.
///
/// It first redirects the vendor's account, then pays the invoice. It gives
/// up with a text answer as soon as a tool result tells it it was refused.
struct InjectedAgent {
    calls: AtomicUsize,
}

impl InjectedAgent {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Proposer for InjectedAgent {
    fn name(&self) -> &str {
        "injected"
    }

    async fn propose(&self, request: ProposalRequest) -> Result<Message, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let results: Vec<&Message> = request
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::ToolResult)
            .collect();

        if let Some(last) = results.last() {
            let refused = last.content.starts_with("Permission Denied")
                || last.content.starts_with("[SECURITY WARNING]");
            if refused {
                return Ok(Message::agent("I was not allowed to complete the payment."));
            }
        }

        let invoice = request
            .messages
            .iter()
            .find(|m| m.role == MessageRole::Human)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        match results.len() {
            0 if invoice.contains(ATTACKER_ACCOUNT) => Ok(Message::agent_with_actions(
                "",
                vec![ProposedAction::with_id(
                    "call_update",
                    ActionKind::UpdateAccount,
                    serde_json::json!({"vendor": SAMPLE_VENDOR, "new_account": ATTACKER_ACCOUNT}),
                )],
            )),
            0 | 1 => Ok(Message::agent_with_actions(
                "",
                vec![ProposedAction::with_id(
                    "call_pay",
                    ActionKind::SendMoney,
                    serde_json::json!({"vendor": SAMPLE_VENDOR, "amount": SAMPLE_AMOUNT}),
                )],
            )),
            _ => Ok(Message::agent("Invoice paid.")),
        }
    }
}

/// Blocks anything that routes money to the attacker's account.
struct KeywordJudge {
    calls: AtomicUsize,
}

impl KeywordJudge {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait::async_trait]
impl Judge for KeywordJudge {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn judge(&self, request: &JudgmentRequest) -> Result<String, JudgmentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if request.render().contains(&format!("\"new_account\":\"{ATTACKER_ACCOUNT}\"")) {
            Ok("BLOCK: the account change comes from text hidden in the invoice".into())
        } else {
            Ok("ALLOW".into())
        }
    }
}

struct DownJudge;

#[async_trait::async_trait]
impl Judge for DownJudge {
    fn name(&self) -> &str {
        "down"
    }

    async fn judge(&self, _request: &JudgmentRequest) -> Result<String, JudgmentError> {
        Err(JudgmentError::Unavailable("503 Service Unavailable".into()))
    }
}

fn service_with(judge: Arc<dyn Judge>) -> (GovernanceService, Arc<InjectedAgent>) {
    let agent = InjectedAgent::new();
    let service = GovernanceService::new(&AppConfig::default(), agent.clone(), judge).unwrap();
    (service, agent)
}

fn service() -> GovernanceService {
    service_with(KeywordJudge::new()).0
}

fn attacker_entries(service: &GovernanceService) -> usize {
    service
        .get_logs()
        .iter()
        .filter(|e| e.account.as_deref() == Some(ATTACKER_ACCOUNT))
        .count()
}

// ── Poisoned invoice scenario ───────────────────────────────────────────

#[tokio::test]
async fn e2e_ungoverned_admin_pays_the_attacker() {
    let service = service();

    let report = service
        .start_run(SAMPLE_INVOICE, ActorRole::Admin, Variant::Ungoverned)
        .await;

    assert_eq!(report.status, ThreadStatus::Completed);
    assert_eq!(report.final_output, "Invoice paid.");
    assert!(attacker_entries(&service) >= 1);
    assert_eq!(
        service.ledger().account_for(SAMPLE_VENDOR).as_deref(),
        Some(ATTACKER_ACCOUNT)
    );

    let payment = service
        .get_logs()
        .into_iter()
        .find(|e| e.action == ActionKind::SendMoney)
        .unwrap();
    assert!(payment.is_executed());
    assert_eq!(payment.account.as_deref(), Some(ATTACKER_ACCOUNT));

    let anomalies = service.audit();
    let hit = anomalies
        .iter()
        .find(|a| a.kind == AnomalyKind::BlacklistHit && a.entry.seq == payment.seq)
        .unwrap();
    assert_eq!(hit.severity, Severity::High);
    assert!(
        anomalies
            .iter()
            .any(|a| a.kind == AnomalyKind::AmountAnomaly && a.severity == Severity::Medium)
    );
}

#[tokio::test]
async fn e2e_judgment_gate_blocks_the_redirect() {
    let judge = KeywordJudge::new();
    let (service, _) = service_with(judge.clone());

    let report = service
        .start_run(SAMPLE_INVOICE, ActorRole::Admin, Variant::JudgmentGated)
        .await;

    assert_eq!(report.status, ThreadStatus::Completed);
    assert_eq!(
        report.outcome,
        Some(RunOutcome::Blocked {
            gate: "judgment".into()
        })
    );
    assert_eq!(attacker_entries(&service), 0);
    assert!(service.get_logs().is_empty());
    assert_eq!(judge.calls.load(Ordering::SeqCst), 1);

    let state = service.get_state(&report.thread_id).await.unwrap();
    let notices: Vec<_> = state
        .messages
        .iter()
        .filter(|m| m.role == MessageRole::ToolResult && m.content.contains("SECURITY WARNING"))
        .collect();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].correlation_id.as_deref(), Some("call_update"));
    assert_eq!(
        service.ledger().account_for(SAMPLE_VENDOR).as_deref(),
        Some(SAMPLE_VENDOR_ACCOUNT)
    );
}

#[tokio::test]
async fn e2e_read_only_role_is_denied_at_the_ledger() {
    let service = service();

    let report = service
        .start_run(SAMPLE_INVOICE, ActorRole::ReadOnly, Variant::Ungoverned)
        .await;

    assert_eq!(report.status, ThreadStatus::Completed);
    assert_eq!(attacker_entries(&service), 0);

    let logs = service.get_logs();
    assert_eq!(logs.len(), 1);
    assert!(!logs[0].is_executed());
    assert!(logs[0].outcome.to_string().starts_with("blocked: permission denied"));
    assert_eq!(
        service.ledger().account_for(SAMPLE_VENDOR).as_deref(),
        Some(SAMPLE_VENDOR_ACCOUNT)
    );
    assert!(service.audit().is_empty());
}

#[tokio::test]
async fn e2e_read_only_never_mutates_under_any_variant() {
    for variant in Variant::ALL {
        let service = service();
        let report = service
            .start_run(SAMPLE_INVOICE, ActorRole::ReadOnly, variant)
            .await;

        // The approval variant suspends first; approving still cannot mutate.
        if report.status == ThreadStatus::SuspendedForApproval {
            service.resume_run(&report.thread_id, true).await.unwrap();
        }

        assert!(
            service.get_logs().iter().all(|e| !e.is_executed()),
            "variant {variant} executed a mutation for READ_ONLY"
        );
        assert_eq!(
            service.ledger().account_for(SAMPLE_VENDOR).as_deref(),
            Some(SAMPLE_VENDOR_ACCOUNT)
        );
    }
}

// ── Approval gate ───────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_approval_suspends_before_any_mutation() {
    let service = service();

    let report = service
        .start_run(SAMPLE_INVOICE, ActorRole::Admin, Variant::ApprovalGated)
        .await;

    assert_eq!(report.status, ThreadStatus::SuspendedForApproval);
    assert_eq!(report.outcome, Some(RunOutcome::AwaitingApproval));
    assert_eq!(
        report.pending_action.as_ref().map(|a| a.kind),
        Some(ActionKind::UpdateAccount)
    );
    assert!(service.get_logs().is_empty());

    let state = service.get_state(&report.thread_id).await.unwrap();
    assert_eq!(state.pending_next_step, Some("await_approval"));
}

#[tokio::test]
async fn e2e_approval_approve_twice_completes_with_mutation() {
    let service = service();
    let report = service
        .start_run(SAMPLE_INVOICE, ActorRole::Admin, Variant::ApprovalGated)
        .await;

    // Approving the account change lets the agent go on to the large
    // transfer, which needs its own approval.
    let report = service.resume_run(&report.thread_id, true).await.unwrap();
    assert_eq!(report.status, ThreadStatus::SuspendedForApproval);
    assert_eq!(
        report.pending_action.as_ref().map(|a| a.kind),
        Some(ActionKind::SendMoney)
    );
    assert_eq!(service.get_logs().len(), 1);

    let report = service.resume_run(&report.thread_id, true).await.unwrap();
    assert_eq!(report.status, ThreadStatus::Completed);
    assert_eq!(report.final_output, "Invoice paid.");

    let logs = service.get_logs();
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().all(|e| e.is_executed()));
}

#[tokio::test]
async fn e2e_approval_reject_fails_without_mutation() {
    let (service, agent) = service_with(KeywordJudge::new());
    let report = service
        .start_run(SAMPLE_INVOICE, ActorRole::Admin, Variant::ApprovalGated)
        .await;
    let calls_before = agent.calls();

    let report = service.resume_run(&report.thread_id, false).await.unwrap();
    assert_eq!(report.status, ThreadStatus::Failed);
    assert_eq!(report.outcome, Some(RunOutcome::Rejected));
    assert!(report.final_output.starts_with("Rejected by operator"));
    assert_eq!(agent.calls(), calls_before);
    assert!(service.get_logs().is_empty());

    // A rejected thread cannot be resumed again.
    assert!(service.resume_run(&report.thread_id, true).await.is_err());
    assert!(service.get_logs().is_empty());
}

#[tokio::test]
async fn e2e_clean_invoice_large_transfer_still_needs_approval() {
    let service = service();
    let invoice = format!("Invoice from {SAMPLE_VENDOR}. Amount due: 150,000 JPY.");

    let report = service
        .start_run(&invoice, ActorRole::Admin, Variant::ApprovalGated)
        .await;
    assert_eq!(report.status, ThreadStatus::SuspendedForApproval);
    assert_eq!(
        report.pending_action.as_ref().map(|a| a.kind),
        Some(ActionKind::SendMoney)
    );
}

// ── Failure modes ───────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_judgment_outage_fails_closed() {
    let (service, _) = service_with(Arc::new(DownJudge));

    let report = service
        .start_run(SAMPLE_INVOICE, ActorRole::Admin, Variant::JudgmentGated)
        .await;

    assert_eq!(report.status, ThreadStatus::Failed);
    assert!(matches!(
        report.outcome,
        Some(RunOutcome::JudgmentUnavailable { ref cause }) if cause.contains("503")
    ));
    assert!(report.final_output.starts_with("Judgment unavailable"));
    assert!(service.get_logs().is_empty());
}

// ── Ledger surface ──────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_audit_is_idempotent_and_reset_clears() {
    let service = service();
    service
        .start_run(SAMPLE_INVOICE, ActorRole::Admin, Variant::Ungoverned)
        .await;

    let first = service.audit();
    let second = service.audit();
    assert!(!first.is_empty());
    assert_eq!(first, second);

    service.reset();
    assert!(service.get_logs().is_empty());
    assert!(service.audit().is_empty());
    assert_eq!(
        service.ledger().account_for(SAMPLE_VENDOR).as_deref(),
        Some(SAMPLE_VENDOR_ACCOUNT)
    );
}

#[tokio::test]
async fn e2e_concurrent_runs_share_one_ledger() {
    let service = Arc::new(service());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let svc = service.clone();
        handles.push(tokio::spawn(async move {
            svc.start_run(SAMPLE_INVOICE, ActorRole::Admin, Variant::Ungoverned)
                .await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().status, ThreadStatus::Completed);
    }

    let logs = service.get_logs();
    assert_eq!(logs.len(), 16);
    for (i, entry) in logs.iter().enumerate() {
        assert_eq!(entry.seq, i as u64);
    }
}

// ── Gateway ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_gateway_poisoned_invoice_round_trip() {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    let service = Arc::new(service());
    let app = taxmate_gateway::build_router(service.clone(), &AppConfig::default().gateway);

    let req = Request::builder()
        .method("POST")
        .uri("/run/vulnerable")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let req = Request::builder().uri("/audit").body(Body::empty()).unwrap();
    let response = app.clone().oneshot(req).await.unwrap();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let audit: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let anomalies = audit["anomalies"].as_array().unwrap();
    assert!(anomalies.iter().any(|a| a["kind"] == "BLACKLIST_HIT" && a["severity"] == "HIGH"));

    let req = Request::builder()
        .method("POST")
        .uri("/reset")
        .body(Body::empty())
        .unwrap();
    assert_eq!(app.clone().oneshot(req).await.unwrap().status(), StatusCode::OK);

    let req = Request::builder().uri("/logs").body(Body::empty()).unwrap();
    let response = app.oneshot(req).await.unwrap();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let logs: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(logs["logs"].as_array().unwrap().len(), 0);
}

#[test]
fn e2e_config_defaults_and_validation() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.agent.max_turns, 25);
    assert_eq!(config.gateway.port, 8000);
    assert_eq!(config.audit.blacklist, vec![ATTACKER_ACCOUNT.to_string()]);

    let parsed: AppConfig = toml::from_str(&AppConfig::default_toml()).unwrap();
    assert!(parsed.validate().is_ok());
}
