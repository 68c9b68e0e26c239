//! Approval gate: suspends a turn until an external decision when a
//! pending action meets its policy predicate.

use crate::{Gate, GateContext, GateError, Verdict};
use async_trait::async_trait;
use taxmate_config::{ApprovalConfig, ApprovalRequirement};
use taxmate_core::{ActionKind, GateKind, ProposedAction};
use tracing::info;

/// When an action of one kind needs approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalPredicate {
    Always,
    AmountAtLeast { threshold: u64 },
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRule {
    pub action: ActionKind,
    pub predicate: ApprovalPredicate,
}

/// Static policy table: action kind → approval predicate.
///
/// Kinds without a rule never need approval.
#[derive(Debug, Clone, Default)]
pub struct ApprovalPolicy {
    rules: Vec<ApprovalRule>,
}

impl ApprovalPolicy {
    pub fn new(rules: Vec<ApprovalRule>) -> Self {
        Self { rules }
    }

    pub fn from_config(config: &ApprovalConfig) -> Result<Self, GateError> {
        let rules = config
            .rules
            .iter()
            .map(|r| {
                let predicate = match r.require {
                    ApprovalRequirement::Always => ApprovalPredicate::Always,
                    ApprovalRequirement::Never => ApprovalPredicate::Never,
                    ApprovalRequirement::AmountAtLeast => {
                        let threshold = r.threshold.ok_or_else(|| GateError::InvalidPolicy {
                            reason: format!("{} amount_at_least rule has no threshold", r.action),
                        })?;
                        ApprovalPredicate::AmountAtLeast { threshold }
                    }
                };
                Ok(ApprovalRule {
                    action: r.action,
                    predicate,
                })
            })
            .collect::<Result<Vec<_>, GateError>>()?;
        Ok(Self { rules })
    }

    /// The reason `action` needs approval, or `None` if it does not.
    pub fn requires_approval(&self, action: &ProposedAction) -> Option<String> {
        let rule = self.rules.iter().find(|r| r.action == action.kind)?;

        match rule.predicate {
            ApprovalPredicate::Never => None,
            ApprovalPredicate::Always => Some(format!("{} always requires approval", action.kind)),
            ApprovalPredicate::AmountAtLeast { threshold } => match action.amount() {
                Ok(amount) if amount >= threshold => Some(format!(
                    "{} of {amount} meets the approval threshold of {threshold}",
                    action.kind
                )),
                Ok(_) => None,
                // An amount we cannot read is not one we can clear.
                Err(e) => Some(format!("{e}; approval required")),
            },
        }
    }
}

pub struct ApprovalGate {
    policy: ApprovalPolicy,
}

impl ApprovalGate {
    pub fn new(policy: ApprovalPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Gate for ApprovalGate {
    fn kind(&self) -> GateKind {
        GateKind::Approval
    }

    async fn check(&self, ctx: &GateContext<'_>) -> Result<Verdict, GateError> {
        for action in ctx.pending {
            if let Some(reason) = self.policy.requires_approval(action) {
                info!(
                    thread_id = ctx.thread_id,
                    action = %action.kind,
                    arguments = %action.arguments_json(),
                    %reason,
                    "Approval required"
                );
                return Ok(Verdict::Suspend {
                    gate: GateKind::Approval,
                    action: action.clone(),
                    reason,
                });
            }
        }
        Ok(Verdict::Pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_gate() -> ApprovalGate {
        ApprovalGate::new(ApprovalPolicy::from_config(&ApprovalConfig::default()).unwrap())
    }

    fn send(id: &str, amount: serde_json::Value) -> ProposedAction {
        ProposedAction::with_id(
            id,
            ActionKind::SendMoney,
            serde_json::json!({"vendor": "Sakura", "amount": amount}),
        )
    }

    fn update(id: &str) -> ProposedAction {
        ProposedAction::with_id(
            id,
            ActionKind::UpdateAccount,
            serde_json::json!({"vendor": "Sakura", "new_account": "JP-002"}),
        )
    }

    async fn check(gate: &ApprovalGate, actions: &[ProposedAction]) -> Verdict {
        let ctx = GateContext {
            thread_id: "t",
            pending: actions,
            context_text: "Invoice",
        };
        gate.check(&ctx).await.unwrap()
    }

    #[tokio::test]
    async fn small_transfer_passes() {
        let verdict = check(&default_gate(), &[send("c1", serde_json::json!(49_999))]).await;
        assert!(verdict.is_pass());
    }

    #[tokio::test]
    async fn threshold_is_inclusive() {
        let verdict = check(&default_gate(), &[send("c1", serde_json::json!(50_000))]).await;
        match verdict {
            Verdict::Suspend { gate, action, reason } => {
                assert_eq!(gate, GateKind::Approval);
                assert_eq!(action.id, "c1");
                assert!(reason.contains("50000"));
            }
            other => panic!("expected suspend, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_account_always_suspends() {
        let verdict = check(&default_gate(), &[update("c1")]).await;
        assert!(matches!(verdict, Verdict::Suspend { .. }));
    }

    #[tokio::test]
    async fn first_trigger_wins() {
        let actions = [
            send("small", serde_json::json!(10)),
            update("upd"),
            send("big", serde_json::json!(150_000)),
        ];
        match check(&default_gate(), &actions).await {
            Verdict::Suspend { action, .. } => assert_eq!(action.id, "upd"),
            other => panic!("expected suspend, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreadable_amount_requires_approval() {
        let verdict = check(&default_gate(), &[send("c1", serde_json::json!("lots"))]).await;
        assert!(matches!(verdict, Verdict::Suspend { .. }));
    }

    #[tokio::test]
    async fn kinds_without_rule_pass() {
        let gate = ApprovalGate::new(ApprovalPolicy::new(vec![ApprovalRule {
            action: ActionKind::SendMoney,
            predicate: ApprovalPredicate::Never,
        }]));
        let verdict = check(&gate, &[update("c1"), send("c2", serde_json::json!(1_000_000))]).await;
        assert!(verdict.is_pass());
    }

    #[test]
    fn missing_threshold_is_invalid_policy() {
        let mut config = ApprovalConfig::default();
        config.rules[0].threshold = None;
        assert!(matches!(
            ApprovalPolicy::from_config(&config),
            Err(GateError::InvalidPolicy { .. })
        ));
    }
}
