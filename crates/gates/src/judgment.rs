//! Judgment gate: asks an independent judgment function about each
//! pending action before anything executes.
//!
//! All-or-nothing: the first action judged illegitimate blocks every pending
//! action in the turn. A failing judge is an error, never a silent allow.

use crate::{BlockNotice, Gate, GateContext, GateError, Verdict};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use taxmate_core::{GateKind, Judge, JudgmentError, JudgmentRequest};
use tracing::{debug, warn};

/// Text of the notice appended for every action in a blocked turn.
pub const BLOCK_NOTICE: &str = "[SECURITY WARNING] This operation was judged illegitimate by the \
guardrail model and has been blocked. No money has been transferred.";

/// Whether judgment text carries the reject signal.
///
/// Anything without the literal token `BLOCK` (case-insensitive) is allow.
pub fn is_block_signal(text: &str) -> bool {
    text.trim().to_uppercase().contains("BLOCK")
}

pub struct JudgmentGate {
    judge: Arc<dyn Judge>,
    system_prompt: String,
    timeout: Duration,
}

impl JudgmentGate {
    pub fn new(judge: Arc<dyn Judge>, system_prompt: impl Into<String>, timeout: Duration) -> Self {
        Self {
            judge,
            system_prompt: system_prompt.into(),
            timeout,
        }
    }

    pub fn from_config(judge: Arc<dyn Judge>, config: &taxmate_config::JudgmentConfig) -> Self {
        Self::new(
            judge,
            config.system_prompt.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    async fn ask(&self, request: &JudgmentRequest) -> Result<String, JudgmentError> {
        match tokio::time::timeout(self.timeout, self.judge.judge(request)).await {
            Ok(result) => result,
            Err(_) => Err(JudgmentError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }
}

#[async_trait]
impl Gate for JudgmentGate {
    fn kind(&self) -> GateKind {
        GateKind::Judgment
    }

    async fn check(&self, ctx: &GateContext<'_>) -> Result<Verdict, GateError> {
        for action in ctx.pending {
            let request = JudgmentRequest {
                system_prompt: self.system_prompt.clone(),
                context_text: ctx.context_text.to_string(),
                action: action.clone(),
            };

            let answer = self.ask(&request).await.inspect_err(|e| {
                warn!(
                    thread_id = ctx.thread_id,
                    action = %action.kind,
                    judge = self.judge.name(),
                    error = %e,
                    "Judgment function failed"
                );
            })?;

            debug!(
                thread_id = ctx.thread_id,
                action = %action.kind,
                answer = %answer.trim(),
                "Judgment received"
            );

            if is_block_signal(&answer) {
                warn!(
                    thread_id = ctx.thread_id,
                    action = %action.kind,
                    arguments = %action.arguments_json(),
                    pending = ctx.pending.len(),
                    "Judgment BLOCKED turn"
                );
                let notices = ctx
                    .pending
                    .iter()
                    .map(|a| BlockNotice {
                        correlation_id: a.id.clone(),
                        text: BLOCK_NOTICE.to_string(),
                    })
                    .collect();
                return Ok(Verdict::Block {
                    gate: GateKind::Judgment,
                    notices,
                });
            }
        }

        Ok(Verdict::Pass)
    }
}
