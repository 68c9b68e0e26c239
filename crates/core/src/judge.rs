//! Judge trait: the independent judgment function behind the judgment gate.

use crate::action::ProposedAction;
use crate::error::JudgmentError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Everything the judge is shown about one proposed action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgmentRequest {
    /// Instructions describing the decision signals
    pub system_prompt: String,

    /// The originating external text (the invoice)
    pub context_text: String,

    /// The action under judgment
    pub action: ProposedAction,
}

impl JudgmentRequest {
    /// Render the request as a single prompt.
    pub fn render(&self) -> String {
        format!(
            "{}\n\n[Context / Invoice]\n{}\n\n[Proposed Action]\nFunction: {}\nArguments: {}",
            self.system_prompt.trim(),
            self.context_text,
            self.action.kind,
            self.action.arguments_json(),
        )
    }
}

/// The judgment function. Returns free text; the gate looks for `BLOCK`.
#[async_trait]
pub trait Judge: Send + Sync {
    fn name(&self) -> &str;

    async fn judge(&self, request: &JudgmentRequest) -> std::result::Result<String, JudgmentError>;
}
