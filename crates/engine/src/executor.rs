//! Action executor: applies a proposed action to the ledger.

use std::sync::Arc;
use taxmate_core::{ActionError, ActionKind, ExecutionContext, ProposedAction};
use taxmate_ledger::Ledger;
use tracing::warn;

pub struct ActionExecutor {
    ledger: Arc<Ledger>,
}

impl ActionExecutor {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Execute `action` with the run's role and return the result text for
    /// the agent.
    ///
    /// Arguments that cannot be read never reach the ledger; the agent is
    /// told what was wrong so it can retry.
    pub fn execute(&self, action: &ProposedAction, ctx: &ExecutionContext) -> String {
        match self.dispatch(action, ctx) {
            Ok(result) => result,
            Err(e) => {
                warn!(action = %action.kind, error = %e, "Action arguments rejected");
                format!("Error: {e}")
            }
        }
    }

    fn dispatch(&self, action: &ProposedAction, ctx: &ExecutionContext) -> Result<String, ActionError> {
        match action.kind {
            ActionKind::UpdateAccount => {
                let vendor = action.vendor()?;
                let new_account = action.new_account()?;
                Ok(self.ledger.update_account(vendor, new_account, ctx))
            }
            ActionKind::SendMoney => {
                let vendor = action.vendor()?;
                let amount = action.amount()?;
                Ok(self.ledger.send_money(vendor, amount, ctx))
            }
        }
    }
}
