//! Proposed actions: the side effects the agent asks for.
//!
//! An action is only a *proposal* until it has passed the gate chain and
//! reached the ledger. Each one carries a correlation id so the message that
//! eventually answers it (execution result, block notice, rejection) can be
//! matched back to it.

use crate::error::ActionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The side-effecting operations the agent can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Change the bank account on file for a vendor.
    UpdateAccount,
    /// Transfer money to the account on file for a vendor.
    SendMoney,
}

impl ActionKind {
    pub const ALL: [ActionKind; 2] = [ActionKind::UpdateAccount, ActionKind::SendMoney];

    /// The wire name used in tool definitions and log entries.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::UpdateAccount => "update_account",
            ActionKind::SendMoney => "send_money",
        }
    }

    /// The definition advertised to the agent so it knows how to call this action.
    pub fn definition(&self) -> ActionDefinition {
        match self {
            ActionKind::UpdateAccount => ActionDefinition {
                name: self.as_str().into(),
                description: "Update bank account for vendor.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "vendor": { "type": "string", "description": "Vendor name" },
                        "new_account": { "type": "string", "description": "New account identifier" }
                    },
                    "required": ["vendor", "new_account"]
                }),
            },
            ActionKind::SendMoney => ActionDefinition {
                name: self.as_str().into(),
                description: "Send money to vendor.".into(),
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "vendor": { "type": "string", "description": "Vendor name" },
                        "amount": { "type": "integer", "description": "Amount to transfer" }
                    },
                    "required": ["vendor", "amount"]
                }),
            },
        }
    }

    /// Definitions for every action kind.
    pub fn definitions() -> Vec<ActionDefinition> {
        Self::ALL.iter().map(|k| k.definition()).collect()
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "update_account" => Ok(ActionKind::UpdateAccount),
            "send_money" => Ok(ActionKind::SendMoney),
            other => Err(ActionError::UnknownAction(other.to_string())),
        }
    }
}

/// An action definition sent to the agent so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the parameters
    pub parameters: serde_json::Value,
}

/// A single action requested by the agent, not yet committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedAction {
    /// Correlation id (matches the agent's tool call id)
    pub id: String,

    pub kind: ActionKind,

    /// Argument name → value, exactly as the agent produced them
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

impl ProposedAction {
    /// Create an action with a fresh correlation id.
    pub fn new(kind: ActionKind, arguments: serde_json::Value) -> Self {
        Self::with_id(format!("call_{}", Uuid::new_v4().simple()), kind, arguments)
    }

    /// Create an action with an explicit correlation id.
    pub fn with_id(id: impl Into<String>, kind: ActionKind, arguments: serde_json::Value) -> Self {
        let arguments = match arguments {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self {
            id: id.into(),
            kind,
            arguments,
        }
    }

    /// The arguments rendered as a JSON string.
    pub fn arguments_json(&self) -> String {
        serde_json::Value::Object(self.arguments.clone()).to_string()
    }

    pub fn vendor(&self) -> Result<&str, ActionError> {
        self.string_arg("vendor")
    }

    pub fn new_account(&self) -> Result<&str, ActionError> {
        self.string_arg("new_account")
    }

    /// The transfer amount. Accepts integers, integral floats, and numeric
    /// strings with `,` or `_` separators, since models are not consistent.
    pub fn amount(&self) -> Result<u64, ActionError> {
        let value = self
            .arguments
            .get("amount")
            .ok_or_else(|| self.invalid("missing 'amount'"))?;

        match value {
            serde_json::Value::Number(n) => {
                if let Some(v) = n.as_u64() {
                    Ok(v)
                } else if let Some(f) = n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0) {
                    Ok(f as u64)
                } else {
                    Err(self.invalid(&format!("amount {n} is not a non-negative integer")))
                }
            }
            serde_json::Value::String(s) => {
                let cleaned: String = s.chars().filter(|c| *c != ',' && *c != '_').collect();
                cleaned
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| self.invalid(&format!("amount '{s}' is not a number")))
            }
            other => Err(self.invalid(&format!("amount has unsupported type: {other}"))),
        }
    }

    fn string_arg(&self, name: &str) -> Result<&str, ActionError> {
        match self.arguments.get(name).and_then(|v| v.as_str()) {
            Some(s) if !s.trim().is_empty() => Ok(s),
            _ => Err(self.invalid(&format!("missing '{name}'"))),
        }
    }

    fn invalid(&self, reason: &str) -> ActionError {
        ActionError::InvalidArguments {
            action: self.kind.to_string(),
            reason: reason.to_string(),
        }
    }
}
