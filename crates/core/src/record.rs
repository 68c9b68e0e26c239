//! Ledger log records and the anomalies computed over them.

use crate::action::ActionKind;
use crate::context::ActorRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// One entry in the ledger's append-only action log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Position in the log (0-based), stable until the next reset
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub action: ActionKind,
    pub role: ActorRole,
    pub vendor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    /// The destination account after the operation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    pub outcome: LogOutcome,
}

impl LogEntry {
    pub fn is_executed(&self) -> bool {
        matches!(self.outcome, LogOutcome::Executed)
    }
}

/// What happened to a ledger operation.
///
/// Serialized as the plain strings `executed` and `blocked: <reason>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutcome {
    Executed,
    Blocked { reason: String },
}

impl LogOutcome {
    pub fn blocked(reason: impl Into<String>) -> Self {
        LogOutcome::Blocked {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for LogOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogOutcome::Executed => f.write_str("executed"),
            LogOutcome::Blocked { reason } => write!(f, "blocked: {reason}"),
        }
    }
}

impl Serialize for LogOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LogOutcome {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw == "executed" {
            return Ok(LogOutcome::Executed);
        }
        match raw.strip_prefix("blocked:") {
            Some(reason) => Ok(LogOutcome::blocked(reason.trim())),
            None => Err(serde::de::Error::custom(format!(
                "unknown log outcome '{raw}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyKind {
    BlacklistHit,
    AmountAnomaly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Medium,
    High,
}

/// A rule hit over one executed log entry. Recomputed on every audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub severity: Severity,
    /// The offending entry, as it stood when scanned
    pub entry: LogEntry,
    pub details: String,
}
