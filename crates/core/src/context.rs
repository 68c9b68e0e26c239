//! Execution context: data the pipeline carries that the agent never sees.
//!
//! The role travels as an explicit value from the boundary down into every
//! mutating ledger call. It is never read from, or written by, agent output.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The privilege level a run executes with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorRole {
    /// May mutate accounts and move money.
    #[default]
    Admin,
    /// May only read; every mutation is refused at the ledger.
    ReadOnly,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Admin => "ADMIN",
            ActorRole::ReadOnly => "READ_ONLY",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "ADMIN" => Ok(ActorRole::Admin),
            "READ_ONLY" | "READONLY" => Ok(ActorRole::ReadOnly),
            other => Err(format!("unknown role '{other}' (expected ADMIN or READ_ONLY)")),
        }
    }
}

/// Per-run context passed down the call chain into the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub role: ActorRole,
}

impl ExecutionContext {
    pub fn new(role: ActorRole) -> Self {
        Self { role }
    }
}
