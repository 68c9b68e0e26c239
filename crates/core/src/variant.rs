//! Pipeline variants and gate descriptors.
//!
//! A variant names a pipeline; which gates it runs is configuration (an
//! ordered list of [`GateKind`] descriptors), not code.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variant {
    /// No gates: only the ledger's permission check stands between the
    /// agent and the side effect.
    #[serde(rename = "ungoverned", alias = "vulnerable")]
    Ungoverned,
    /// Judgment gate before execution.
    #[serde(rename = "judgment", alias = "secure", alias = "guarded")]
    JudgmentGated,
    /// Approval gate before execution.
    #[serde(rename = "approval", alias = "hitl")]
    ApprovalGated,
}

impl Variant {
    pub const ALL: [Variant; 3] = [
        Variant::Ungoverned,
        Variant::JudgmentGated,
        Variant::ApprovalGated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Variant::Ungoverned => "ungoverned",
            Variant::JudgmentGated => "judgment",
            Variant::ApprovalGated => "approval",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ungoverned" | "vulnerable" => Ok(Variant::Ungoverned),
            "judgment" | "secure" | "guarded" => Ok(Variant::JudgmentGated),
            "approval" | "hitl" => Ok(Variant::ApprovalGated),
            other => Err(format!(
                "unknown variant '{other}' (expected ungoverned, judgment, or approval)"
            )),
        }
    }
}

/// A gate descriptor in a variant's chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    Judgment,
    Approval,
}

impl GateKind {
    /// Position in the fixed evaluation order. Lower runs first.
    pub fn rank(&self) -> u8 {
        match self {
            GateKind::Judgment => 0,
            GateKind::Approval => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GateKind::Judgment => "judgment",
            GateKind::Approval => "approval",
        }
    }
}
