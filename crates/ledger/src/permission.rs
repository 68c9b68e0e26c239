//! Permission enforcement at the point of effect.
//!
//! The role comes from the run's execution context, never from agent output.
//! The ledger consults this before every mutation, regardless of which gates
//! ran upstream.

use taxmate_core::{ActionKind, ActorRole};

/// Result of checking a role against a mutating action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionCheck {
    Allowed,
    Denied { role: ActorRole, reason: String },
}

impl PermissionCheck {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PermissionCheck::Allowed)
    }
}

/// Role-based guard for ledger mutations.
pub struct PermissionEnforcer;

impl PermissionEnforcer {
    /// Check whether `role` may perform `action`.
    ///
    /// Rules:
    /// - `ADMIN` may perform every mutation
    /// - `READ_ONLY` may perform none
    pub fn check(role: ActorRole, action: ActionKind) -> PermissionCheck {
        match role {
            ActorRole::Admin => PermissionCheck::Allowed,
            ActorRole::ReadOnly => {
                tracing::debug!(%role, %action, "Permission denied");
                PermissionCheck::Denied {
                    role,
                    reason: format!("permission denied for role {role}"),
                }
            }
        }
    }
}
