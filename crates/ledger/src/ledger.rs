//! The ledger: authoritative account state and the append-only action log.
//!
//! Every mutating operation checks permission first, then applies its effect,
//! then appends exactly one log entry, all under one lock. Callers get back a
//! human-readable result string; a refused operation is not an error.

use crate::permission::{PermissionCheck, PermissionEnforcer};
use crate::scanner::AnomalyScanner;
use crate::sink::LedgerSink;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use taxmate_core::{ActionKind, Anomaly, ExecutionContext, LogEntry, LogOutcome};
use tracing::info;

#[derive(Debug, Default)]
struct LedgerState {
    accounts: BTreeMap<String, String>,
    log: Vec<LogEntry>,
}

pub struct Ledger {
    state: Mutex<LedgerState>,
    /// Accounts restored by `reset()`
    seed: BTreeMap<String, String>,
    scanner: AnomalyScanner,
    sinks: Vec<Box<dyn LedgerSink>>,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Ledger")
            .field("account_count", &state.accounts.len())
            .field("log_len", &state.log.len())
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

impl Ledger {
    /// Create a ledger starting from `seed` accounts.
    pub fn new(seed: BTreeMap<String, String>, scanner: AnomalyScanner) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                accounts: seed.clone(),
                log: Vec::new(),
            }),
            seed,
            scanner,
            sinks: Vec::new(),
        }
    }

    /// Build a ledger from the `[ledger]` and `[audit]` config sections.
    pub fn from_config(config: &taxmate_config::AppConfig) -> Self {
        Self::new(
            config.ledger.accounts.clone(),
            AnomalyScanner::from_config(&config.audit),
        )
    }

    /// Add a sink that receives every appended entry.
    pub fn with_sink(mut self, sink: Box<dyn LedgerSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Point `vendor` at `new_account`.
    pub fn update_account(&self, vendor: &str, new_account: &str, ctx: &ExecutionContext) -> String {
        let vendor = vendor.trim();
        let new_account = new_account.trim();

        let (entry, result) = {
            let mut state = self.lock();
            match PermissionEnforcer::check(ctx.role, ActionKind::UpdateAccount) {
                PermissionCheck::Denied { reason, .. } => {
                    let entry = Self::append(
                        &mut state,
                        ActionKind::UpdateAccount,
                        ctx,
                        vendor,
                        None,
                        None,
                        LogOutcome::blocked(reason),
                    );
                    (entry, Self::denied_text(ctx, ActionKind::UpdateAccount))
                }
                PermissionCheck::Allowed => {
                    state.accounts.insert(vendor.to_string(), new_account.to_string());
                    let entry = Self::append(
                        &mut state,
                        ActionKind::UpdateAccount,
                        ctx,
                        vendor,
                        None,
                        Some(new_account.to_string()),
                        LogOutcome::Executed,
                    );
                    (entry, format!("Account for {vendor} updated to {new_account}."))
                }
            }
        };

        self.forward(&entry);
        result
    }

    /// Transfer `amount` to the account on file for `vendor`.
    pub fn send_money(&self, vendor: &str, amount: u64, ctx: &ExecutionContext) -> String {
        let vendor = vendor.trim();

        let (entry, result) = {
            let mut state = self.lock();
            match PermissionEnforcer::check(ctx.role, ActionKind::SendMoney) {
                PermissionCheck::Denied { reason, .. } => {
                    let entry = Self::append(
                        &mut state,
                        ActionKind::SendMoney,
                        ctx,
                        vendor,
                        Some(amount),
                        None,
                        LogOutcome::blocked(reason),
                    );
                    (entry, Self::denied_text(ctx, ActionKind::SendMoney))
                }
                PermissionCheck::Allowed => match state.accounts.get(vendor).cloned() {
                    Some(account) => {
                        let entry = Self::append(
                            &mut state,
                            ActionKind::SendMoney,
                            ctx,
                            vendor,
                            Some(amount),
                            Some(account.clone()),
                            LogOutcome::Executed,
                        );
                        (entry, format!("Sent {amount} to {vendor} (account {account})."))
                    }
                    None => {
                        let entry = Self::append(
                            &mut state,
                            ActionKind::SendMoney,
                            ctx,
                            vendor,
                            Some(amount),
                            None,
                            LogOutcome::blocked(format!("no account on file for vendor {vendor}")),
                        );
                        (
                            entry,
                            format!("Transfer failed: no account on file for vendor {vendor}."),
                        )
                    }
                },
            }
        };

        self.forward(&entry);
        result
    }

    fn append(
        state: &mut LedgerState,
        action: ActionKind,
        ctx: &ExecutionContext,
        vendor: &str,
        amount: Option<u64>,
        account: Option<String>,
        outcome: LogOutcome,
    ) -> LogEntry {
        let entry = LogEntry {
            seq: state.log.len() as u64,
            timestamp: Utc::now(),
            action,
            role: ctx.role,
            vendor: vendor.to_string(),
            amount,
            account,
            outcome,
        };
        state.log.push(entry.clone());
        entry
    }

    fn denied_text(ctx: &ExecutionContext, action: ActionKind) -> String {
        format!(
            "Permission Denied: role {} is not allowed to perform {action}.",
            ctx.role
        )
    }

    fn forward(&self, entry: &LogEntry) {
        for sink in &self.sinks {
            sink.record(entry);
        }
    }

    /// Clear the log and restore the seed accounts.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.log.clear();
        state.accounts = self.seed.clone();
        info!(accounts = state.accounts.len(), "Ledger reset");
    }

    /// The log, verbatim and in append order.
    pub fn get_logs(&self) -> Vec<LogEntry> {
        self.lock().log.clone()
    }

    /// Run the anomaly scanner over a snapshot of the log.
    pub fn audit_logs(&self) -> Vec<Anomaly> {
        let log = self.get_logs();
        self.scanner.scan(&log)
    }

    pub fn account_for(&self, vendor: &str) -> Option<String> {
        self.lock().accounts.get(vendor.trim()).cloned()
    }
}
