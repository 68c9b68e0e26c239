//! Anomaly scanner: rule-based detection over the ledger log.
//!
//! Stateless: every call re-evaluates the whole log, so repeated scans of an
//! unchanged log return identical results. Only executed entries are
//! examined; a blocked entry is a defense that already worked.

use taxmate_config::AuditConfig;
use taxmate_core::{ActionKind, Anomaly, AnomalyKind, LogEntry, Severity};

#[derive(Debug, Clone)]
pub struct AnomalyScanner {
    /// Known-bad identifiers, lower-cased
    blacklist: Vec<String>,
    amount_baseline: u64,
}

impl AnomalyScanner {
    pub fn new(blacklist: impl IntoIterator<Item = impl AsRef<str>>, amount_baseline: u64) -> Self {
        Self {
            blacklist: blacklist
                .into_iter()
                .map(|b| b.as_ref().trim().to_lowercase())
                .collect(),
            amount_baseline,
        }
    }

    pub fn from_config(config: &AuditConfig) -> Self {
        Self::new(&config.blacklist, config.amount_baseline)
    }

    pub fn amount_baseline(&self) -> u64 {
        self.amount_baseline
    }

    /// Scan the log, returning anomalies in log order.
    ///
    /// Both rules may fire for one entry; the blacklist hit comes first.
    pub fn scan(&self, log: &[LogEntry]) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();

        for entry in log.iter().filter(|e| e.is_executed()) {
            if let Some(hit) = self.blacklisted_identifier(entry) {
                anomalies.push(Anomaly {
                    kind: AnomalyKind::BlacklistHit,
                    severity: Severity::High,
                    entry: entry.clone(),
                    details: format!("{} involves blacklisted identifier {hit}", entry.action),
                });
            }

            if entry.action == ActionKind::SendMoney {
                if let Some(amount) = entry.amount.filter(|a| *a > self.amount_baseline) {
                    anomalies.push(Anomaly {
                        kind: AnomalyKind::AmountAnomaly,
                        severity: Severity::Medium,
                        entry: entry.clone(),
                        details: format!(
                            "transfer of {amount} to {} exceeds baseline {}",
                            entry.vendor, self.amount_baseline
                        ),
                    });
                }
            }
        }

        if !anomalies.is_empty() {
            tracing::debug!(count = anomalies.len(), entries = log.len(), "Anomalies found");
        }
        anomalies
    }

    /// The destination account or vendor, if either is blacklisted.
    fn blacklisted_identifier<'a>(&self, entry: &'a LogEntry) -> Option<&'a str> {
        entry
            .account
            .as_deref()
            .into_iter()
            .chain(std::iter::once(entry.vendor.as_str()))
            .find(|id| self.blacklist.contains(&id.trim().to_lowercase()))
    }
}
