use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::RwLock;

use chrono::Utc;

use crate::error::{Error, Result};

use super::audit::{AuditEntry, AuditLedger, AuditStatistics, Decision};
use super::classify::{classify_by_prefix, AllowList, Classification};

/// Classifies every outbound API call before it runs and records the
/// decision. Shared process-wide for a run: `classify`/`guard` only read a
/// short-lived `std::sync::RwLock` over the allow-list map, so they never
/// hold a lock across an `.await`.
#[derive(Debug, Clone)]
pub struct SafetyGate {
    allow_lists: std::sync::Arc<RwLock<HashMap<String, AllowList>>>,
    audit: AuditLedger,
    violations: std::sync::Arc<AtomicU32>,
    violation_threshold: u32,
}

impl SafetyGate {
    /// `violation_threshold` is the count of violations tolerated before
    /// `should_abort` reports true. The default is 0: any violation aborts
    /// the run.
    pub fn new(violation_threshold: u32) -> Self {
        SafetyGate {
            allow_lists: std::sync::Arc::new(RwLock::new(HashMap::new())),
            audit: AuditLedger::new(),
            violations: std::sync::Arc::new(AtomicU32::new(0)),
            violation_threshold,
        }
    }

    /// Register the frozen set of read-only operations a service handler
    /// uses. Called once per handler at registry construction time, ahead of
    /// any discovery or enrichment work.
    pub fn register_allow_list(&self, service: impl Into<String>, allow_list: AllowList) {
        self.allow_lists
            .write()
            .expect("safety gate allow-list lock poisoned")
            .insert(service.into(), allow_list);
    }

    /// Classify `(service, operation)`. Checks the service's registered
    /// allow-list first, then falls back to the prefix rules. Total: every
    /// call returns exactly one of the three classifications.
    pub fn classify(&self, service: &str, operation: &str) -> Classification {
        let allowed = self
            .allow_lists
            .read()
            .expect("safety gate allow-list lock poisoned")
            .get(service)
            .map(|list| list.contains(operation))
            .unwrap_or(false);
        if allowed {
            return Classification::ReadOnly;
        }
        classify_by_prefix(operation)
    }

    /// Wrap an outbound call. Refuses to invoke it unless `classify` returns
    /// `ReadOnly`; every attempt is recorded to the audit ledger regardless
    /// of outcome.
    pub async fn guard<F, Fut, T>(&self, service: &str, operation: &str, call: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.classify(service, operation) {
            Classification::ReadOnly => {
                self.audit
                    .record(AuditEntry::new(
                        Utc::now(),
                        service,
                        operation,
                        Decision::Allowed,
                        "classified read_only",
                    ))
                    .await;
                call().await
            }
            classification => {
                let reason = match classification {
                    Classification::Mutating => "classified mutating",
                    Classification::Unknown => "classified unknown",
                    Classification::ReadOnly => unreachable!(),
                };
                self.audit
                    .record(AuditEntry::new(Utc::now(), service, operation, Decision::Blocked, reason))
                    .await;
                self.violations.fetch_add(1, Ordering::SeqCst);
                Err(Error::safety_violation(service.to_string(), operation.to_string(), reason.to_string()))
            }
        }
    }

    pub fn violation_count(&self) -> u32 {
        self.violations.load(Ordering::SeqCst)
    }

    /// Whether the run as a whole must abort: the violation count has
    /// exceeded the configured threshold.
    pub fn should_abort(&self) -> bool {
        self.violation_count() > self.violation_threshold
    }

    pub async fn export_audit_json(&self) -> Result<String> {
        self.audit.export_json().await
    }

    pub async fn audit_statistics(&self) -> AuditStatistics {
        self.audit.get_statistics().await
    }

    pub async fn audit_len(&self) -> usize {
        self.audit.len().await
    }

    pub fn audit_ledger(&self) -> &AuditLedger {
        &self.audit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_only_call_is_allowed_and_audited() {
        let gate = SafetyGate::new(0);
        let result: Result<u32> = gate
            .guard("EC2", "DescribeInstances", || async { Ok(3) })
            .await;
        assert_eq!(result.unwrap(), 3);
        assert_eq!(gate.audit_len().await, 1);
        assert_eq!(gate.violation_count(), 0);
    }

    #[tokio::test]
    async fn mutating_call_is_refused_and_counted() {
        let gate = SafetyGate::new(0);
        let result: Result<()> = gate
            .guard("EC2", "TerminateInstances", || async { Ok(()) })
            .await;
        assert!(result.is_err());
        assert_eq!(gate.violation_count(), 1);
        assert!(gate.should_abort());
    }

    #[tokio::test]
    async fn threshold_of_one_tolerates_a_single_violation() {
        let gate = SafetyGate::new(1);
        let _: Result<()> = gate.guard("EC2", "TerminateInstances", || async { Ok(()) }).await;
        assert_eq!(gate.violation_count(), 1);
        assert!(!gate.should_abort());
    }

    #[tokio::test]
    async fn allow_list_overrides_prefix_classification() {
        let gate = SafetyGate::new(0);
        gate.register_allow_list("CustomSvc", AllowList::new(["WeirdOpThatIsSafe"]));
        assert_eq!(gate.classify("CustomSvc", "WeirdOpThatIsSafe"), Classification::ReadOnly);
        assert_eq!(gate.classify("CustomSvc", "SomeOtherOp"), Classification::Unknown);
    }
}
