use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::Result;

/// Default bound on in-memory audit entries; old entries are pruned on
/// overflow rather than allowed to grow without limit across a long-running
/// multi-account pipeline.
const DEFAULT_MAX_ENTRIES: usize = 100_000;

/// What the gate decided about one outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Allowed,
    Blocked,
}

/// One audit trail entry: `{timestamp, service, operation, decision, reason}`
/// per the SafetyGate contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub operation: String,
    pub decision: Decision,
    pub reason: String,
}

impl AuditEntry {
    pub fn new(
        timestamp: DateTime<Utc>,
        service: impl Into<String>,
        operation: impl Into<String>,
        decision: Decision,
        reason: impl Into<String>,
    ) -> Self {
        AuditEntry {
            timestamp,
            service: service.into(),
            operation: operation.into(),
            decision,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditStatistics {
    pub total: usize,
    pub allowed: usize,
    pub blocked: usize,
}

/// Append-only, bounded audit trail. Shared process-wide for a run; mutation
/// is append-only and serialized behind a single `RwLock`.
#[derive(Debug, Clone)]
pub struct AuditLedger {
    entries: Arc<RwLock<VecDeque<AuditEntry>>>,
    max_entries: usize,
}

impl Default for AuditLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLedger {
    pub fn new() -> Self {
        AuditLedger {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }

    pub fn with_capacity(max_entries: usize) -> Self {
        AuditLedger {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            max_entries,
        }
    }

    pub async fn record(&self, entry: AuditEntry) {
        let mut entries = self.entries.write().await;
        if entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn query_by_service(&self, service: &str) -> Vec<AuditEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.service == service)
            .cloned()
            .collect()
    }

    pub async fn query_by_decision(&self, decision: Decision) -> Vec<AuditEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| e.decision == decision)
            .cloned()
            .collect()
    }

    pub async fn all(&self) -> Vec<AuditEntry> {
        self.entries.read().await.iter().cloned().collect()
    }

    pub async fn export_json(&self) -> Result<String> {
        let entries = self.entries.read().await;
        let list: Vec<_> = entries.iter().collect();
        Ok(serde_json::to_string_pretty(&list)?)
    }

    pub async fn get_statistics(&self) -> AuditStatistics {
        let entries = self.entries.read().await;
        let total = entries.len();
        let allowed = entries.iter().filter(|e| e.decision == Decision::Allowed).count();
        let blocked = entries.iter().filter(|e| e.decision == Decision::Blocked).count();
        AuditStatistics {
            total,
            allowed,
            blocked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_and_query_round_trips() {
        let ledger = AuditLedger::new();
        ledger
            .record(AuditEntry::new(
                Utc::now(),
                "EC2",
                "DescribeInstances",
                Decision::Allowed,
                "read_only prefix",
            ))
            .await;
        assert_eq!(ledger.len().await, 1);
        assert_eq!(ledger.query_by_service("EC2").await.len(), 1);
        assert_eq!(ledger.query_by_service("S3").await.len(), 0);
    }

    #[tokio::test]
    async fn statistics_count_by_decision() {
        let ledger = AuditLedger::new();
        ledger
            .record(AuditEntry::new(Utc::now(), "EC2", "DescribeInstances", Decision::Allowed, "ok"))
            .await;
        ledger
            .record(AuditEntry::new(Utc::now(), "EC2", "TerminateInstances", Decision::Blocked, "mutating"))
            .await;
        let stats = ledger.get_statistics().await;
        assert_eq!(stats.total, 2);
        assert_eq!(stats.allowed, 1);
        assert_eq!(stats.blocked, 1);
    }

    #[tokio::test]
    async fn ledger_prunes_oldest_entry_past_capacity() {
        let ledger = AuditLedger::with_capacity(2);
        for i in 0..3 {
            ledger
                .record(AuditEntry::new(
                    Utc::now(),
                    "EC2",
                    format!("DescribeThing{}", i),
                    Decision::Allowed,
                    "ok",
                ))
                .await;
        }
        assert_eq!(ledger.len().await, 2);
        let remaining = ledger.all().await;
        assert_eq!(remaining[0].operation, "DescribeThing1");
    }
}
