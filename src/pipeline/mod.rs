//! Runs the full per-account sequence: resolve identity, discover, enrich,
//! analyze network and security in parallel, evaluate compliance, snapshot,
//! and diff against the previous snapshot.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{error, info, info_span, warn, Instrument};

use crate::account::AccountContext;
use crate::aws_client::AwsClient;
use crate::compliance::{ComplianceEngine, ComplianceSummary};
use crate::config::{AccountDescriptor, RunConfig, TagPolicy};
use crate::delta::DeltaDetector;
use crate::discovery::DiscoveryOrchestrator;
use crate::enrichment::ServiceEnricher;
use crate::error::{Error, Result};
use crate::model::{Delta, Resource};
use crate::network::{NetworkAnalyzer, NetworkSummary};
use crate::safety::{AuditEntry, SafetyGate};
use crate::security_analysis::{SecurityAnalyzer, SecurityReport};
use crate::state::StateStore;

/// Where a single account's run stopped. `Partial` means the account
/// deadline expired after at least discovery produced some resources;
/// everything collected up to that point is still reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Done,
    Failed,
    Partial,
}

/// Wall-clock time spent in each stage of one account's run, in
/// milliseconds. `enrichment_ms` is bounded by the account deadline even
/// when an individual resource's enrichment call hits its own operation
/// timeout (§8 scenario 6).
#[derive(Debug, Clone, Copy, Default)]
pub struct StageDurations {
    pub discovery_ms: u64,
    pub enrichment_ms: u64,
    pub analysis_ms: u64,
    pub compliance_ms: u64,
    pub comparing_ms: u64,
}

#[derive(Debug, Clone)]
pub struct AccountReport {
    pub account_id: String,
    pub state: RunState,
    pub resources: Vec<Resource>,
    pub network: Option<NetworkSummary>,
    pub security: Option<SecurityReport>,
    pub compliance: Option<ComplianceSummary>,
    pub delta: Option<Delta>,
    pub snapshot_id: Option<String>,
    pub errors: Vec<String>,
    pub durations: StageDurations,
}

/// Run-wide counts surfaced alongside the per-account reports: how many
/// accounts landed in each terminal state, how many resources were
/// produced in total, and the cumulative wall-clock time for the whole
/// multi-account run.
#[derive(Debug, Clone, Default)]
pub struct RunMetadata {
    pub total_duration_ms: u64,
    pub accounts_done: usize,
    pub accounts_failed: usize,
    pub accounts_partial: usize,
    pub total_resources: usize,
    pub safety_violations: u32,
}

/// The crate's top-level output: every account's report, the run-wide
/// safety-gate audit trail, and aggregate run metadata. This is the typed
/// object external renderers (document/CLI/upload tooling, out of scope
/// here) consume.
#[derive(Debug, Clone)]
pub struct Report {
    pub accounts: Vec<AccountReport>,
    pub audit_log: Vec<AuditEntry>,
    pub metadata: RunMetadata,
}

pub struct PipelineRunner {
    client: Arc<dyn AwsClient>,
    gate: SafetyGate,
    orchestrator: Arc<DiscoveryOrchestrator>,
    enricher: Arc<ServiceEnricher>,
    state: Option<Arc<StateStore>>,
    config: RunConfig,
}

impl PipelineRunner {
    pub fn new(
        client: Arc<dyn AwsClient>,
        gate: SafetyGate,
        orchestrator: DiscoveryOrchestrator,
        enricher: ServiceEnricher,
        state: Option<StateStore>,
        config: RunConfig,
    ) -> Self {
        PipelineRunner {
            client,
            gate,
            orchestrator: Arc::new(orchestrator),
            enricher: Arc::new(enricher),
            state: state.map(Arc::new),
            config,
        }
    }

    /// Run the full pipeline for every account with a bounded-concurrency
    /// semaphore, each wrapped in its own deadline. Each account's full
    /// sequence runs inside its spawned task so the semaphore permit is held
    /// for the account's entire lifetime, not just until the task starts.
    pub async fn run(self: &Arc<Self>, accounts: &[AccountDescriptor], policy: &TagPolicy) -> Report {
        let run_started = Instant::now();
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.config.max_concurrent_accounts));
        let mut tasks = tokio::task::JoinSet::new();

        for descriptor in accounts.iter().cloned() {
            let permit = Arc::clone(&semaphore);
            let runner = Arc::clone(self);
            let deadline = Duration::from_secs(self.config.account_deadline_secs);
            let policy = policy.clone();

            tasks.spawn(async move {
                let _permit = permit.acquire_owned().await;
                let client = runner.client.clone();
                let gate = runner.gate.clone();
                tokio::time::timeout(deadline, runner.run_account(&descriptor, client, &gate, &policy))
                    .await
                    .unwrap_or_else(|_| AccountReport {
                        account_id: descriptor.account_id.clone().unwrap_or_default(),
                        state: RunState::Partial,
                        resources: Vec::new(),
                        network: None,
                        security: None,
                        compliance: None,
                        delta: None,
                        snapshot_id: None,
                        errors: vec!["account deadline exceeded".to_string()],
                        durations: StageDurations::default(),
                    })
            });
        }

        let mut accounts_report = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            if let Ok(report) = joined {
                accounts_report.push(report);
            }
        }

        let metadata = RunMetadata {
            total_duration_ms: run_started.elapsed().as_millis() as u64,
            accounts_done: accounts_report.iter().filter(|r| r.state == RunState::Done).count(),
            accounts_failed: accounts_report.iter().filter(|r| r.state == RunState::Failed).count(),
            accounts_partial: accounts_report.iter().filter(|r| r.state == RunState::Partial).count(),
            total_resources: accounts_report.iter().map(|r| r.resources.len()).sum(),
            safety_violations: self.gate.violation_count(),
        };

        Report {
            accounts: accounts_report,
            audit_log: self.gate.audit_ledger().all().await,
            metadata,
        }
    }

    async fn run_account(&self, descriptor: &AccountDescriptor, client: Arc<dyn AwsClient>, gate: &SafetyGate, policy: &TagPolicy) -> AccountReport {
        let mut errors = Vec::new();
        let mut durations = StageDurations::default();

        let ctx = match AccountContext::resolve(descriptor, client, gate).await {
            Ok(ctx) => ctx,
            Err(e) => {
                error!(error = %e, "failed to resolve account context");
                return AccountReport {
                    account_id: descriptor.account_id.clone().unwrap_or_default(),
                    state: RunState::Failed,
                    resources: Vec::new(),
                    network: None,
                    security: None,
                    compliance: None,
                    delta: None,
                    snapshot_id: None,
                    errors: vec![e.to_string()],
                    durations,
                };
            }
        };

        let discovery_started = Instant::now();
        let discovery_report = self
            .orchestrator
            .discover(&ctx, gate, self.config.fallback_display)
            .await;
        durations.discovery_ms = discovery_started.elapsed().as_millis() as u64;
        errors.extend(discovery_report.region_errors.iter().map(|(r, e)| format!("region {}: {}", r, e)));
        errors.extend(discovery_report.service_errors.iter().map(|(s, r, e)| format!("{}/{}: {}", s, r, e)));

        let mut resources = discovery_report.resources;

        let operation_timeout = Duration::from_secs(self.config.operation_timeout_secs);
        let enrich_span = info_span!("enriching", account_id = %ctx.account_id);
        let enrichment_started = Instant::now();
        self.enricher
            .enrich_all(ctx.client(), gate, &mut resources, operation_timeout)
            .instrument(enrich_span)
            .await;
        durations.enrichment_ms = enrichment_started.elapsed().as_millis() as u64;

        let analyze_span = info_span!("analyzing", account_id = %ctx.account_id);
        let analysis_started = Instant::now();
        let (network, security) = async {
            let network_resources = resources.clone();
            let security_resources = resources.clone();
            tokio::join!(
                async move { NetworkAnalyzer::analyze(&network_resources) },
                async move { SecurityAnalyzer::analyze(&security_resources) }
            )
        }
        .instrument(analyze_span)
        .await;
        durations.analysis_ms = analysis_started.elapsed().as_millis() as u64;

        let compliance_started = Instant::now();
        let compliance = {
            let engine = ComplianceEngine::new(policy);
            engine.evaluate_all(&mut resources)
        };
        durations.compliance_ms = compliance_started.elapsed().as_millis() as u64;

        let mut snapshot_id = None;
        let mut delta = None;

        if let Some(store) = &self.state {
            if self.config.enable_state {
                let compare_span = info_span!("comparing", account_id = %ctx.account_id);
                let comparing_started = Instant::now();
                async {
                    let now = Utc::now();
                    if self.config.enable_delta {
                        match store.latest_before(&ctx.account_id, now).await {
                            Ok(Some(previous)) => {
                                delta = Some(DeltaDetector::compute(&previous.resources, &resources));
                            }
                            Ok(None) => {}
                            Err(e) => {
                                warn!(error = %e, "failed to load previous snapshot for delta");
                                errors.push(e.to_string());
                            }
                        }
                    }

                    match store.write_snapshot(&ctx.account_id, ctx.regions.clone(), resources.clone(), now).await {
                        Ok(snapshot) => snapshot_id = Some(snapshot.snapshot_id),
                        Err(e) => {
                            warn!(error = %e, "failed to write snapshot");
                            errors.push(e.to_string());
                        }
                    }
                }
                .instrument(compare_span)
                .await;
                durations.comparing_ms = comparing_started.elapsed().as_millis() as u64;
            }
        }

        info!(account_id = %ctx.account_id, resource_count = resources.len(), "account run complete");

        AccountReport {
            account_id: ctx.account_id,
            state: RunState::Done,
            resources,
            network: Some(network),
            security: Some(security),
            compliance: Some(compliance),
            delta,
            snapshot_id,
            errors,
            durations,
        }
    }
}

/// Convenience for callers that only need to safety-gate one account
/// without instantiating the full runner (e.g. tests, ad-hoc scripts).
pub async fn resolve_and_discover(
    descriptor: &AccountDescriptor,
    client: Arc<dyn AwsClient>,
    gate: &SafetyGate,
    orchestrator: &DiscoveryOrchestrator,
) -> Result<(AccountContext, Vec<Resource>)> {
    let ctx = AccountContext::resolve(descriptor, client, gate).await?;
    let report = orchestrator.discover(&ctx, gate, crate::config::FallbackDisplay::Auto).await;
    if report.resources.is_empty() && !report.region_errors.is_empty() {
        return Err(Error::service(report.region_errors[0].1.clone()));
    }
    Ok((ctx, report.resources))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws_client::MockAwsClient;
    use crate::config::CredentialSource;
    use crate::discovery::HandlerRegistry;
    use std::collections::HashMap;

    fn descriptor() -> AccountDescriptor {
        AccountDescriptor {
            account_id: None,
            credential_source: CredentialSource::Profile { name: "default".to_string() },
            region_filter: vec!["us-east-1".to_string()],
            service_filter: vec![],
            tag_filter: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn empty_account_produces_done_report_with_no_resources() {
        let client: Arc<dyn AwsClient> = Arc::new(MockAwsClient::new("123456789012").with_regions(vec!["us-east-1".to_string()]));
        let gate = SafetyGate::new(0);
        let registry = HandlerRegistry::default();
        let orchestrator = DiscoveryOrchestrator::new(registry, 4, Duration::from_secs(5));
        let enricher = ServiceEnricher::new();
        let config = RunConfig::default();
        let policy = TagPolicy::default();

        let runner = Arc::new(PipelineRunner::new(Arc::clone(&client), gate, orchestrator, enricher, None, config));
        let report = runner.run(&[descriptor()], &policy).await;

        assert_eq!(report.accounts.len(), 1);
        assert_eq!(report.accounts[0].state, RunState::Done);
        assert!(report.accounts[0].resources.is_empty());
        assert_eq!(report.accounts[0].compliance.as_ref().unwrap().total, 0);
        assert_eq!(report.metadata.accounts_done, 1);
        assert_eq!(report.metadata.safety_violations, 0);
    }
}
