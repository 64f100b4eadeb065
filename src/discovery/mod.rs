//! Two-tier (primary + fallback) multi-region resource discovery.

pub mod fallback;
pub mod handler;
pub mod handlers;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info_span, Instrument};

use crate::account::AccountContext;
use crate::config::FallbackDisplay;
use crate::error::Error;
use crate::model::Resource;
use crate::safety::SafetyGate;

pub use handler::{DiscoveryHandler, HandlerRegistry};

/// Result of one account's discovery pass: the merged, ordered resource
/// list plus bookkeeping needed by the report and by the fallback-display
/// policy.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryReport {
    pub resources: Vec<Resource>,
    /// `service -> did the primary tier produce at least one resource`.
    pub primary_available: BTreeMap<String, bool>,
    pub region_errors: Vec<(String, String)>,
    pub service_errors: Vec<(String, String, String)>,
}

pub struct DiscoveryOrchestrator {
    registry: HandlerRegistry,
    service_concurrency: usize,
    operation_timeout: Duration,
}

type HandlerOutcome = (String, String, Result<Vec<Resource>, Error>);

impl DiscoveryOrchestrator {
    pub fn new(registry: HandlerRegistry, service_concurrency: usize, operation_timeout: Duration) -> Self {
        DiscoveryOrchestrator {
            registry,
            service_concurrency,
            operation_timeout,
        }
    }

    pub async fn discover(
        &self,
        ctx: &AccountContext,
        gate: &SafetyGate,
        fallback_display: FallbackDisplay,
    ) -> DiscoveryReport {
        let span = info_span!("discovering", account_id = %ctx.account_id);
        async {
            let mut report = DiscoveryReport::default();
            let mut primary_resources = Vec::new();
            let mut seen_services: BTreeSet<String> = BTreeSet::new();

            let semaphore = Arc::new(Semaphore::new(self.service_concurrency));
            let mut tasks: JoinSet<HandlerOutcome> = JoinSet::new();

            for handler in self.registry.global_handlers() {
                self.spawn_handler(&mut tasks, Arc::clone(&semaphore), Arc::clone(handler), ctx, gate, "global");
            }
            for region in &ctx.regions {
                for handler in self.registry.regional_handlers() {
                    self.spawn_handler(&mut tasks, Arc::clone(&semaphore), Arc::clone(handler), ctx, gate, region);
                }
            }

            while let Some(joined) = tasks.join_next().await {
                let (service, region, outcome) = match joined {
                    Ok(result) => result,
                    Err(_) => continue,
                };
                seen_services.insert(service.clone());
                match outcome {
                    Ok(found) => primary_resources.extend(found),
                    Err(e) => report.service_errors.push((service, region, e.to_string())),
                }
            }

            for service in &seen_services {
                let has_any = primary_resources.iter().any(|r| &r.service == service);
                report.primary_available.insert(service.clone(), has_any);
            }

            let mut fallback_resources = Vec::new();
            for region in &ctx.regions {
                match fallback::discover_fallback(ctx.client(), gate, &ctx.account_id, region).await {
                    Ok(found) => fallback_resources.extend(found),
                    Err(e) => report.region_errors.push((region.clone(), e.to_string())),
                }
            }

            let merged = merge(primary_resources, fallback_resources, &report.primary_available, fallback_display);
            let mut resources = merged;
            resources.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
            report.resources = resources;
            report
        }
        .instrument(span)
        .await
    }

    fn spawn_handler(
        &self,
        tasks: &mut JoinSet<HandlerOutcome>,
        semaphore: Arc<Semaphore>,
        handler: Arc<dyn DiscoveryHandler>,
        ctx: &AccountContext,
        gate: &SafetyGate,
        region: &str,
    ) {
        let client = ctx.client();
        let account_id = ctx.account_id.clone();
        let region = region.to_string();
        let timeout = self.operation_timeout;
        let gate = gate.clone();
        let service = handler.service().to_string();

        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let op_name = format!("Discover{}", service);
            let outcome = tokio::time::timeout(
                timeout,
                handler.discover(client, &gate, &account_id, &region),
            )
            .await
            .unwrap_or_else(|_| Err(Error::timeout(op_name, timeout.as_millis() as u64)));
            (service, region, outcome)
        });
    }
}

/// Merge primary and fallback discoveries by dedup key, then apply the
/// fallback-display policy.
pub fn merge(
    primary: Vec<Resource>,
    fallback: Vec<Resource>,
    primary_available: &BTreeMap<String, bool>,
    fallback_display: FallbackDisplay,
) -> Vec<Resource> {
    let mut by_key: BTreeMap<String, Resource> = BTreeMap::new();
    for resource in primary {
        by_key.insert(resource.dedup_key(), resource);
    }

    let mut fallback_only = Vec::new();
    for candidate in fallback {
        let key = candidate.dedup_key();
        if let Some(existing) = by_key.get_mut(&key) {
            existing.merge_fallback(&candidate);
        } else {
            fallback_only.push(candidate);
        }
    }

    let keep_fallback_only = |r: &Resource| -> bool {
        match fallback_display {
            FallbackDisplay::Always => true,
            FallbackDisplay::Never => false,
            FallbackDisplay::Auto => !primary_available.get(&r.service).copied().unwrap_or(false),
        }
    };

    let mut resources: Vec<Resource> = by_key.into_values().collect();
    resources.extend(fallback_only.into_iter().filter(keep_fallback_only));
    resources
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DiscoveredVia, Priority, Tristate};
    use std::collections::BTreeMap as Map;

    fn resource(service: &str, arn: &str, priority: Priority) -> Resource {
        Resource {
            arn: Some(arn.to_string()),
            id: arn.to_string(),
            service: service.to_string(),
            r#type: "Thing".to_string(),
            region: "us-east-1".to_string(),
            account_id: "123456789012".to_string(),
            name: None,
            tags: Map::new(),
            created_at: None,
            state: None,
            discovered_via: DiscoveredVia::service_api("Describe"),
            priority,
            service_attributes: Map::new(),
            vpc_id: None,
            subnet_ids: vec![],
            security_group_ids: vec![],
            public_access: false,
            encrypted: Tristate::Unknown,
            confidence: 0.0,
            enrichment_errors: vec![],
            compliance_status: None,
            missing_required_tags: Default::default(),
            invalid_tag_values: Map::new(),
        }
    }

    #[test]
    fn auto_display_suppresses_fallback_when_primary_found_the_service() {
        let primary = vec![resource("EC2", "arn:a", Priority::Primary)];
        let fallback = vec![resource("ROBOMAKER", "arn:b", Priority::Fallback)];
        let mut available = BTreeMap::new();
        available.insert("EC2".to_string(), true);

        let merged = merge(primary, fallback, &available, FallbackDisplay::Auto);
        assert_eq!(merged.len(), 2);
        assert!(merged.iter().any(|r| r.service == "ROBOMAKER"));
    }

    #[test]
    fn never_display_drops_fallback_only_resources() {
        let primary = vec![resource("EC2", "arn:a", Priority::Primary)];
        let fallback = vec![resource("ROBOMAKER", "arn:b", Priority::Fallback)];
        let available = BTreeMap::new();

        let merged = merge(primary, fallback, &available, FallbackDisplay::Never);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].service, "EC2");
    }

    #[test]
    fn merge_is_idempotent() {
        let primary = vec![resource("EC2", "arn:a", Priority::Primary)];
        let fallback = vec![resource("EC2", "arn:a", Priority::Fallback)];
        let available = BTreeMap::new();

        let once = merge(primary.clone(), fallback.clone(), &available, FallbackDisplay::Always);
        let twice = merge(once.clone(), fallback, &available, FallbackDisplay::Always);
        assert_eq!(once.len(), twice.len());
        assert_eq!(once[0].arn, twice[0].arn);
    }
}
