//! Attaches service-specific attributes to discovered resources.

pub mod dynamic;
pub mod handlers;
pub mod specific;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info_span, warn, Instrument};

use crate::aws_client::AwsClient;
use crate::model::Resource;
use crate::safety::SafetyGate;

pub use dynamic::DynamicHandler;
pub use specific::SpecificHandler;

/// Registry of `SpecificHandler`s, falling through to a shared
/// `DynamicHandler` for any service/type no registered handler claims.
pub struct ServiceEnricher {
    handlers: Vec<Arc<dyn SpecificHandler>>,
    dynamic: DynamicHandler,
}

impl ServiceEnricher {
    pub fn new() -> Self {
        ServiceEnricher {
            handlers: Vec::new(),
            dynamic: DynamicHandler::new(),
        }
    }

    pub fn register(&mut self, handler: Arc<dyn SpecificHandler>, gate: &SafetyGate) {
        for service in handler.service_keys() {
            gate.register_allow_list(service, crate::safety::AllowList::new(handler.read_only_ops()));
        }
        self.handlers.push(handler);
    }

    /// Build an enricher with every specific handler the crate ships,
    /// registered against `gate`'s allow-list. Services with no dedicated
    /// handler still get attributes via the `DynamicHandler` fallback.
    pub fn with_defaults(gate: &SafetyGate) -> Self {
        let mut enricher = Self::new();
        enricher.register(Arc::new(handlers::Ec2EnrichmentHandler), gate);
        enricher.register(Arc::new(handlers::S3EnrichmentHandler), gate);
        enricher.register(Arc::new(handlers::RdsEnrichmentHandler), gate);
        enricher.register(Arc::new(handlers::LambdaEnrichmentHandler), gate);
        enricher.register(Arc::new(handlers::IamEnrichmentHandler), gate);
        enricher.register(Arc::new(handlers::EcsEksEnrichmentHandler), gate);
        enricher
    }

    fn handler_for(&self, service: &str, resource_type: &str) -> Option<&Arc<dyn SpecificHandler>> {
        self.handlers.iter().find(|h| h.handles(service, resource_type))
    }

    /// Enrich every resource in place. Failures are recorded on the
    /// resource's `enrichment_errors` and never abort the batch; partial
    /// `service_attributes` are preferred over none. Each resource's
    /// enrichment call is individually bounded by `operation_timeout`, so one
    /// slow handler can only cost that resource, never the rest of the
    /// batch.
    pub async fn enrich_all(
        &self,
        client: Arc<dyn AwsClient>,
        gate: &SafetyGate,
        resources: &mut [Resource],
        operation_timeout: Duration,
    ) {
        let span = info_span!("enriching", resource_count = resources.len());
        async {
            for resource in resources.iter_mut() {
                let outcome = tokio::time::timeout(operation_timeout, async {
                    match self.handler_for(&resource.service, &resource.r#type) {
                        Some(handler) => handler.enrich(Arc::clone(&client), gate, resource).await,
                        None => self.dynamic.enrich(Arc::clone(&client), gate, resource).await,
                    }
                })
                .await
                .unwrap_or_else(|_| Err(crate::error::Error::timeout("enrich", operation_timeout.as_millis() as u64)));
                if let Err(e) = outcome {
                    warn!(resource = %resource.dedup_key(), error = %e, "enrichment failed");
                    resource.enrichment_errors.push(e.to_string());
                }
                resource.compute_confidence();
            }
        }
        .instrument(span)
        .await
    }
}

impl Default for ServiceEnricher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws_client::MockAwsClient;
    use crate::model::{DiscoveredVia, Priority, Tristate};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn bucket() -> Resource {
        Resource {
            arn: Some("arn:aws:s3:::my-bucket".to_string()),
            id: "my-bucket".to_string(),
            service: "S3".to_string(),
            r#type: "Bucket".to_string(),
            region: "us-east-1".to_string(),
            account_id: "123456789012".to_string(),
            name: Some("my-bucket".to_string()),
            tags: BTreeMap::new(),
            created_at: None,
            state: None,
            discovered_via: DiscoveredVia::service_api("ListBuckets"),
            priority: Priority::Primary,
            service_attributes: BTreeMap::new(),
            vpc_id: None,
            subnet_ids: vec![],
            security_group_ids: vec![],
            public_access: false,
            encrypted: Tristate::Unknown,
            confidence: 0.0,
            enrichment_errors: vec![],
            compliance_status: None,
            missing_required_tags: Default::default(),
            invalid_tag_values: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn registered_handler_is_preferred_over_dynamic() {
        let client = Arc::new(MockAwsClient::new("123456789012"));
        client
            .set_response("S3", "GetBucketVersioning", json!({"Status": "Enabled"}))
            .await;
        let gate = SafetyGate::new(0);
        let mut enricher = ServiceEnricher::new();
        enricher.register(Arc::new(handlers::S3EnrichmentHandler), &gate);

        let mut resources = vec![bucket()];
        enricher.enrich_all(client, &gate, &mut resources, Duration::from_secs(5)).await;

        assert!(resources[0].service_attributes.contains_key("versioning_status"));
        assert!(resources[0].confidence > 0.0);
    }

    #[tokio::test]
    async fn unregistered_service_falls_back_to_dynamic_and_records_errors_without_failing() {
        let client = Arc::new(MockAwsClient::new("123456789012"));
        let gate = SafetyGate::new(0);
        let enricher = ServiceEnricher::new();
        let mut resources = vec![Resource {
            service: "ROBOMAKER".to_string(),
            r#type: "RobotApplication".to_string(),
            ..bucket()
        }];
        enricher.enrich_all(client, &gate, &mut resources, Duration::from_secs(5)).await;
        assert_eq!(resources.len(), 1);
        assert!(!resources[0].enrichment_errors.is_empty());
    }
}
