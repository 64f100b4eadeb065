use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;

use crate::aws_client::AwsClient;
use crate::error::Result;
use crate::model::Resource;
use crate::safety::SafetyGate;

/// A per-service primary-discovery handler: performs the service's native
/// list/describe calls and produces base `Resource` records. Enrichment of
/// deeper `service_attributes` is a separate concern, owned by
/// `crate::enrichment`.
#[async_trait]
pub trait DiscoveryHandler: Send + Sync {
    /// Service key this handler owns, e.g. `"EC2"`.
    fn service(&self) -> &'static str;

    /// Global services (IAM, CloudFront, Route53) are discovered once per
    /// account rather than once per region.
    fn is_global(&self) -> bool {
        false
    }

    /// Frozen at registration; handed to `SafetyGate::register_allow_list`
    /// so the gate can short-circuit classification for these known-safe
    /// operations.
    fn read_only_ops(&self) -> Vec<&'static str>;

    /// Patterns matching AWS-managed resource names/ids this handler
    /// suppresses by default (e.g. the default VPC, AWS service-linked
    /// roles).
    fn exclusion_patterns(&self) -> Vec<Regex> {
        Vec::new()
    }

    /// Run this handler's discovery calls for one region (or once, for a
    /// global service) and return the resources found, unfiltered.
    async fn discover(
        &self,
        client: Arc<dyn AwsClient>,
        gate: &SafetyGate,
        account_id: &str,
        region: &str,
    ) -> Result<Vec<Resource>>;

    fn is_excluded(&self, candidate: &str) -> bool {
        self.exclusion_patterns().iter().any(|p| p.is_match(candidate))
    }
}

/// Registry mapping service key to its discovery handler.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn DiscoveryHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        HandlerRegistry { handlers: Vec::new() }
    }

    pub fn register(&mut self, handler: Arc<dyn DiscoveryHandler>, gate: &SafetyGate) {
        gate.register_allow_list(handler.service(), crate::safety::AllowList::new(handler.read_only_ops()));
        self.handlers.push(handler);
    }

    /// Build a registry with every discovery handler the crate ships.
    /// Services without a dedicated handler are still covered by the
    /// ResourceGroupsTaggingAPI fallback tier.
    pub fn with_defaults(gate: &SafetyGate) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::discovery::handlers::Ec2Handler), gate);
        registry.register(Arc::new(crate::discovery::handlers::S3Handler), gate);
        registry
    }

    pub fn handlers(&self) -> &[Arc<dyn DiscoveryHandler>] {
        &self.handlers
    }

    pub fn global_handlers(&self) -> impl Iterator<Item = &Arc<dyn DiscoveryHandler>> {
        self.handlers.iter().filter(|h| h.is_global())
    }

    pub fn regional_handlers(&self) -> impl Iterator<Item = &Arc<dyn DiscoveryHandler>> {
        self.handlers.iter().filter(|h| !h.is_global())
    }
}
