use std::sync::Arc;

use async_trait::async_trait;

use crate::aws_client::AwsClient;
use crate::error::Result;
use crate::model::Resource;
use crate::safety::SafetyGate;

/// A handler that knows how to enrich one service's resources with
/// service-specific attributes via a small, declared set of describe/get
/// calls.
#[async_trait]
pub trait SpecificHandler: Send + Sync {
    fn handles(&self, service: &str, resource_type: &str) -> bool;

    /// Every service key this handler claims, e.g. `["S3"]` or
    /// `["IAM", "CLOUDFRONT", "ROUTE53"]` for a handler spanning several
    /// related global services. Used to register `read_only_ops` against the
    /// safety gate's allow-list for each service the handler actually calls.
    fn service_keys(&self) -> Vec<&'static str>;

    /// Frozen at registration; checked by the safety gate ahead of every
    /// call this handler makes.
    fn read_only_ops(&self) -> Vec<&'static str>;

    /// Fetch and attach `service_attributes` (and any top-level fields the
    /// contract names, e.g. `vpc_id`, `encrypted`) onto `resource`. Errors
    /// are recorded on the resource by the caller, never propagated.
    async fn enrich(&self, client: Arc<dyn AwsClient>, gate: &SafetyGate, resource: &mut Resource) -> Result<()>;
}
