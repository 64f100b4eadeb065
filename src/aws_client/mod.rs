//! Abstraction over outbound AWS calls.
//!
//! Every component that needs to reach AWS goes through `AwsClient` rather
//! than shelling out directly, so the safety gate sits at a single choke
//! point and tests can inject an in-memory fake instead of mocking HTTP or
//! spawning a real `aws` process.

mod cli;
mod mock;

pub use cli::CliAwsClient;
pub use mock::MockAwsClient;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// One outbound call's shape: a service, an operation name (used by the
/// safety gate and for logging), and a flat parameter map passed through to
/// the transport.
#[derive(Debug, Clone)]
pub struct AwsCall {
    pub service: String,
    pub operation: String,
    pub region: String,
    pub params: Vec<(String, String)>,
}

impl AwsCall {
    pub fn new(
        service: impl Into<String>,
        operation: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        AwsCall {
            service: service.into(),
            operation: operation.into(),
            region: region.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }
}

/// Transport-agnostic AWS call surface. Implementors return the raw JSON
/// response body; callers deserialize into whatever shape the handler
/// expects. `SafetyGate::guard` wraps every call made through this trait.
#[async_trait]
pub trait AwsClient: Send + Sync {
    async fn call(&self, request: AwsCall) -> Result<Value>;

    /// List regions reachable by the caller's partition, used by
    /// `AccountContext` to resolve the effective region set.
    async fn list_regions(&self) -> Result<Vec<String>>;

    /// Resolve the caller identity: `(account_id, identity_arn, identity_type)`.
    async fn caller_identity(&self) -> Result<(String, String, String)>;
}
