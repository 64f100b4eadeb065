use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{Error, Result};

use super::{AwsCall, AwsClient};

/// Records every call it receives and replays a canned response keyed by
/// `service.operation`. Used by the read-only-guarantee test and by unit
/// tests for discovery/enrichment handlers that would otherwise need a real
/// AWS account.
#[derive(Debug, Clone)]
pub struct MockAwsClient {
    responses: Arc<Mutex<HashMap<String, Value>>>,
    calls: Arc<Mutex<Vec<AwsCall>>>,
    account_id: String,
    identity_arn: String,
    regions: Vec<String>,
}

impl MockAwsClient {
    pub fn new(account_id: impl Into<String>) -> Self {
        let account_id = account_id.into();
        MockAwsClient {
            responses: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            identity_arn: format!("arn:aws:iam::{}:user/test", account_id),
            account_id,
            regions: vec!["us-east-1".to_string()],
        }
    }

    pub fn with_regions(mut self, regions: Vec<String>) -> Self {
        self.regions = regions;
        self
    }

    fn key(service: &str, operation: &str) -> String {
        format!("{}.{}", service, operation)
    }

    pub async fn set_response(&self, service: &str, operation: &str, value: Value) {
        self.responses
            .lock()
            .await
            .insert(Self::key(service, operation), value);
    }

    /// Every call this client has received, in receipt order.
    pub async fn recorded_calls(&self) -> Vec<AwsCall> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }
}

#[async_trait]
impl AwsClient for MockAwsClient {
    async fn call(&self, request: AwsCall) -> Result<Value> {
        let key = Self::key(&request.service, &request.operation);
        self.calls.lock().await.push(request);
        self.responses
            .lock()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("no stubbed response for {}", key)))
    }

    async fn list_regions(&self) -> Result<Vec<String>> {
        Ok(self.regions.clone())
    }

    async fn caller_identity(&self) -> Result<(String, String, String)> {
        Ok((self.account_id.clone(), self.identity_arn.clone(), "user".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn records_every_call_it_receives() {
        let client = MockAwsClient::new("123456789012");
        client
            .set_response("EC2", "DescribeInstances", json!({"Reservations": []}))
            .await;

        let _ = client
            .call(AwsCall::new("EC2", "DescribeInstances", "us-east-1"))
            .await
            .unwrap();
        let _ = client.call(AwsCall::new("S3", "ListBuckets", "us-east-1")).await;

        assert_eq!(client.call_count().await, 2);
        let calls = client.recorded_calls().await;
        assert_eq!(calls[0].operation, "DescribeInstances");
        assert_eq!(calls[1].operation, "ListBuckets");
    }

    #[tokio::test]
    async fn unstubbed_call_returns_not_found() {
        let client = MockAwsClient::new("123456789012");
        let result = client.call(AwsCall::new("EC2", "DescribeInstances", "us-east-1")).await;
        assert!(result.is_err());
    }
}
