use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::aws_client::{AwsCall, AwsClient};
use crate::discovery::handler::DiscoveryHandler;
use crate::error::Result;
use crate::model::{DiscoveredVia, Priority, Resource, Tristate};
use crate::safety::SafetyGate;

/// Discovers S3 buckets. S3 is global for the bucket list itself, but each
/// bucket's region has to be resolved per-bucket, so it is registered as a
/// regional handler that runs once (the orchestrator still calls it once per
/// configured region; `ListBuckets` is idempotent and the handler dedupes by
/// bucket name downstream via the ARN merge key).
pub struct S3Handler;

#[async_trait]
impl DiscoveryHandler for S3Handler {
    fn service(&self) -> &'static str {
        "S3"
    }

    fn read_only_ops(&self) -> Vec<&'static str> {
        vec!["ListBuckets", "GetBucketTagging", "GetBucketLocation"]
    }

    async fn discover(
        &self,
        client: Arc<dyn AwsClient>,
        gate: &SafetyGate,
        account_id: &str,
        region: &str,
    ) -> Result<Vec<Resource>> {
        let body = gate
            .guard("S3", "ListBuckets", || {
                let client = Arc::clone(&client);
                let request = AwsCall::new("S3", "ListBuckets", region);
                async move { client.call(request).await }
            })
            .await?;

        let buckets = body.get("Buckets").and_then(Value::as_array).cloned().unwrap_or_default();
        Ok(buckets
            .into_iter()
            .filter_map(|bucket| {
                let name = bucket.get("Name").and_then(Value::as_str)?.to_string();
                Some(Resource {
                    arn: Some(format!("arn:aws:s3:::{}", name)),
                    id: name.clone(),
                    service: "S3".to_string(),
                    r#type: "Bucket".to_string(),
                    region: region.to_string(),
                    account_id: account_id.to_string(),
                    name: Some(name),
                    tags: BTreeMap::new(),
                    created_at: bucket
                        .get("CreationDate")
                        .and_then(Value::as_str)
                        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                        .map(|dt| dt.with_timezone(&chrono::Utc)),
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
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws_client::MockAwsClient;
    use serde_json::json;

    #[tokio::test]
    async fn discovers_buckets_as_global_arns() {
        let client = Arc::new(MockAwsClient::new("123456789012"));
        client
            .set_response("S3", "ListBuckets", json!({"Buckets": [{"Name": "my-bucket"}]}))
            .await;
        let gate = SafetyGate::new(0);
        let resources = S3Handler.discover(client, &gate, "123456789012", "us-east-1").await.unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].arn.as_deref(), Some("arn:aws:s3:::my-bucket"));
    }
}
