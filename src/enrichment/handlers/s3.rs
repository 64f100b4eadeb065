use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::aws_client::{AwsCall, AwsClient};
use crate::enrichment::specific::SpecificHandler;
use crate::error::Result;
use crate::model::{Resource, Tristate};
use crate::safety::SafetyGate;

/// Fills the S3 attribute contract: `encryption`, `versioning_status`,
/// `public_access_block`, `lifecycle_rules`, `object_lock`, `location`.
pub struct S3EnrichmentHandler;

#[async_trait]
impl SpecificHandler for S3EnrichmentHandler {
    fn handles(&self, service: &str, resource_type: &str) -> bool {
        service == "S3" && resource_type == "Bucket"
    }

    fn service_keys(&self) -> Vec<&'static str> {
        vec!["S3"]
    }

    fn read_only_ops(&self) -> Vec<&'static str> {
        vec![
            "GetBucketEncryption",
            "GetBucketVersioning",
            "GetPublicAccessBlock",
            "GetBucketLifecycleConfiguration",
            "GetObjectLockConfiguration",
            "GetBucketLocation",
        ]
    }

    async fn enrich(&self, client: Arc<dyn AwsClient>, gate: &SafetyGate, resource: &mut Resource) -> Result<()> {
        let bucket = resource.id.clone();

        let encryption = call(&client, gate, "GetBucketEncryption", &bucket).await.ok();
        resource
            .service_attributes
            .insert("encryption".to_string(), encryption.unwrap_or(Value::Null));

        if let Ok(versioning) = call(&client, gate, "GetBucketVersioning", &bucket).await {
            let status = versioning
                .get("Status")
                .and_then(Value::as_str)
                .unwrap_or("Disabled")
                .to_string();
            resource
                .service_attributes
                .insert("versioning_status".to_string(), json!(status));
        }

        if let Ok(pab) = call(&client, gate, "GetPublicAccessBlock", &bucket).await {
            let blocks_public = pab
                .get("PublicAccessBlockConfiguration")
                .and_then(|c| c.get("BlockPublicAcls"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            resource.public_access = !blocks_public;
            resource
                .service_attributes
                .insert("public_access_block".to_string(), pab);
        }

        if let Ok(lifecycle) = call(&client, gate, "GetBucketLifecycleConfiguration", &bucket).await {
            resource
                .service_attributes
                .insert("lifecycle_rules".to_string(), lifecycle.get("Rules").cloned().unwrap_or(Value::Array(vec![])));
        }

        if let Ok(object_lock) = call(&client, gate, "GetObjectLockConfiguration", &bucket).await {
            resource
                .service_attributes
                .insert("object_lock".to_string(), object_lock);
        }

        if let Ok(location) = call(&client, gate, "GetBucketLocation", &bucket).await {
            resource
                .service_attributes
                .insert("location".to_string(), location.get("LocationConstraint").cloned().unwrap_or(Value::Null));
        }

        resource.encrypted = if resource
            .service_attributes
            .get("encryption")
            .map(|v| !v.is_null())
            .unwrap_or(false)
        {
            Tristate::True
        } else {
            Tristate::False
        };

        Ok(())
    }
}

async fn call(client: &Arc<dyn AwsClient>, gate: &SafetyGate, operation: &'static str, bucket: &str) -> Result<Value> {
    let request = AwsCall::new("S3", operation, "us-east-1").with_param("bucket", bucket);
    gate.guard("S3", operation, || {
        let client = Arc::clone(client);
        let request = request.clone();
        async move { client.call(request).await }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws_client::MockAwsClient;
    use crate::model::{DiscoveredVia, Priority};
    use std::collections::BTreeMap;

    fn bucket_resource() -> Resource {
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
    async fn enriches_encryption_and_versioning() {
        let client = Arc::new(MockAwsClient::new("123456789012"));
        client
            .set_response("S3", "GetBucketEncryption", json!({"ServerSideEncryptionConfiguration": {}}))
            .await;
        client
            .set_response("S3", "GetBucketVersioning", json!({"Status": "Enabled"}))
            .await;
        let gate = SafetyGate::new(0);
        let mut resource = bucket_resource();
        S3EnrichmentHandler.enrich(client, &gate, &mut resource).await.unwrap();
        assert_eq!(
            resource.service_attributes.get("versioning_status").unwrap(),
            &json!("Enabled")
        );
        assert_eq!(resource.encrypted, Tristate::True);
    }
}
