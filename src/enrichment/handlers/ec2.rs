use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::aws_client::{AwsCall, AwsClient};
use crate::enrichment::specific::SpecificHandler;
use crate::error::Result;
use crate::model::Resource;
use crate::safety::SafetyGate;

/// Fills the EC2 Instance attribute contract: `instance_type`, `state`,
/// `vpc_id`, `subnet_id`, `security_group_ids`, `iam_instance_profile`,
/// `ebs_optimized`, `monitoring`, `metadata_options`.
pub struct Ec2EnrichmentHandler;

#[async_trait]
impl SpecificHandler for Ec2EnrichmentHandler {
    fn handles(&self, service: &str, resource_type: &str) -> bool {
        service == "EC2" && resource_type == "Instance"
    }

    fn service_keys(&self) -> Vec<&'static str> {
        vec!["EC2"]
    }

    fn read_only_ops(&self) -> Vec<&'static str> {
        vec!["DescribeInstanceAttribute"]
    }

    async fn enrich(&self, client: Arc<dyn AwsClient>, gate: &SafetyGate, resource: &mut Resource) -> Result<()> {
        let request = AwsCall::new("EC2", "DescribeInstanceAttribute", &resource.region)
            .with_param("instance-id", &resource.id)
            .with_param("attribute", "instanceType");
        let body = gate
            .guard("EC2", "DescribeInstanceAttribute", || {
                let client = Arc::clone(&client);
                let request = request.clone();
                async move { client.call(request).await }
            })
            .await?;

        if let Some(instance_type) = body.get("InstanceType").and_then(|v| v.get("Value")) {
            resource
                .service_attributes
                .insert("instance_type".to_string(), instance_type.clone());
        }
        if let Some(profile) = body.get("IamInstanceProfile") {
            resource
                .service_attributes
                .insert("iam_instance_profile".to_string(), profile.clone());
        }
        if let Some(ebs_optimized) = body.get("EbsOptimized").and_then(|v| v.get("Value")) {
            resource
                .service_attributes
                .insert("ebs_optimized".to_string(), ebs_optimized.clone());
        }
        if let Some(monitoring) = body.get("Monitoring") {
            resource.service_attributes.insert("monitoring".to_string(), monitoring.clone());
        }
        if let Some(metadata_options) = body.get("MetadataOptions") {
            resource
                .service_attributes
                .insert("metadata_options".to_string(), metadata_options.clone());
        }
        if let Some(state) = resource.state.clone() {
            resource.service_attributes.insert("state".to_string(), Value::String(state));
        }

        Ok(())
    }
}
