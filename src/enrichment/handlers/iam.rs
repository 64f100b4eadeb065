use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::aws_client::{AwsCall, AwsClient};
use crate::enrichment::specific::SpecificHandler;
use crate::error::Result;
use crate::model::Resource;
use crate::safety::SafetyGate;

/// IAM, CloudFront, and Route53 share the same minimal contract in the
/// spec: name/id/arn extraction plus managed-resource filtering. One
/// handler covers all three global services; `service` selects the
/// underlying describe/get call.
pub struct IamEnrichmentHandler;

#[async_trait]
impl SpecificHandler for IamEnrichmentHandler {
    fn handles(&self, service: &str, _resource_type: &str) -> bool {
        matches!(service, "IAM" | "CLOUDFRONT" | "ROUTE53")
    }

    fn service_keys(&self) -> Vec<&'static str> {
        vec!["IAM", "CLOUDFRONT", "ROUTE53"]
    }

    fn read_only_ops(&self) -> Vec<&'static str> {
        vec!["GetRole", "GetUser", "GetPolicy", "GetDistribution", "GetHostedZone"]
    }

    async fn enrich(&self, client: Arc<dyn AwsClient>, gate: &SafetyGate, resource: &mut Resource) -> Result<()> {
        match resource.service.as_str() {
            "IAM" => self.enrich_iam(client, gate, resource).await,
            "CLOUDFRONT" => self.enrich_cloudfront(client, gate, resource).await,
            "ROUTE53" => self.enrich_route53(client, gate, resource).await,
            _ => Ok(()),
        }
    }
}

impl IamEnrichmentHandler {
    async fn enrich_iam(&self, client: Arc<dyn AwsClient>, gate: &SafetyGate, resource: &mut Resource) -> Result<()> {
        let operation = match resource.r#type.as_str() {
            "Role" => "GetRole",
            "User" => "GetUser",
            "Policy" => "GetPolicy",
            _ => return Ok(()),
        };
        let request = AwsCall::new("IAM", operation, "global").with_param("name", &resource.id);
        let body = gate
            .guard("IAM", operation, || {
                let client = Arc::clone(&client);
                let request = request.clone();
                async move { client.call(request).await }
            })
            .await?;

        if let Some(arn) = find_str(&body, "Arn") {
            resource.arn = Some(arn);
        }
        if let Some(path) = find_str(&body, "Path") {
            resource.service_attributes.insert("path".to_string(), Value::String(path));
        }
        Ok(())
    }

    async fn enrich_cloudfront(&self, client: Arc<dyn AwsClient>, gate: &SafetyGate, resource: &mut Resource) -> Result<()> {
        if resource.r#type != "Distribution" {
            return Ok(());
        }
        let request = AwsCall::new("CLOUDFRONT", "GetDistribution", "global").with_param("id", &resource.id);
        let body = gate
            .guard("CLOUDFRONT", "GetDistribution", || {
                let client = Arc::clone(&client);
                let request = request.clone();
                async move { client.call(request).await }
            })
            .await?;

        let distribution = body.get("Distribution").cloned().unwrap_or(Value::Null);
        if let Some(arn) = distribution.get("ARN").and_then(Value::as_str) {
            resource.arn = Some(arn.to_string());
        }
        if let Some(status) = distribution.get("Status").and_then(Value::as_str) {
            resource.state = Some(status.to_string());
        }
        if let Some(domain) = distribution.get("DomainName") {
            resource.service_attributes.insert("domain_name".to_string(), domain.clone());
        }
        if let Some(enabled) = distribution.get("DistributionConfig").and_then(|c| c.get("Enabled")) {
            resource.service_attributes.insert("enabled".to_string(), enabled.clone());
        }
        Ok(())
    }

    async fn enrich_route53(&self, client: Arc<dyn AwsClient>, gate: &SafetyGate, resource: &mut Resource) -> Result<()> {
        if resource.r#type != "HostedZone" {
            return Ok(());
        }
        let request = AwsCall::new("ROUTE53", "GetHostedZone", "global").with_param("id", &resource.id);
        let body = gate
            .guard("ROUTE53", "GetHostedZone", || {
                let client = Arc::clone(&client);
                let request = request.clone();
                async move { client.call(request).await }
            })
            .await?;

        let zone = body.get("HostedZone").cloned().unwrap_or(Value::Null);
        if let Some(name) = zone.get("Name").and_then(Value::as_str) {
            resource.name = Some(name.to_string());
        }
        if let Some(private) = zone.get("Config").and_then(|c| c.get("PrivateZone")) {
            resource.service_attributes.insert("private_zone".to_string(), private.clone());
        }
        if let Some(count) = zone.get("ResourceRecordSetCount") {
            resource.service_attributes.insert("resource_record_set_count".to_string(), count.clone());
        }
        Ok(())
    }
}

/// IAM describe/get responses nest the entity under a key matching the
/// resource type (`Role`, `User`, `Policy`); search one level deep.
fn find_str(body: &Value, field: &str) -> Option<String> {
    if let Some(direct) = body.get(field).and_then(Value::as_str) {
        return Some(direct.to_string());
    }
    body.as_object()?.values().find_map(|nested| nested.get(field).and_then(Value::as_str).map(str::to_string))
}
