use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::aws_client::{AwsCall, AwsClient};
use crate::enrichment::specific::SpecificHandler;
use crate::error::Result;
use crate::model::Resource;
use crate::safety::SafetyGate;

/// Fills the Lambda attribute contract: `runtime`, `handler`, `memory_size`,
/// `timeout`, `role`, `vpc_config`, `layers`, `tracing_config`, `code_size`.
pub struct LambdaEnrichmentHandler;

#[async_trait]
impl SpecificHandler for LambdaEnrichmentHandler {
    fn handles(&self, service: &str, resource_type: &str) -> bool {
        service == "LAMBDA" && resource_type == "Function"
    }

    fn service_keys(&self) -> Vec<&'static str> {
        vec!["LAMBDA"]
    }

    fn read_only_ops(&self) -> Vec<&'static str> {
        vec!["GetFunctionConfiguration"]
    }

    async fn enrich(&self, client: Arc<dyn AwsClient>, gate: &SafetyGate, resource: &mut Resource) -> Result<()> {
        let request = AwsCall::new("Lambda", "GetFunctionConfiguration", &resource.region)
            .with_param("function-name", &resource.id);
        let body = gate
            .guard("LAMBDA", "GetFunctionConfiguration", || {
                let client = Arc::clone(&client);
                let request = request.clone();
                async move { client.call(request).await }
            })
            .await?;

        for (field, key) in [
            ("runtime", "Runtime"),
            ("handler", "Handler"),
            ("memory_size", "MemorySize"),
            ("timeout", "Timeout"),
            ("role", "Role"),
            ("layers", "Layers"),
            ("tracing_config", "TracingConfig"),
            ("code_size", "CodeSize"),
        ] {
            if let Some(value) = body.get(key) {
                resource.service_attributes.insert(field.to_string(), value.clone());
            }
        }

        if let Some(vpc_config) = body.get("VpcConfig") {
            if let Some(vpc_id) = vpc_config.get("VpcId").and_then(Value::as_str) {
                resource.vpc_id = Some(vpc_id.to_string());
            }
            if let Some(subnet_ids) = vpc_config.get("SubnetIds").and_then(Value::as_array) {
                resource.subnet_ids = subnet_ids.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
            }
            if let Some(sg_ids) = vpc_config.get("SecurityGroupIds").and_then(Value::as_array) {
                resource.security_group_ids = sg_ids.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
            }
            resource.service_attributes.insert("vpc_config".to_string(), vpc_config.clone());
        }

        Ok(())
    }
}
