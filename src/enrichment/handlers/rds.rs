use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::aws_client::{AwsCall, AwsClient};
use crate::enrichment::specific::SpecificHandler;
use crate::error::Result;
use crate::model::{Resource, Tristate};
use crate::safety::SafetyGate;

/// Fills the RDS attribute contract: `engine`, `engine_version`,
/// `instance_class`, `multi_az`, `storage_encrypted`,
/// `backup_retention_period`, `vpc_security_group_ids`, `db_subnet_group`.
pub struct RdsEnrichmentHandler;

#[async_trait]
impl SpecificHandler for RdsEnrichmentHandler {
    fn handles(&self, service: &str, resource_type: &str) -> bool {
        service == "RDS" && resource_type == "DBInstance"
    }

    fn service_keys(&self) -> Vec<&'static str> {
        vec!["RDS"]
    }

    fn read_only_ops(&self) -> Vec<&'static str> {
        vec!["DescribeDBInstances"]
    }

    async fn enrich(&self, client: Arc<dyn AwsClient>, gate: &SafetyGate, resource: &mut Resource) -> Result<()> {
        let request = AwsCall::new("RDS", "DescribeDBInstances", &resource.region)
            .with_param("db-instance-identifier", &resource.id);
        let body = gate
            .guard("RDS", "DescribeDBInstances", || {
                let client = Arc::clone(&client);
                let request = request.clone();
                async move { client.call(request).await }
            })
            .await?;

        let instance = body
            .get("DBInstances")
            .and_then(Value::as_array)
            .and_then(|list| list.first())
            .cloned()
            .unwrap_or(Value::Null);

        for (field, key) in [
            ("engine", "Engine"),
            ("engine_version", "EngineVersion"),
            ("instance_class", "DBInstanceClass"),
            ("db_subnet_group", "DBSubnetGroup"),
        ] {
            if let Some(value) = instance.get(key) {
                resource.service_attributes.insert(field.to_string(), value.clone());
            }
        }

        if let Some(multi_az) = instance.get("MultiAZ") {
            resource.service_attributes.insert("multi_az".to_string(), multi_az.clone());
        }
        if let Some(period) = instance.get("BackupRetentionPeriod") {
            resource
                .service_attributes
                .insert("backup_retention_period".to_string(), period.clone());
        }

        let vpc_sg_ids: Vec<String> = instance
            .get("VpcSecurityGroups")
            .and_then(Value::as_array)
            .map(|list| {
                list.iter()
                    .filter_map(|g| g.get("VpcSecurityGroupId").and_then(Value::as_str).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        if !vpc_sg_ids.is_empty() {
            resource.security_group_ids = vpc_sg_ids.clone();
        }
        resource
            .service_attributes
            .insert("vpc_security_group_ids".to_string(), serde_json::json!(vpc_sg_ids));

        resource.encrypted = match instance.get("StorageEncrypted").and_then(Value::as_bool) {
            Some(true) => Tristate::True,
            Some(false) => Tristate::False,
            None => Tristate::Unknown,
        };

        Ok(())
    }
}
