use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::aws_client::{AwsCall, AwsClient};
use crate::enrichment::specific::SpecificHandler;
use crate::error::Result;
use crate::model::Resource;
use crate::safety::SafetyGate;

/// Covers both container-orchestration services: ECS cluster status /
/// task-definition configuration, and EKS cluster status /
/// node-group configuration. Both describe calls return a VPC-settings block
/// under a different key, so the handler normalizes it to `vpc_id`/
/// `subnet_ids` on the resource regardless of which service produced it.
pub struct EcsEksEnrichmentHandler;

#[async_trait]
impl SpecificHandler for EcsEksEnrichmentHandler {
    fn handles(&self, service: &str, resource_type: &str) -> bool {
        (service == "ECS" && (resource_type == "Cluster" || resource_type == "Service"))
            || (service == "EKS" && (resource_type == "Cluster" || resource_type == "Nodegroup"))
    }

    fn service_keys(&self) -> Vec<&'static str> {
        vec!["ECS", "EKS"]
    }

    fn read_only_ops(&self) -> Vec<&'static str> {
        vec!["DescribeClusters", "DescribeServices", "DescribeNodegroup"]
    }

    async fn enrich(&self, client: Arc<dyn AwsClient>, gate: &SafetyGate, resource: &mut Resource) -> Result<()> {
        match (resource.service.as_str(), resource.r#type.as_str()) {
            ("ECS", "Cluster") => self.enrich_ecs_cluster(client, gate, resource).await,
            ("ECS", "Service") => self.enrich_ecs_service(client, gate, resource).await,
            ("EKS", "Cluster") => self.enrich_eks_cluster(client, gate, resource).await,
            ("EKS", "Nodegroup") => self.enrich_eks_nodegroup(client, gate, resource).await,
            _ => Ok(()),
        }
    }
}

impl EcsEksEnrichmentHandler {
    async fn enrich_ecs_cluster(&self, client: Arc<dyn AwsClient>, gate: &SafetyGate, resource: &mut Resource) -> Result<()> {
        let request = AwsCall::new("ECS", "DescribeClusters", &resource.region).with_param("clusters", &resource.id);
        let body = gate
            .guard("ECS", "DescribeClusters", || {
                let client = Arc::clone(&client);
                let request = request.clone();
                async move { client.call(request).await }
            })
            .await?;

        let cluster = body.get("clusters").and_then(Value::as_array).and_then(|c| c.first()).cloned().unwrap_or(Value::Null);

        if let Some(status) = cluster.get("status") {
            resource.state = status.as_str().map(str::to_string);
            resource.service_attributes.insert("status".to_string(), status.clone());
        }
        for field in ["activeServicesCount", "runningTasksCount", "pendingTasksCount", "capacityProviders"] {
            if let Some(value) = cluster.get(field) {
                resource.service_attributes.insert(field.to_string(), value.clone());
            }
        }
        Ok(())
    }

    async fn enrich_ecs_service(&self, client: Arc<dyn AwsClient>, gate: &SafetyGate, resource: &mut Resource) -> Result<()> {
        let request = AwsCall::new("ECS", "DescribeServices", &resource.region).with_param("services", &resource.id);
        let body = gate
            .guard("ECS", "DescribeServices", || {
                let client = Arc::clone(&client);
                let request = request.clone();
                async move { client.call(request).await }
            })
            .await?;

        let service = body.get("services").and_then(Value::as_array).and_then(|s| s.first()).cloned().unwrap_or(Value::Null);

        if let Some(task_def) = service.get("taskDefinition") {
            resource.service_attributes.insert("task_definition".to_string(), task_def.clone());
        }
        if let Some(network_config) = service.get("networkConfiguration").and_then(|c| c.get("awsvpcConfiguration")) {
            if let Some(subnets) = network_config.get("subnets").and_then(Value::as_array) {
                resource.subnet_ids = subnets.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
            }
            if let Some(sgs) = network_config.get("securityGroups").and_then(Value::as_array) {
                resource.security_group_ids = sgs.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
            }
        }
        if let Some(desired) = service.get("desiredCount") {
            resource.service_attributes.insert("desired_count".to_string(), desired.clone());
        }
        Ok(())
    }

    async fn enrich_eks_cluster(&self, client: Arc<dyn AwsClient>, gate: &SafetyGate, resource: &mut Resource) -> Result<()> {
        let request = AwsCall::new("EKS", "DescribeClusters", &resource.region).with_param("name", &resource.id);
        let body = gate
            .guard("EKS", "DescribeClusters", || {
                let client = Arc::clone(&client);
                let request = request.clone();
                async move { client.call(request).await }
            })
            .await?;

        let cluster = body.get("cluster").cloned().unwrap_or(Value::Null);

        if let Some(status) = cluster.get("status") {
            resource.state = status.as_str().map(str::to_string);
            resource.service_attributes.insert("status".to_string(), status.clone());
        }
        if let Some(version) = cluster.get("version") {
            resource.service_attributes.insert("version".to_string(), version.clone());
        }
        if let Some(vpc_config) = cluster.get("resourcesVpcConfig") {
            if let Some(vpc_id) = vpc_config.get("vpcId").and_then(Value::as_str) {
                resource.vpc_id = Some(vpc_id.to_string());
            }
            if let Some(subnets) = vpc_config.get("subnetIds").and_then(Value::as_array) {
                resource.subnet_ids = subnets.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
            }
            if let Some(sgs) = vpc_config.get("securityGroupIds").and_then(Value::as_array) {
                resource.security_group_ids = sgs.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
            }
            resource.service_attributes.insert("vpc_config".to_string(), vpc_config.clone());
        }
        Ok(())
    }

    async fn enrich_eks_nodegroup(&self, client: Arc<dyn AwsClient>, gate: &SafetyGate, resource: &mut Resource) -> Result<()> {
        let cluster_name = resource
            .service_attributes
            .get("cluster_name")
            .and_then(Value::as_str)
            .unwrap_or(&resource.id)
            .to_string();
        let request = AwsCall::new("EKS", "DescribeNodegroup", &resource.region)
            .with_param("cluster-name", &cluster_name)
            .with_param("nodegroup-name", &resource.id);
        let body = gate
            .guard("EKS", "DescribeNodegroup", || {
                let client = Arc::clone(&client);
                let request = request.clone();
                async move { client.call(request).await }
            })
            .await?;

        let nodegroup = body.get("nodegroup").cloned().unwrap_or(Value::Null);
        for field in ["status", "instanceTypes", "scalingConfig", "amiType"] {
            if let Some(value) = nodegroup.get(field) {
                resource.service_attributes.insert(to_snake(field), value.clone());
            }
        }
        if let Some(status) = nodegroup.get("status").and_then(Value::as_str) {
            resource.state = Some(status.to_string());
        }
        if let Some(subnets) = nodegroup.get("subnets").and_then(Value::as_array) {
            resource.subnet_ids = subnets.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
        }
        Ok(())
    }
}

fn to_snake(field: &str) -> String {
    let mut out = String::with_capacity(field.len() + 4);
    for ch in field.chars() {
        if ch.is_uppercase() {
            out.push('_');
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
