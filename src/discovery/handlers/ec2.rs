use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use tracing::warn;

use crate::aws_client::{AwsCall, AwsClient};
use crate::discovery::handler::DiscoveryHandler;
use crate::error::Result;
use crate::model::{DiscoveredVia, Priority, Resource, Tristate};
use crate::safety::SafetyGate;

/// Discovers EC2 Instances, Volumes, and the networking/security resources
/// (`Vpc`, `Subnet`, `SecurityGroup`, `NetworkAcl`) that `NetworkAnalyzer`
/// and `SecurityAnalyzer` join other resources against. Representative of
/// the "specific handler" shape every other service handler follows: a
/// frozen read-only op set, an exclusion pattern for AWS-managed noise, and
/// a small number of list/describe calls turned into base `Resource`
/// records.
pub struct Ec2Handler;

#[async_trait]
impl DiscoveryHandler for Ec2Handler {
    fn service(&self) -> &'static str {
        "EC2"
    }

    fn read_only_ops(&self) -> Vec<&'static str> {
        vec![
            "DescribeInstances",
            "DescribeVolumes",
            "DescribeVpcs",
            "DescribeSubnets",
            "DescribeSecurityGroups",
            "DescribeNetworkAcls",
        ]
    }

    fn exclusion_patterns(&self) -> Vec<Regex> {
        vec![Regex::new(r"^aws-service-role/").expect("static exclusion pattern is valid")]
    }

    /// Runs each resource type's discovery independently: one call failing
    /// (e.g. `DescribeSecurityGroups` access-denied) logs a warning and is
    /// skipped rather than discarding everything else this handler already
    /// found. Only surfaces an error if every call failed, so the
    /// orchestrator still has something to record against this service.
    async fn discover(
        &self,
        client: Arc<dyn AwsClient>,
        gate: &SafetyGate,
        account_id: &str,
        region: &str,
    ) -> Result<Vec<Resource>> {
        let calls: Vec<(&'static str, Result<Vec<Resource>>)> = vec![
            (
                "DescribeInstances",
                self.discover_instances(Arc::clone(&client), gate, account_id, region).await,
            ),
            (
                "DescribeVolumes",
                self.discover_volumes(Arc::clone(&client), gate, account_id, region).await,
            ),
            (
                "DescribeVpcs",
                self.discover_vpcs(Arc::clone(&client), gate, account_id, region).await,
            ),
            (
                "DescribeSubnets",
                self.discover_subnets(Arc::clone(&client), gate, account_id, region).await,
            ),
            (
                "DescribeSecurityGroups",
                self.discover_security_groups(Arc::clone(&client), gate, account_id, region).await,
            ),
            (
                "DescribeNetworkAcls",
                self.discover_network_acls(client, gate, account_id, region).await,
            ),
        ];

        let mut resources = Vec::new();
        let mut last_error = None;
        let mut any_ok = false;
        for (op, result) in calls {
            match result {
                Ok(found) => {
                    any_ok = true;
                    resources.extend(found);
                }
                Err(e) => {
                    warn!(operation = op, region, error = %e, "EC2 sub-discovery call failed, continuing");
                    last_error = Some(e);
                }
            }
        }

        if !any_ok {
            if let Some(e) = last_error {
                return Err(e);
            }
        }
        Ok(resources)
    }
}

impl Ec2Handler {
    async fn discover_instances(
        &self,
        client: Arc<dyn AwsClient>,
        gate: &SafetyGate,
        account_id: &str,
        region: &str,
    ) -> Result<Vec<Resource>> {
        let body = gate
            .guard("EC2", "DescribeInstances", || {
                let client = Arc::clone(&client);
                let request = AwsCall::new("EC2", "DescribeInstances", region);
                async move { client.call(request).await }
            })
            .await?;

        let reservations = body.get("Reservations").and_then(Value::as_array).cloned().unwrap_or_default();
        let mut resources = Vec::new();
        for reservation in reservations {
            let instances = reservation.get("Instances").and_then(Value::as_array).cloned().unwrap_or_default();
            for instance in instances {
                let Some(id) = instance.get("InstanceId").and_then(Value::as_str) else {
                    continue;
                };
                if self.is_excluded(id) {
                    continue;
                }
                let tags = tags_from_aws_list(&instance);
                let name = tags.get("Name").cloned();
                resources.push(Resource {
                    arn: instance
                        .get("InstanceId")
                        .and_then(Value::as_str)
                        .map(|id| format!("arn:aws:ec2:{}:{}:instance/{}", region, account_id, id)),
                    id: id.to_string(),
                    service: "EC2".to_string(),
                    r#type: "Instance".to_string(),
                    region: region.to_string(),
                    account_id: account_id.to_string(),
                    name,
                    tags,
                    created_at: instance
                        .get("LaunchTime")
                        .and_then(Value::as_str)
                        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                        .map(|dt| dt.with_timezone(&chrono::Utc)),
                    state: instance
                        .get("State")
                        .and_then(|s| s.get("Name"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    discovered_via: DiscoveredVia::service_api("DescribeInstances"),
                    priority: Priority::Primary,
                    service_attributes: BTreeMap::new(),
                    vpc_id: instance.get("VpcId").and_then(Value::as_str).map(str::to_string),
                    subnet_ids: instance
                        .get("SubnetId")
                        .and_then(Value::as_str)
                        .map(|s| vec![s.to_string()])
                        .unwrap_or_default(),
                    security_group_ids: instance
                        .get("SecurityGroups")
                        .and_then(Value::as_array)
                        .map(|list| {
                            list.iter()
                                .filter_map(|g| g.get("GroupId").and_then(Value::as_str).map(str::to_string))
                                .collect()
                        })
                        .unwrap_or_default(),
                    public_access: instance.get("PublicIpAddress").and_then(Value::as_str).is_some(),
                    encrypted: Tristate::Unknown,
                    confidence: 0.0,
                    enrichment_errors: vec![],
                    compliance_status: None,
                    missing_required_tags: Default::default(),
                    invalid_tag_values: BTreeMap::new(),
                });
            }
        }
        Ok(resources)
    }

    async fn discover_volumes(
        &self,
        client: Arc<dyn AwsClient>,
        gate: &SafetyGate,
        account_id: &str,
        region: &str,
    ) -> Result<Vec<Resource>> {
        let body = gate
            .guard("EC2", "DescribeVolumes", || {
                let client = Arc::clone(&client);
                let request = AwsCall::new("EC2", "DescribeVolumes", region);
                async move { client.call(request).await }
            })
            .await?;

        let volumes = body.get("Volumes").and_then(Value::as_array).cloned().unwrap_or_default();
        Ok(volumes
            .into_iter()
            .filter_map(|volume| {
                let id = volume.get("VolumeId").and_then(Value::as_str)?.to_string();
                let tags = tags_from_aws_list(&volume);
                let name = tags.get("Name").cloned();
                let mut attrs = BTreeMap::new();
                if let Some(size) = volume.get("Size") {
                    attrs.insert("size_gib".to_string(), size.clone());
                }
                if let Some(volume_type) = volume.get("VolumeType") {
                    attrs.insert("volume_type".to_string(), volume_type.clone());
                }
                Some(Resource {
                    arn: None,
                    id: id.clone(),
                    service: "EC2".to_string(),
                    r#type: "Volume".to_string(),
                    region: region.to_string(),
                    account_id: account_id.to_string(),
                    name,
                    tags,
                    created_at: None,
                    state: volume.get("State").and_then(Value::as_str).map(str::to_string),
                    discovered_via: DiscoveredVia::service_api("DescribeVolumes"),
                    priority: Priority::Primary,
                    service_attributes: attrs,
                    vpc_id: None,
                    subnet_ids: vec![],
                    security_group_ids: vec![],
                    public_access: false,
                    encrypted: match volume.get("Encrypted").and_then(Value::as_bool) {
                        Some(true) => Tristate::True,
                        Some(false) => Tristate::False,
                        None => Tristate::Unknown,
                    },
                    confidence: 0.0,
                    enrichment_errors: vec![],
                    compliance_status: None,
                    missing_required_tags: Default::default(),
                    invalid_tag_values: BTreeMap::new(),
                })
            })
            .collect())
    }

    /// VPCs feed `NetworkAnalyzer`'s CIDR-utilization math. The default VPC
    /// found in every unconfigured account is AWS-managed noise for
    /// inventory purposes and is excluded here, matching the "default
    /// VPCs/SGs" exclusion named in the discovery filtering contract.
    async fn discover_vpcs(
        &self,
        client: Arc<dyn AwsClient>,
        gate: &SafetyGate,
        account_id: &str,
        region: &str,
    ) -> Result<Vec<Resource>> {
        let body = gate
            .guard("EC2", "DescribeVpcs", || {
                let client = Arc::clone(&client);
                let request = AwsCall::new("EC2", "DescribeVpcs", region);
                async move { client.call(request).await }
            })
            .await?;

        let vpcs = body.get("Vpcs").and_then(Value::as_array).cloned().unwrap_or_default();
        Ok(vpcs
            .into_iter()
            .filter(|vpc| vpc.get("IsDefault").and_then(Value::as_bool) != Some(true))
            .filter_map(|vpc| {
                let id = vpc.get("VpcId").and_then(Value::as_str)?.to_string();
                let tags = tags_from_aws_list(&vpc);
                let name = tags.get("Name").cloned();
                let mut attrs = BTreeMap::new();
                if let Some(cidr) = vpc.get("CidrBlock") {
                    attrs.insert("cidr_block".to_string(), cidr.clone());
                }
                Some(Resource {
                    arn: Some(format!("arn:aws:ec2:{}:{}:vpc/{}", region, account_id, id)),
                    id,
                    service: "EC2".to_string(),
                    r#type: "Vpc".to_string(),
                    region: region.to_string(),
                    account_id: account_id.to_string(),
                    name,
                    tags,
                    created_at: None,
                    state: vpc.get("State").and_then(Value::as_str).map(str::to_string),
                    discovered_via: DiscoveredVia::service_api("DescribeVpcs"),
                    priority: Priority::Primary,
                    service_attributes: attrs,
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

    async fn discover_subnets(
        &self,
        client: Arc<dyn AwsClient>,
        gate: &SafetyGate,
        account_id: &str,
        region: &str,
    ) -> Result<Vec<Resource>> {
        let body = gate
            .guard("EC2", "DescribeSubnets", || {
                let client = Arc::clone(&client);
                let request = AwsCall::new("EC2", "DescribeSubnets", region);
                async move { client.call(request).await }
            })
            .await?;

        let subnets = body.get("Subnets").and_then(Value::as_array).cloned().unwrap_or_default();
        Ok(subnets
            .into_iter()
            .filter_map(|subnet| {
                let id = subnet.get("SubnetId").and_then(Value::as_str)?.to_string();
                let tags = tags_from_aws_list(&subnet);
                let name = tags.get("Name").cloned();
                let mut attrs = BTreeMap::new();
                if let Some(cidr) = subnet.get("CidrBlock") {
                    attrs.insert("cidr_block".to_string(), cidr.clone());
                }
                if let Some(az) = subnet.get("AvailabilityZone") {
                    attrs.insert("availability_zone".to_string(), az.clone());
                }
                Some(Resource {
                    arn: Some(format!("arn:aws:ec2:{}:{}:subnet/{}", region, account_id, id)),
                    id,
                    service: "EC2".to_string(),
                    r#type: "Subnet".to_string(),
                    region: region.to_string(),
                    account_id: account_id.to_string(),
                    name,
                    tags,
                    created_at: None,
                    state: subnet.get("State").and_then(Value::as_str).map(str::to_string),
                    discovered_via: DiscoveredVia::service_api("DescribeSubnets"),
                    priority: Priority::Primary,
                    service_attributes: attrs,
                    vpc_id: subnet.get("VpcId").and_then(Value::as_str).map(str::to_string),
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

    /// The default security group (`GroupName == "default"`) is AWS-managed
    /// noise excluded the same way the default VPC is.
    async fn discover_security_groups(
        &self,
        client: Arc<dyn AwsClient>,
        gate: &SafetyGate,
        account_id: &str,
        region: &str,
    ) -> Result<Vec<Resource>> {
        let body = gate
            .guard("EC2", "DescribeSecurityGroups", || {
                let client = Arc::clone(&client);
                let request = AwsCall::new("EC2", "DescribeSecurityGroups", region);
                async move { client.call(request).await }
            })
            .await?;

        let groups = body.get("SecurityGroups").and_then(Value::as_array).cloned().unwrap_or_default();
        Ok(groups
            .into_iter()
            .filter(|group| group.get("GroupName").and_then(Value::as_str) != Some("default"))
            .filter_map(|group| {
                let id = group.get("GroupId").and_then(Value::as_str)?.to_string();
                let tags = tags_from_aws_list(&group);
                let name = group
                    .get("GroupName")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| tags.get("Name").cloned());
                let mut attrs = BTreeMap::new();
                if let Some(inbound) = group.get("IpPermissions") {
                    attrs.insert("ip_permissions".to_string(), inbound.clone());
                }
                if let Some(outbound) = group.get("IpPermissionsEgress") {
                    attrs.insert("ip_permissions_egress".to_string(), outbound.clone());
                }
                Some(Resource {
                    arn: Some(format!("arn:aws:ec2:{}:{}:security-group/{}", region, account_id, id)),
                    id,
                    service: "EC2".to_string(),
                    r#type: "SecurityGroup".to_string(),
                    region: region.to_string(),
                    account_id: account_id.to_string(),
                    name,
                    tags,
                    created_at: None,
                    state: None,
                    discovered_via: DiscoveredVia::service_api("DescribeSecurityGroups"),
                    priority: Priority::Primary,
                    service_attributes: attrs,
                    vpc_id: group.get("VpcId").and_then(Value::as_str).map(str::to_string),
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

    async fn discover_network_acls(
        &self,
        client: Arc<dyn AwsClient>,
        gate: &SafetyGate,
        account_id: &str,
        region: &str,
    ) -> Result<Vec<Resource>> {
        let body = gate
            .guard("EC2", "DescribeNetworkAcls", || {
                let client = Arc::clone(&client);
                let request = AwsCall::new("EC2", "DescribeNetworkAcls", region);
                async move { client.call(request).await }
            })
            .await?;

        let acls = body.get("NetworkAcls").and_then(Value::as_array).cloned().unwrap_or_default();
        Ok(acls
            .into_iter()
            .filter_map(|acl| {
                let id = acl.get("NetworkAclId").and_then(Value::as_str)?.to_string();
                let tags = tags_from_aws_list(&acl);
                let name = tags.get("Name").cloned();
                let mut attrs = BTreeMap::new();
                if let Some(entries) = acl.get("Entries") {
                    attrs.insert("entries".to_string(), entries.clone());
                }
                Some(Resource {
                    arn: Some(format!("arn:aws:ec2:{}:{}:network-acl/{}", region, account_id, id)),
                    id,
                    service: "EC2".to_string(),
                    r#type: "NetworkAcl".to_string(),
                    region: region.to_string(),
                    account_id: account_id.to_string(),
                    name,
                    tags,
                    created_at: None,
                    state: None,
                    discovered_via: DiscoveredVia::service_api("DescribeNetworkAcls"),
                    priority: Priority::Primary,
                    service_attributes: attrs,
                    vpc_id: acl.get("VpcId").and_then(Value::as_str).map(str::to_string),
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

fn tags_from_aws_list(value: &Value) -> BTreeMap<String, String> {
    value
        .get("Tags")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|t| {
                    let key = t.get("Key").and_then(Value::as_str)?.to_string();
                    let val = t.get("Value").and_then(Value::as_str).unwrap_or("").to_string();
                    Some((key, val))
                })
                .collect()
        })
        .unwrap_or_default()
}
