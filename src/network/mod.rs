//! Derives VPC/subnet utilization and joins resources to their network
//! placement. Operates entirely on already-discovered resources; makes no
//! further AWS calls.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;

use crate::model::{
    network::{subnet_total_ips, vpc_total_ips},
    Resource, Subnet, Vpc,
};

#[derive(Debug, Clone, Default)]
pub struct NetworkSummary {
    pub vpcs: Vec<Vpc>,
    pub total_vpcs: usize,
    pub total_subnets: usize,
    pub average_utilization_pct: f64,
}

pub struct NetworkAnalyzer;

impl NetworkAnalyzer {
    /// Build VPC/Subnet records from already-discovered `Vpc`/`Subnet`
    /// resources, join every other resource to its VPC/subnet by id, and
    /// compute utilization.
    pub fn analyze(resources: &[Resource]) -> NetworkSummary {
        let mut vpcs: BTreeMap<String, Vpc> = resources
            .iter()
            .filter(|r| r.service == "EC2" && r.r#type == "Vpc")
            .map(|r| {
                let cidr = cidr_of(r).unwrap_or_else(|| "0.0.0.0/32".to_string());
                let prefix = prefix_of(&cidr);
                let total = vpc_total_ips(prefix);
                (
                    r.id.clone(),
                    Vpc {
                        vpc_id: r.id.clone(),
                        name: r.name.clone(),
                        cidr,
                        total_ips: total,
                        available_ips: total,
                        utilization_pct: 0.0,
                        subnets: Vec::new(),
                        associated_resource_arns: Vec::new(),
                    },
                )
            })
            .collect();

        let mut subnets_by_vpc: BTreeMap<String, Vec<Subnet>> = BTreeMap::new();
        for resource in resources.iter().filter(|r| r.service == "EC2" && r.r#type == "Subnet") {
            let cidr = cidr_of(resource).unwrap_or_else(|| "0.0.0.0/32".to_string());
            let prefix = prefix_of(&cidr);
            let total = subnet_total_ips(prefix);
            let az = resource
                .service_attributes
                .get("availability_zone")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            let consumed = resources
                .iter()
                .filter(|r| r.subnet_ids.contains(&resource.id))
                .count() as u64;
            let available = total.saturating_sub(consumed);
            let utilization = utilization_pct(total, available);

            let subnet = Subnet {
                subnet_id: resource.id.clone(),
                name: resource.name.clone(),
                cidr,
                az,
                total_ips: total,
                available_ips: available,
                utilization_pct: utilization,
            };

            if let Some(vpc_id) = &resource.vpc_id {
                subnets_by_vpc.entry(vpc_id.clone()).or_default().push(subnet);
            }
        }

        for (vpc_id, subnets) in subnets_by_vpc {
            if let Some(vpc) = vpcs.get_mut(&vpc_id) {
                vpc.subnets = subnets;
            }
        }

        for resource in resources {
            let Some(vpc_id) = &resource.vpc_id else { continue };
            if let Some(vpc) = vpcs.get_mut(vpc_id) {
                if let Some(arn) = &resource.arn {
                    if !vpc.associated_resource_arns.contains(arn) {
                        vpc.associated_resource_arns.push(arn.clone());
                    }
                }
            }
        }

        for vpc in vpcs.values_mut() {
            let consumed: HashSet<&String> = vpc
                .associated_resource_arns
                .iter()
                .collect();
            vpc.available_ips = vpc.total_ips.saturating_sub(consumed.len() as u64);
            vpc.utilization_pct = utilization_pct(vpc.total_ips, vpc.available_ips);
        }

        let vpcs: Vec<Vpc> = vpcs.into_values().collect();
        let total_subnets: usize = vpcs.iter().map(|v| v.subnets.len()).sum();
        let average_utilization_pct = if vpcs.is_empty() {
            0.0
        } else {
            vpcs.iter().map(|v| v.utilization_pct).sum::<f64>() / vpcs.len() as f64
        };

        NetworkSummary {
            total_vpcs: vpcs.len(),
            total_subnets,
            average_utilization_pct,
            vpcs,
        }
    }
}

fn cidr_of(resource: &Resource) -> Option<String> {
    resource
        .service_attributes
        .get("cidr_block")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn prefix_of(cidr: &str) -> u8 {
    cidr.rsplit('/').next().and_then(|p| p.parse().ok()).unwrap_or(32)
}

fn utilization_pct(total: u64, available: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        let used = total.saturating_sub(available) as f64;
        (used / total as f64) * 100.0
    }
}
