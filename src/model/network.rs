use serde::{Deserialize, Serialize};

/// AWS reserves 5 addresses in every subnet (network, VPC router, DNS,
/// reserved-for-future-use, broadcast-equivalent).
const SUBNET_RESERVED: u64 = 5;
/// The VPC-level summary reserves 2 (network + broadcast) when reporting
/// aggregate capacity across all subnets.
const VPC_RESERVED: u64 = 2;

/// Usable IPv4 host count for a CIDR prefix length, after AWS's reserved
/// addresses. Saturates to zero for the smallest prefixes rather than
/// underflowing.
pub fn total_ips(prefix: u8, reserved: u64) -> u64 {
    if prefix > 32 {
        return 0;
    }
    let host_bits = 32 - prefix as u32;
    let capacity: u64 = if host_bits >= 64 { u64::MAX } else { 1u64 << host_bits };
    capacity.saturating_sub(reserved)
}

/// Usable IPs within a subnet of the given prefix length.
pub fn subnet_total_ips(prefix: u8) -> u64 {
    total_ips(prefix, SUBNET_RESERVED)
}

/// Usable IPs reported at VPC-summary granularity for the given prefix
/// length.
pub fn vpc_total_ips(prefix: u8) -> u64 {
    total_ips(prefix, VPC_RESERVED)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subnet {
    pub subnet_id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub cidr: String,
    pub az: String,
    pub total_ips: u64,
    pub available_ips: u64,
    pub utilization_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vpc {
    pub vpc_id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub cidr: String,
    pub total_ips: u64,
    pub available_ips: u64,
    pub utilization_pct: f64,
    #[serde(default)]
    pub subnets: Vec<Subnet>,
    #[serde(default)]
    pub associated_resource_arns: Vec<String>,
}
