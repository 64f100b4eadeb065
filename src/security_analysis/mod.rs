//! Derives security-group risk, unused-group findings, and a NACL summary
//! from already-discovered resources. Makes no further AWS calls.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::Ipv4Addr;

use serde_json::Value;

use crate::model::{Resource, Rule, RuleRiskLevel, SecurityGroup};

/// Ports sensitive enough to escalate risk even without a wide-open CIDR.
const SENSITIVE_PORTS: &[u16] = &[22, 3389, 3306, 5432, 6379, 1433, 9200, 27017, 5984, 11211];

#[derive(Debug, Clone, Default)]
pub struct NaclSummary {
    pub nacl_id: String,
    pub vpc_id: Option<String>,
    pub inbound_rule_count: usize,
    pub outbound_rule_count: usize,
    pub has_explicit_deny: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SecurityReport {
    pub groups: Vec<SecurityGroup>,
    pub unused_group_ids: Vec<String>,
    pub nacls: Vec<NaclSummary>,
    pub reference_cycles: Vec<Vec<String>>,
    pub critical_count: usize,
    pub high_count: usize,
}

pub struct SecurityAnalyzer;

impl SecurityAnalyzer {
    pub fn analyze(resources: &[Resource]) -> SecurityReport {
        let mut groups: Vec<SecurityGroup> = resources
            .iter()
            .filter(|r| r.service == "EC2" && r.r#type == "SecurityGroup")
            .map(build_group)
            .collect();

        let associations = associated_arns_by_group(resources);
        for group in &mut groups {
            group.associated_resource_arns = associations.get(&group.group_id).cloned().unwrap_or_default();
            for rule in group.inbound.iter_mut().chain(group.outbound.iter_mut()) {
                rule.risk_assessment = assess_rule(rule);
            }
            group.recompute_risk();
        }
        groups.sort_by(|a, b| a.group_id.cmp(&b.group_id));

        let unused_group_ids: Vec<String> = groups.iter().filter(|g| g.is_unused()).map(|g| g.group_id.clone()).collect();

        let nacls: Vec<NaclSummary> = resources
            .iter()
            .filter(|r| r.service == "EC2" && r.r#type == "NetworkAcl")
            .map(build_nacl_summary)
            .collect();

        let reference_cycles = find_reference_cycles(&groups);

        let critical_count = groups.iter().filter(|g| g.risk_level == RuleRiskLevel::Critical).count();
        let high_count = groups.iter().filter(|g| g.risk_level == RuleRiskLevel::High).count();

        SecurityReport {
            groups,
            unused_group_ids,
            nacls,
            reference_cycles,
            critical_count,
            high_count,
        }
    }
}

fn build_group(resource: &Resource) -> SecurityGroup {
    let inbound = rules_from(&resource.service_attributes, "ip_permissions");
    let outbound = rules_from(&resource.service_attributes, "ip_permissions_egress");
    SecurityGroup {
        group_id: resource.id.clone(),
        name: resource.name.clone().unwrap_or_else(|| resource.id.clone()),
        vpc_id: resource.vpc_id.clone(),
        inbound,
        outbound,
        associated_resource_arns: Vec::new(),
        risk_level: RuleRiskLevel::Low,
    }
}

fn rules_from(attrs: &BTreeMap<String, Value>, key: &str) -> Vec<Rule> {
    let Some(array) = attrs.get(key).and_then(Value::as_array) else {
        return Vec::new();
    };
    array
        .iter()
        .map(|perm| {
            let protocol = perm.get("IpProtocol").and_then(Value::as_str).unwrap_or("-1").to_string();
            let from = perm.get("FromPort").and_then(Value::as_u64).map(|p| p as u16);
            let to = perm.get("ToPort").and_then(Value::as_u64).map(|p| p as u16);
            let port_range = match (from, to) {
                (Some(f), Some(t)) => Some((f, t)),
                _ => None,
            };
            let source_or_destination = perm
                .get("IpRanges")
                .and_then(Value::as_array)
                .and_then(|ranges| ranges.first())
                .and_then(|r| r.get("CidrIp"))
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            Rule {
                protocol,
                port_range,
                source_or_destination,
                description: perm
                    .get("IpRanges")
                    .and_then(Value::as_array)
                    .and_then(|ranges| ranges.first())
                    .and_then(|r| r.get("Description"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                risk_assessment: RuleRiskLevel::Low,
            }
        })
        .collect()
}

fn assess_rule(rule: &Rule) -> RuleRiskLevel {
    let is_open = rule.source_or_destination == "0.0.0.0/0" || rule.source_or_destination == "::/0";
    let touches_sensitive_port = rule
        .port_range
        .map(|(from, to)| SENSITIVE_PORTS.iter().any(|p| *p >= from && *p <= to))
        .unwrap_or(true);
    let is_all_traffic = rule.protocol == "-1";
    let is_broad_rfc1918 = is_broad_rfc1918_cidr(&rule.source_or_destination);

    if is_open && is_all_traffic {
        RuleRiskLevel::Critical
    } else if is_open && touches_sensitive_port {
        RuleRiskLevel::Critical
    } else if is_open {
        RuleRiskLevel::High
    } else if is_broad_rfc1918 && touches_sensitive_port {
        RuleRiskLevel::Medium
    } else {
        RuleRiskLevel::Low
    }
}

/// A private-range (RFC 1918) source wide enough to span most of a VPC:
/// prefix length 16 or shorter, e.g. `10.0.0.0/16` or `172.16.0.0/12`. A
/// narrow `/32` to a single internal host is not "broad" even though it's
/// still RFC1918.
fn is_broad_rfc1918_cidr(cidr: &str) -> bool {
    let Some((addr, prefix)) = cidr.split_once('/') else {
        return false;
    };
    let Ok(prefix) = prefix.parse::<u8>() else {
        return false;
    };
    let Ok(addr) = addr.parse::<Ipv4Addr>() else {
        return false;
    };
    if prefix > 16 {
        return false;
    }
    let octets = addr.octets();
    octets[0] == 10
        || (octets[0] == 172 && (16..=31).contains(&octets[1]))
        || (octets[0] == 192 && octets[1] == 168)
}

fn associated_arns_by_group(resources: &[Resource]) -> HashMap<String, Vec<String>> {
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for resource in resources {
        let Some(arn) = &resource.arn else { continue };
        for group_id in &resource.security_group_ids {
            map.entry(group_id.clone()).or_default().push(arn.clone());
        }
    }
    map
}

fn build_nacl_summary(resource: &Resource) -> NaclSummary {
    let inbound = resource
        .service_attributes
        .get("entries")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter(|e| e.get("Egress").and_then(Value::as_bool) == Some(false)).count())
        .unwrap_or(0);
    let outbound = resource
        .service_attributes
        .get("entries")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter(|e| e.get("Egress").and_then(Value::as_bool) == Some(true)).count())
        .unwrap_or(0);
    let has_explicit_deny = resource
        .service_attributes
        .get("entries")
        .and_then(Value::as_array)
        .map(|entries| entries.iter().any(|e| e.get("RuleAction").and_then(Value::as_str) == Some("deny")))
        .unwrap_or(false);

    NaclSummary {
        nacl_id: resource.id.clone(),
        vpc_id: resource.vpc_id.clone(),
        inbound_rule_count: inbound,
        outbound_rule_count: outbound,
        has_explicit_deny,
    }
}

/// Security groups can reference each other as a rule source. Detect cycles
/// via DFS three-coloring; a cycle indicates a circular trust relationship
/// worth flagging even though it isn't inherently a risk escalation.
fn find_reference_cycles(groups: &[SecurityGroup]) -> Vec<Vec<String>> {
    let by_id: HashMap<&str, &SecurityGroup> = groups.iter().map(|g| (g.group_id.as_str(), g)).collect();
    let edges: HashMap<&str, Vec<&str>> = groups
        .iter()
        .map(|g| {
            let refs: Vec<&str> = g
                .inbound
                .iter()
                .chain(g.outbound.iter())
                .filter_map(|r| {
                    let candidate = r.source_or_destination.as_str();
                    by_id.contains_key(candidate).then_some(candidate)
                })
                .collect();
            (g.group_id.as_str(), refs)
        })
        .collect();

    #[derive(PartialEq, Clone, Copy)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut colors: HashMap<&str, Color> = groups.iter().map(|g| (g.group_id.as_str(), Color::White)).collect();
    let mut cycles = Vec::new();
    let mut stack = Vec::new();

    fn visit<'a>(
        node: &'a str,
        edges: &HashMap<&'a str, Vec<&'a str>>,
        colors: &mut HashMap<&'a str, Color>,
        stack: &mut Vec<&'a str>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        colors.insert(node, Color::Gray);
        stack.push(node);
        if let Some(neighbors) = edges.get(node) {
            for &next in neighbors {
                match colors.get(next).copied().unwrap_or(Color::White) {
                    Color::White => visit(next, edges, colors, stack, cycles),
                    Color::Gray => {
                        if let Some(start) = stack.iter().position(|&n| n == next) {
                            cycles.push(stack[start..].iter().map(|s| s.to_string()).collect());
                        }
                    }
                    Color::Black => {}
                }
            }
        }
        stack.pop();
        colors.insert(node, Color::Black);
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for group in groups {
        let id = group.group_id.as_str();
        if !seen.contains(id) {
            visit(id, &edges, &mut colors, &mut stack, &mut cycles);
            seen.insert(id);
        }
    }
    cycles
}
