//! Computes a `Delta` between two snapshots: added/removed resources by
//! dedup key, field-level changes for resources present in both, and
//! compliance-status transitions.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::model::{ChangeType, ComplianceChange, Delta, DeltaSummary, FieldChange, ModifiedResource, Resource};

/// Fields compared when deciding whether (and how) a resource changed.
/// Anything not in this list is considered volatile noise (e.g. discovery
/// timestamps) and ignored.
const TRACKED_FIELDS: &[&str] = &[
    "tags",
    "state",
    "security_group_ids",
    "vpc_id",
    "subnet_ids",
    "encrypted",
    "public_access",
    "compliance_status",
];

pub struct DeltaDetector;

impl DeltaDetector {
    pub fn compute(previous: &[Resource], current: &[Resource]) -> Delta {
        let previous_by_key: BTreeMap<String, &Resource> = previous.iter().map(|r| (r.dedup_key(), r)).collect();
        let current_by_key: BTreeMap<String, &Resource> = current.iter().map(|r| (r.dedup_key(), r)).collect();

        let mut added: Vec<String> = current_by_key.keys().filter(|k| !previous_by_key.contains_key(*k)).cloned().collect();
        added.sort();

        let mut removed: Vec<String> = previous_by_key.keys().filter(|k| !current_by_key.contains_key(*k)).cloned().collect();
        removed.sort();

        let mut modified = Vec::new();
        let mut compliance_changes = Vec::new();

        for (key, current_resource) in &current_by_key {
            let Some(previous_resource) = previous_by_key.get(key) else { continue };
            let changes = field_changes(previous_resource, current_resource);
            if !changes.is_empty() {
                let change_type = classify(&changes);
                modified.push(ModifiedResource {
                    arn: key.clone(),
                    changes,
                    change_type,
                });
            }
            if previous_resource.compliance_status != current_resource.compliance_status {
                compliance_changes.push(ComplianceChange {
                    arn: key.clone(),
                    old: previous_resource.compliance_status,
                    new: current_resource.compliance_status,
                });
            }
        }

        modified.sort_by(|a, b| a.arn.cmp(&b.arn));
        compliance_changes.sort_by(|a, b| a.arn.cmp(&b.arn));

        let summary = DeltaSummary {
            added: added.len(),
            removed: removed.len(),
            modified: modified.len(),
            security_changes: modified.iter().filter(|m| m.change_type == ChangeType::Security).count(),
            network_changes: modified.iter().filter(|m| m.change_type == ChangeType::Network).count(),
            tag_changes: modified.iter().filter(|m| m.change_type == ChangeType::Tags).count(),
            config_changes: modified.iter().filter(|m| m.change_type == ChangeType::Config).count(),
            compliance_changes: compliance_changes.len(),
        };

        Delta {
            added,
            removed,
            modified,
            compliance_changes,
            summary,
        }
    }
}

/// Compare tracked fields via canonical JSON so map/vec ordering never
/// produces a spurious diff.
fn field_changes(previous: &Resource, current: &Resource) -> BTreeMap<String, FieldChange> {
    let previous_value = serde_json::to_value(previous).unwrap_or(Value::Null);
    let current_value = serde_json::to_value(current).unwrap_or(Value::Null);

    let mut changes = BTreeMap::new();
    for field in TRACKED_FIELDS {
        let old = previous_value.get(field).cloned().unwrap_or(Value::Null);
        let new = current_value.get(field).cloned().unwrap_or(Value::Null);
        if old != new {
            changes.insert(field.to_string(), FieldChange { old, new });
        }
    }
    changes
}

/// Security changes first, then network, then tags, then anything else is
/// `Config`. The first tracked field (in this priority order) present in
/// `changes` decides the whole resource's `change_type`.
fn classify(changes: &BTreeMap<String, FieldChange>) -> ChangeType {
    if changes.contains_key("security_group_ids") {
        ChangeType::Security
    } else if changes.contains_key("vpc_id") || changes.contains_key("subnet_ids") || changes.contains_key("public_access") {
        ChangeType::Network
    } else if changes.contains_key("tags") {
        ChangeType::Tags
    } else {
        ChangeType::Config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ComplianceStatus, DiscoveredVia, Priority, Tristate};
    use std::collections::BTreeMap;

    fn resource(id: &str, tags: &[(&str, &str)], sg_ids: Vec<String>) -> Resource {
        let mut map = BTreeMap::new();
        for (k, v) in tags {
            map.insert(k.to_string(), v.to_string());
        }
        Resource {
            arn: Some(format!("arn:aws:ec2:us-east-1:123456789012:instance/{}", id)),
            id: id.to_string(),
            service: "EC2".to_string(),
            r#type: "Instance".to_string(),
            region: "us-east-1".to_string(),
            account_id: "123456789012".to_string(),
            name: None,
            tags: map,
            created_at: None,
            state: Some("running".to_string()),
            discovered_via: DiscoveredVia::service_api("DescribeInstances"),
            priority: Priority::Primary,
            service_attributes: BTreeMap::new(),
            vpc_id: Some("vpc-1".to_string()),
            subnet_ids: vec![],
            security_group_ids: sg_ids,
            public_access: false,
            encrypted: Tristate::Unknown,
            confidence: 0.0,
            enrichment_errors: vec![],
            compliance_status: Some(ComplianceStatus::Compliant),
            missing_required_tags: Default::default(),
            invalid_tag_values: BTreeMap::new(),
        }
    }

    #[test]
    fn detects_added_and_removed() {
        let previous = vec![resource("i-1", &[], vec![])];
        let current = vec![resource("i-2", &[], vec![])];
        let delta = DeltaDetector::compute(&previous, &current);
        assert_eq!(delta.added.len(), 1);
        assert_eq!(delta.removed.len(), 1);
        assert_eq!(delta.summary.modified, 0);
    }

    #[test]
    fn security_group_change_classified_as_security() {
        let previous = vec![resource("i-1", &[], vec!["sg-1".to_string()])];
        let current = vec![resource("i-1", &[], vec!["sg-2".to_string()])];
        let delta = DeltaDetector::compute(&previous, &current);
        assert_eq!(delta.modified.len(), 1);
        assert_eq!(delta.modified[0].change_type, ChangeType::Security);
    }

    #[test]
    fn tag_only_change_classified_as_tags() {
        let previous = vec![resource("i-1", &[("Env", "dev")], vec![])];
        let current = vec![resource("i-1", &[("Env", "prod")], vec![])];
        let delta = DeltaDetector::compute(&previous, &current);
        assert_eq!(delta.modified[0].change_type, ChangeType::Tags);
    }

    #[test]
    fn identical_resources_produce_no_modifications() {
        let previous = vec![resource("i-1", &[("Env", "prod")], vec!["sg-1".to_string()])];
        let current = previous.clone();
        let delta = DeltaDetector::compute(&previous, &current);
        assert!(delta.modified.is_empty());
        assert!(delta.compliance_changes.is_empty());
    }
}
