use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::resource::ComplianceStatus;

/// Category a modified field is attributed to. Checked in this order when a
/// resource has changes in more than one category; the first match wins.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Security,
    Network,
    Tags,
    Config,
}

/// Value before/after a single field change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldChange {
    pub old: serde_json::Value,
    pub new: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModifiedResource {
    pub arn: String,
    pub changes: BTreeMap<String, FieldChange>,
    pub change_type: ChangeType,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ComplianceChange {
    pub arn: String,
    pub old: Option<ComplianceStatus>,
    pub new: Option<ComplianceStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DeltaSummary {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    pub security_changes: usize,
    pub network_changes: usize,
    pub tag_changes: usize,
    pub config_changes: usize,
    pub compliance_changes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Delta {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<ModifiedResource>,
    pub compliance_changes: Vec<ComplianceChange>,
    pub summary: DeltaSummary,
}
