use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which discovery tier produced a resource.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Primary,
    Fallback,
}

/// How a resource entered the inventory: a specific service API operation,
/// or the tagging-API fallback aggregator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum DiscoveredVia {
    ServiceApi(String),
    ResourceGroupsTaggingApiFallback,
}

impl DiscoveredVia {
    pub fn service_api<S: Into<String>>(operation: S) -> Self {
        DiscoveredVia::ServiceApi(operation.into())
    }
}

impl std::fmt::Display for DiscoveredVia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiscoveredVia::ServiceApi(op) => write!(f, "ServiceAPI:{}", op),
            DiscoveredVia::ResourceGroupsTaggingApiFallback => {
                write!(f, "ResourceGroupsTaggingAPI:Fallback")
            }
        }
    }
}

/// A boolean with an "unknown" state, used where a service may not expose
/// whether a resource is encrypted without an enrichment call that failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Tristate {
    True,
    False,
    Unknown,
}

impl Default for Tristate {
    fn default() -> Self {
        Tristate::Unknown
    }
}

/// Compliance verdict produced by the compliance engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Compliant,
    NonCompliant,
    Untagged,
    Exempt,
}

/// Relative weights used by `Resource::compute_confidence`. Normalized by
/// their sum so the result always lands in `[0.0, 1.0]`. `id`/`name`/`arn`/
/// `type` are weighted so that the four alone already clear the §3
/// invariant (confidence >= 0.7 once those four are set), independent of
/// whatever else about the resource is known.
const WEIGHT_ID: f64 = 3.0;
const WEIGHT_NAME: f64 = 2.0;
const WEIGHT_ARN: f64 = 1.5;
const WEIGHT_TYPE: f64 = 2.0;
const WEIGHT_TAGS: f64 = 1.0;
const WEIGHT_STATE: f64 = 0.5;
const WEIGHT_CREATED_AT: f64 = 0.5;
const WEIGHT_VPC: f64 = 0.5;
const WEIGHT_SG: f64 = 0.5;
const WEIGHT_ACCOUNT: f64 = 0.5;
const MAX_WEIGHT: f64 = WEIGHT_ID
    + WEIGHT_NAME
    + WEIGHT_ARN
    + WEIGHT_TYPE
    + WEIGHT_TAGS
    + WEIGHT_STATE
    + WEIGHT_CREATED_AT
    + WEIGHT_VPC
    + WEIGHT_SG
    + WEIGHT_ACCOUNT;

/// The central inventory entity: one discovered AWS resource plus every
/// signal gathered about it across discovery, enrichment, network/security
/// analysis, and compliance evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    // Identity
    pub arn: Option<String>,
    pub id: String,
    pub service: String,
    pub r#type: String,
    /// Region code, or `"global"` for account-wide services (IAM, Route53,
    /// CloudFront).
    pub region: String,
    pub account_id: String,

    // Metadata
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub state: Option<String>,
    pub discovered_via: DiscoveredVia,
    pub priority: Priority,

    // Enrichment
    #[serde(default)]
    pub service_attributes: BTreeMap<String, Value>,
    #[serde(default)]
    pub vpc_id: Option<String>,
    #[serde(default)]
    pub subnet_ids: Vec<String>,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    #[serde(default)]
    pub public_access: bool,
    #[serde(default)]
    pub encrypted: Tristate,

    // Quality
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub enrichment_errors: Vec<String>,

    // Compliance
    #[serde(default)]
    pub compliance_status: Option<ComplianceStatus>,
    #[serde(default)]
    pub missing_required_tags: BTreeSet<String>,
    #[serde(default)]
    pub invalid_tag_values: BTreeMap<String, String>,
}

impl Resource {
    /// The key used to correlate resources across discovery tiers and
    /// snapshots: the ARN when present, else `service:region:id`.
    pub fn dedup_key(&self) -> String {
        match &self.arn {
            Some(arn) => arn.clone(),
            None => format!("{}:{}:{}", self.service, self.region, self.id),
        }
    }

    /// Sort key for the stable `(service, region, arn or id)` ordering
    /// required by discovery and delta output.
    pub fn sort_key(&self) -> (String, String, String) {
        let identity = self.arn.clone().unwrap_or_else(|| self.id.clone());
        (self.service.clone(), self.region.clone(), identity)
    }

    /// Recompute `confidence` from the weighted-signal formula in the
    /// service enricher's contract.
    pub fn compute_confidence(&mut self) {
        let mut total = 0.0;
        if !self.id.is_empty() {
            total += WEIGHT_ID;
        }
        if self.name.is_some() {
            total += WEIGHT_NAME;
        }
        if self.arn.is_some() {
            total += WEIGHT_ARN;
        }
        if !self.r#type.is_empty() {
            total += WEIGHT_TYPE;
        }
        if !self.tags.is_empty() {
            total += WEIGHT_TAGS;
        }
        if self.state.is_some() {
            total += WEIGHT_STATE;
        }
        if self.created_at.is_some() {
            total += WEIGHT_CREATED_AT;
        }
        if self.vpc_id.is_some() {
            total += WEIGHT_VPC;
        }
        if !self.security_group_ids.is_empty() {
            total += WEIGHT_SG;
        }
        if !self.account_id.is_empty() {
            total += WEIGHT_ACCOUNT;
        }
        self.confidence = (total / MAX_WEIGHT).clamp(0.0, 1.0);
    }

    /// Merge a fallback-origin resource into a primary-origin one: primary
    /// wins on every field conflict, tags are unioned with primary taking
    /// precedence on duplicate keys. `self` is expected to be the primary
    /// resource.
    pub fn merge_fallback(&mut self, fallback: &Resource) {
        for (key, value) in &fallback.tags {
            self.tags.entry(key.clone()).or_insert_with(|| value.clone());
        }
        if self.name.is_none() {
            self.name = fallback.name.clone();
        }
        if self.created_at.is_none() {
            self.created_at = fallback.created_at;
        }
        if self.state.is_none() {
            self.state = fallback.state.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal(service: &str, id: &str) -> Resource {
        Resource {
            arn: None,
            id: id.to_string(),
            service: service.to_string(),
            r#type: "Instance".to_string(),
            region: "us-east-1".to_string(),
            account_id: "123456789012".to_string(),
            name: None,
            tags: BTreeMap::new(),
            created_at: None,
            state: None,
            discovered_via: DiscoveredVia::service_api("DescribeInstances"),
            priority: Priority::Primary,
            service_attributes: BTreeMap::new(),
            vpc_id: None,
            subnet_ids: vec![],
            security_group_ids: vec![],
            public_access: false,
            encrypted: Tristate::Unknown,
            confidence: 0.0,
            enrichment_errors: vec![],
            compliance_status: None,
            missing_required_tags: BTreeSet::new(),
            invalid_tag_values: BTreeMap::new(),
        }
    }

    #[test]
    fn dedup_key_falls_back_to_service_region_id_without_arn() {
        let r = minimal("EC2", "i-1");
        assert_eq!(r.dedup_key(), "EC2:us-east-1:i-1");
    }

    #[test]
    fn dedup_key_uses_arn_when_present() {
        let mut r = minimal("EC2", "i-1");
        r.arn = Some("arn:aws:ec2:us-east-1:123456789012:instance/i-1".to_string());
        assert_eq!(r.dedup_key(), "arn:aws:ec2:us-east-1:123456789012:instance/i-1");
    }

    #[test]
    fn confidence_reaches_threshold_for_well_identified_resource() {
        let mut r = minimal("EC2", "i-1");
        r.arn = Some("arn:aws:ec2:us-east-1:123456789012:instance/i-1".to_string());
        r.name = Some("web-1".to_string());
        r.compute_confidence();
        assert!(r.confidence >= 0.7, "confidence was {}", r.confidence);
    }

    /// The §3 invariant holds from id/name/arn/type alone, with no other
    /// signal (account_id included) contributing.
    #[test]
    fn confidence_clears_threshold_from_identity_fields_alone() {
        let mut r = minimal("EC2", "i-1");
        r.account_id = String::new();
        r.arn = Some("arn:aws:ec2:us-east-1:123456789012:instance/i-1".to_string());
        r.name = Some("web-1".to_string());
        r.compute_confidence();
        assert!(r.confidence >= 0.7, "confidence was {}", r.confidence);
    }

    #[test]
    fn merge_fallback_keeps_primary_on_conflict() {
        let mut primary = minimal("EC2", "i-1");
        primary.tags.insert("Env".to_string(), "prod".to_string());
        let mut fallback = minimal("EC2", "i-1");
        fallback.priority = Priority::Fallback;
        fallback.tags.insert("Env".to_string(), "dev".to_string());
        fallback.tags.insert("Owner".to_string(), "team".to_string());

        primary.merge_fallback(&fallback);

        assert_eq!(primary.tags.get("Env").unwrap(), "prod");
        assert_eq!(primary.tags.get("Owner").unwrap(), "team");
        assert_eq!(primary.priority, Priority::Primary);
    }
}
