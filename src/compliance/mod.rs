//! Evaluates discovered resources against a `TagPolicy`: exemptions first,
//! then untagged detection, then required/allowed/pattern tag checks.

use regex::Regex;

use crate::config::{Exemption, RequiredTag, TagPolicy};
use crate::model::{ComplianceStatus, Resource};

#[derive(Debug, Clone, Default)]
pub struct ComplianceSummary {
    pub total: usize,
    pub compliant: usize,
    pub non_compliant: usize,
    pub untagged: usize,
    pub exempt: usize,
    /// compliant / (total - exempt), to 0.1%. `None` when every resource is
    /// exempt (the denominator would be zero).
    pub compliant_pct: Option<f64>,
}

pub struct ComplianceEngine<'a> {
    policy: &'a TagPolicy,
}

impl<'a> ComplianceEngine<'a> {
    pub fn new(policy: &'a TagPolicy) -> Self {
        ComplianceEngine { policy }
    }

    /// Evaluate every resource in place, setting `compliance_status`,
    /// `missing_required_tags`, and `invalid_tag_values`. Iteration order
    /// follows the input slice, so results are deterministic for a given
    /// discovery order.
    pub fn evaluate_all(&self, resources: &mut [Resource]) -> ComplianceSummary {
        for resource in resources.iter_mut() {
            self.evaluate(resource);
        }
        self.summarize(resources)
    }

    fn evaluate(&self, resource: &mut Resource) {
        resource.missing_required_tags.clear();
        resource.invalid_tag_values.clear();

        if let Some(exemption) = self.matching_exemption(resource) {
            resource.compliance_status = Some(ComplianceStatus::Exempt);
            let _ = exemption;
            return;
        }

        if resource.tags.is_empty() {
            resource.compliance_status = Some(ComplianceStatus::Untagged);
            for tag in self.required_tags_for(resource) {
                resource.missing_required_tags.insert(tag.key().to_string());
            }
            return;
        }

        for tag in self.required_tags_for(resource) {
            match resource.tags.get(tag.key()) {
                None => {
                    resource.missing_required_tags.insert(tag.key().to_string());
                }
                Some(value) => {
                    if let Some(reason) = invalid_reason(tag, value) {
                        resource.invalid_tag_values.insert(tag.key().to_string(), reason);
                    }
                }
            }
        }

        resource.compliance_status = Some(if resource.missing_required_tags.is_empty() && resource.invalid_tag_values.is_empty() {
            ComplianceStatus::Compliant
        } else {
            ComplianceStatus::NonCompliant
        });
    }

    fn required_tags_for<'b>(&'b self, resource: &Resource) -> Vec<&'b RequiredTag> {
        let mut tags: Vec<&RequiredTag> = self.policy.required_tags.iter().collect();
        if let Some(by_type) = self.policy.service_specific.get(&resource.service) {
            if let Some(requirement) = by_type.get(&resource.r#type) {
                tags.extend(requirement.additional_required_tags.iter());
            }
        }
        tags
    }

    fn matching_exemption(&self, resource: &Resource) -> Option<&Exemption> {
        self.policy.exemptions.iter().find(|exemption| exemption_matches(exemption, resource))
    }

    fn summarize(&self, resources: &[Resource]) -> ComplianceSummary {
        let total = resources.len();
        let mut compliant = 0;
        let mut non_compliant = 0;
        let mut untagged = 0;
        let mut exempt = 0;

        for resource in resources {
            match resource.compliance_status {
                Some(ComplianceStatus::Compliant) => compliant += 1,
                Some(ComplianceStatus::NonCompliant) => non_compliant += 1,
                Some(ComplianceStatus::Untagged) => untagged += 1,
                Some(ComplianceStatus::Exempt) => exempt += 1,
                None => {}
            }
        }

        let denominator = total.saturating_sub(exempt);
        let compliant_pct = if denominator == 0 {
            None
        } else {
            Some((compliant as f64 / denominator as f64 * 1000.0).round() / 10.0)
        };

        ComplianceSummary {
            total,
            compliant,
            non_compliant,
            untagged,
            exempt,
            compliant_pct,
        }
    }
}

fn exemption_matches(exemption: &Exemption, resource: &Resource) -> bool {
    if exemption.service != resource.service {
        return false;
    }
    if let Some(r#type) = &exemption.r#type {
        if r#type != &resource.r#type {
            return false;
        }
    }
    if !exemption.resource_ids.is_empty() && !exemption.resource_ids.contains(&resource.id) {
        return false;
    }
    if let Some(pattern) = &exemption.name_pattern {
        let name = resource.name.as_deref().unwrap_or(&resource.id);
        match Regex::new(pattern) {
            Ok(re) => {
                if !re.is_match(name) {
                    return false;
                }
            }
            Err(_) => return false,
        }
    }
    true
}

fn invalid_reason(tag: &RequiredTag, value: &str) -> Option<String> {
    let RequiredTag::Constrained {
        allowed_values,
        required_values,
        pattern,
        ..
    } = tag
    else {
        return None;
    };

    if let Some(allowed) = allowed_values {
        if !allowed.iter().any(|v| v == value) {
            return Some(format!("'{}' is not in allowed_values {:?}", value, allowed));
        }
    }
    if let Some(required) = required_values {
        if !required.iter().any(|v| v == value) {
            return Some(format!("'{}' does not match required_values {:?}", value, required));
        }
    }
    if let Some(pattern) = pattern {
        match Regex::new(pattern) {
            Ok(re) if !re.is_match(value) => return Some(format!("'{}' does not match pattern '{}'", value, pattern)),
            Err(_) => return Some(format!("policy pattern '{}' is invalid", pattern)),
            _ => {}
        }
    }
    None
}

/// Convenience entry point mirroring `ComplianceEngine::evaluate_all` for
/// callers that only have a borrowed policy and resources, without wanting
/// to name the struct.
pub fn evaluate(policy: &TagPolicy, resources: &mut [Resource]) -> ComplianceSummary {
    ComplianceEngine::new(policy).evaluate_all(resources)
}
