use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RuleRiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub protocol: String,
    /// Inclusive `(from, to)` port range. `None` means all ports (e.g. `-1`
    /// protocol rules).
    pub port_range: Option<(u16, u16)>,
    /// A CIDR block or a referenced security-group id.
    pub source_or_destination: String,
    #[serde(default)]
    pub description: Option<String>,
    pub risk_assessment: RuleRiskLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub group_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub vpc_id: Option<String>,
    #[serde(default)]
    pub inbound: Vec<Rule>,
    #[serde(default)]
    pub outbound: Vec<Rule>,
    #[serde(default)]
    pub associated_resource_arns: Vec<String>,
    pub risk_level: RuleRiskLevel,
}

impl SecurityGroup {
    /// A group is unused when nothing references it.
    pub fn is_unused(&self) -> bool {
        self.associated_resource_arns.is_empty()
    }

    /// Recompute `risk_level` as the maximum risk across all rules. Groups
    /// with no rules are `low`.
    pub fn recompute_risk(&mut self) {
        self.risk_level = self
            .inbound
            .iter()
            .chain(self.outbound.iter())
            .map(|rule| rule.risk_assessment)
            .max()
            .unwrap_or(RuleRiskLevel::Low);
    }
}
