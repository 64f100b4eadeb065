use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Where per-account credentials come from. No long-lived credential ever
/// leaves the process once resolved.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    /// Static access key / secret key pair, injected by the caller.
    Static {
        access_key_id: String,
        secret_access_key: String,
        session_token: Option<String>,
    },
    /// A named profile from the shared credentials/config files.
    Profile { name: String },
    /// An STS role assumed for the duration of the run.
    AssumeRole {
        role_arn: String,
        session_name: String,
        external_id: Option<String>,
    },
}

/// Describes a single AWS account to inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountDescriptor {
    /// Known account id, if already available; `AccountContext` fills it in
    /// from the caller-identity call otherwise.
    #[serde(default)]
    pub account_id: Option<String>,
    pub credential_source: CredentialSource,
    /// Regions to inventory. Empty means "discover all reachable regions".
    #[serde(default)]
    pub region_filter: Vec<String>,
    /// Services to inventory, by handler key (e.g. "EC2"). Empty means all
    /// registered handlers plus the dynamic fallback.
    #[serde(default)]
    pub service_filter: Vec<String>,
    /// Restrict discovery to resources matching these tag key/value pairs.
    #[serde(default)]
    pub tag_filter: HashMap<String, String>,
}

impl AccountDescriptor {
    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        match &self.credential_source {
            CredentialSource::Static {
                access_key_id,
                secret_access_key,
                ..
            } => {
                if access_key_id.trim().is_empty() {
                    problems.push("credential_source.access_key_id must not be empty".to_string());
                }
                if secret_access_key.trim().is_empty() {
                    problems.push("credential_source.secret_access_key must not be empty".to_string());
                }
            }
            CredentialSource::Profile { name } => {
                if name.trim().is_empty() {
                    problems.push("credential_source.name must not be empty".to_string());
                }
            }
            CredentialSource::AssumeRole { role_arn, session_name, .. } => {
                if !role_arn.starts_with("arn:aws:iam::") {
                    problems.push(format!("credential_source.role_arn '{}' is not an IAM role ARN", role_arn));
                }
                if session_name.trim().is_empty() {
                    problems.push("credential_source.session_name must not be empty".to_string());
                }
            }
        }
        for region in &self.region_filter {
            if region.trim().is_empty() {
                problems.push("region_filter entries must not be empty".to_string());
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::config(problems.join("; ")))
        }
    }
}

/// A single entry in `TagPolicy::required_tags`: either a bare key, or a key
/// with value constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequiredTag {
    Bare(String),
    Constrained {
        key: String,
        #[serde(default)]
        allowed_values: Option<Vec<String>>,
        #[serde(default)]
        required_values: Option<Vec<String>>,
        #[serde(default)]
        pattern: Option<String>,
    },
}

impl RequiredTag {
    pub fn key(&self) -> &str {
        match self {
            RequiredTag::Bare(key) => key,
            RequiredTag::Constrained { key, .. } => key,
        }
    }
}

/// Per-service, per-resource-type extra required tags.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServiceSpecificRequirement {
    #[serde(default)]
    pub additional_required_tags: Vec<RequiredTag>,
}

/// A policy clause marking matching resources as exempt from compliance
/// evaluation entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exemption {
    pub service: String,
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub name_pattern: Option<String>,
    #[serde(default)]
    pub resource_ids: Vec<String>,
    pub reason: String,
}

/// Declarative tag-compliance policy, loaded from JSON or YAML.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TagPolicy {
    #[serde(default)]
    pub required_tags: Vec<RequiredTag>,
    /// `service -> resource_type -> requirement`.
    #[serde(default)]
    pub service_specific: HashMap<String, HashMap<String, ServiceSpecificRequirement>>,
    #[serde(default)]
    pub exemptions: Vec<Exemption>,
}

impl TagPolicy {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::config(format!("invalid tag policy JSON: {}", e)))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| Error::config(format!("invalid tag policy YAML: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        for tag in &self.required_tags {
            if tag.key().trim().is_empty() {
                problems.push("required_tags entries must have a non-empty key".to_string());
            }
            if let RequiredTag::Constrained { pattern: Some(pattern), .. } = tag {
                if regex::Regex::new(pattern).is_err() {
                    problems.push(format!("required_tags[{}].pattern is not a valid regex: {}", tag.key(), pattern));
                }
            }
        }
        for exemption in &self.exemptions {
            if exemption.service.trim().is_empty() {
                problems.push("exemptions entries must have a non-empty service".to_string());
            }
            if let Some(pattern) = &exemption.name_pattern {
                if regex::Regex::new(pattern).is_err() {
                    problems.push(format!("exemptions[{}].name_pattern is not a valid regex: {}", exemption.service, pattern));
                }
            }
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::config(problems.join("; ")))
        }
    }
}

/// Fallback visibility policy (spec §6).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FallbackDisplay {
    Auto,
    Always,
    Never,
}

impl Default for FallbackDisplay {
    fn default() -> Self {
        FallbackDisplay::Auto
    }
}

/// Knobs controlling discovery filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilteringConfig {
    #[serde(default = "default_true")]
    pub exclude_aws_managed: bool,
    #[serde(default)]
    pub include_default_vpc: bool,
}

impl Default for FilteringConfig {
    fn default() -> Self {
        FilteringConfig {
            exclude_aws_managed: true,
            include_default_vpc: false,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Run-level configuration: concurrency, timeouts, and feature toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_max_concurrent_accounts")]
    pub max_concurrent_accounts: usize,
    #[serde(default = "default_max_concurrent_services")]
    pub max_concurrent_services: usize,
    #[serde(default = "default_account_deadline_secs")]
    pub account_deadline_secs: u64,
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
    #[serde(default)]
    pub fallback_display: FallbackDisplay,
    #[serde(default = "default_true")]
    pub enable_state: bool,
    #[serde(default = "default_true")]
    pub enable_delta: bool,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default)]
    pub filtering: FilteringConfig,
    /// Safety violation count at which the whole run aborts. Zero means any
    /// violation is fatal (the default).
    #[serde(default)]
    pub safety_violation_threshold: u32,
    /// Throttling retry policy.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_cap_ms")]
    pub retry_max_delay_ms: u64,
}

fn default_max_concurrent_accounts() -> usize {
    4
}
fn default_max_concurrent_services() -> usize {
    4
}
fn default_account_deadline_secs() -> u64 {
    1800
}
fn default_operation_timeout_secs() -> u64 {
    20
}
fn default_retention_days() -> u32 {
    30
}
fn default_max_retries() -> u32 {
    5
}
fn default_retry_base_ms() -> u64 {
    100
}
fn default_retry_cap_ms() -> u64 {
    3000
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            max_concurrent_accounts: default_max_concurrent_accounts(),
            max_concurrent_services: default_max_concurrent_services(),
            account_deadline_secs: default_account_deadline_secs(),
            operation_timeout_secs: default_operation_timeout_secs(),
            fallback_display: FallbackDisplay::default(),
            enable_state: true,
            enable_delta: true,
            retention_days: default_retention_days(),
            filtering: FilteringConfig::default(),
            safety_violation_threshold: 0,
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_ms(),
            retry_max_delay_ms: default_retry_cap_ms(),
        }
    }
}

impl RunConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::config(format!("invalid run config JSON: {}", e)))
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| Error::config(format!("invalid run config YAML: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        if self.max_concurrent_accounts == 0 {
            problems.push("max_concurrent_accounts must be >= 1".to_string());
        }
        if self.max_concurrent_services == 0 {
            problems.push("max_concurrent_services must be >= 1".to_string());
        }
        if self.operation_timeout_secs == 0 {
            problems.push("operation_timeout_secs must be >= 1".to_string());
        }
        if self.operation_timeout_secs >= self.account_deadline_secs {
            problems.push("operation_timeout_secs must be strictly less than account_deadline_secs".to_string());
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            problems.push("retry_base_delay_ms must not exceed retry_max_delay_ms".to_string());
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::config(problems.join("; ")))
        }
    }

    /// Merge `other` onto `self`, with `other`'s explicitly-set fields
    /// overriding. Used to layer a CLI-supplied override file onto defaults.
    pub fn merge(mut self, other: RunConfigOverride) -> Self {
        if let Some(v) = other.max_concurrent_accounts {
            self.max_concurrent_accounts = v;
        }
        if let Some(v) = other.max_concurrent_services {
            self.max_concurrent_services = v;
        }
        if let Some(v) = other.account_deadline_secs {
            self.account_deadline_secs = v;
        }
        if let Some(v) = other.operation_timeout_secs {
            self.operation_timeout_secs = v;
        }
        if let Some(v) = other.fallback_display {
            self.fallback_display = v;
        }
        if let Some(v) = other.enable_state {
            self.enable_state = v;
        }
        if let Some(v) = other.enable_delta {
            self.enable_delta = v;
        }
        if let Some(v) = other.retention_days {
            self.retention_days = v;
        }
        self
    }
}

/// Partial `RunConfig` used by `RunConfig::merge`; every field optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfigOverride {
    pub max_concurrent_accounts: Option<usize>,
    pub max_concurrent_services: Option<usize>,
    pub account_deadline_secs: Option<u64>,
    pub operation_timeout_secs: Option<u64>,
    pub fallback_display: Option<FallbackDisplay>,
    pub enable_state: Option<bool>,
    pub enable_delta: Option<bool>,
    pub retention_days: Option<u32>,
}
