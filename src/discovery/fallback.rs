use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::aws_client::{AwsCall, AwsClient};
use crate::error::Result;
use crate::model::{DiscoveredVia, Priority, Resource, Tristate};
use crate::safety::SafetyGate;

/// Single resource-tagging aggregator call per region: returns every tagged
/// resource regardless of service. This is the fallback tier — it never
/// fails discovery outright, only contributes resources the primary tier
/// missed.
pub async fn discover_fallback(
    client: Arc<dyn AwsClient>,
    gate: &SafetyGate,
    account_id: &str,
    region: &str,
) -> Result<Vec<Resource>> {
    let request = AwsCall::new("ResourceGroupsTaggingAPI", "GetResources", region);
    let body = gate
        .guard("ResourceGroupsTaggingAPI", "GetResources", || {
            let client = Arc::clone(&client);
            let request = request.clone();
            async move { client.call(request).await }
        })
        .await?;

    Ok(parse_tagging_response(&body, account_id, region))
}

fn parse_tagging_response(body: &Value, account_id: &str, region: &str) -> Vec<Resource> {
    let entries = body
        .get("ResourceTagMappingList")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    entries
        .into_iter()
        .filter_map(|entry| {
            let arn = entry.get("ResourceARN").and_then(Value::as_str)?.to_string();
            let (service, id) = split_arn(&arn)?;
            let tags: BTreeMap<String, String> = entry
                .get("Tags")
                .and_then(Value::as_array)
                .map(|list| {
                    list.iter()
                        .filter_map(|t| {
                            let key = t.get("Key").and_then(Value::as_str)?.to_string();
                            let value = t.get("Value").and_then(Value::as_str).unwrap_or("").to_string();
                            Some((key, value))
                        })
                        .collect()
                })
                .unwrap_or_default();

            Some(Resource {
                arn: Some(arn),
                id,
                service,
                r#type: "Unknown".to_string(),
                region: region.to_string(),
                account_id: account_id.to_string(),
                name: None,
                tags,
                created_at: None,
                state: None,
                discovered_via: DiscoveredVia::ResourceGroupsTaggingApiFallback,
                priority: Priority::Fallback,
                service_attributes: BTreeMap::new(),
                vpc_id: None,
                subnet_ids: vec![],
                security_group_ids: vec![],
                public_access: false,
                encrypted: Tristate::Unknown,
                confidence: 0.0,
                enrichment_errors: vec![],
                compliance_status: None,
                missing_required_tags: Default::default(),
                invalid_tag_values: BTreeMap::new(),
            })
        })
        .collect()
}

/// Extract `(service, resource-id)` from an ARN of the form
/// `arn:aws:<service>:<region>:<account>:<resource>`.
fn split_arn(arn: &str) -> Option<(String, String)> {
    let mut parts = arn.splitn(6, ':');
    parts.next()?; // "arn"
    parts.next()?; // partition
    let service = parts.next()?.to_uppercase();
    parts.next()?; // region
    parts.next()?; // account
    let resource = parts.next()?.to_string();
    let id = resource.rsplit(['/', ':']).next().unwrap_or(&resource).to_string();
    Some((service, id))
}
