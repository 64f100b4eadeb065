use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::aws_client::{AwsCall, AwsClient};
use crate::error::{Error, Result};
use crate::model::Resource;
use crate::safety::SafetyGate;

const DEFAULT_CACHE_CAPACITY: usize = 2_000;

/// A `(operation, param key)` pair that succeeded for a `service:type`.
#[derive(Debug, Clone)]
struct SuccessEntry {
    operation: String,
    param_key: String,
}

/// Simple FIFO-bounded cache with hit/miss counters, used for both the
/// success and failed-candidate caches. Not an LRU: eviction order is
/// insertion order, which is enough to bound memory without adding a
/// dependency for a proper LRU.
struct BoundedCache<V> {
    order: VecDeque<String>,
    entries: HashMap<String, V>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V> BoundedCache<V> {
    fn new(capacity: usize) -> Self {
        BoundedCache {
            order: VecDeque::new(),
            entries: HashMap::new(),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn get(&self, key: &str) -> Option<&V> {
        let found = self.entries.get(key);
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    fn insert(&mut self, key: String, value: V) {
        if !self.entries.contains_key(&key) {
            if self.order.len() >= self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
            self.order.push_back(key.clone());
        }
        self.entries.insert(key, value);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        if hits + misses == 0.0 {
            0.0
        } else {
            hits / (hits + misses)
        }
    }
}

/// Handles enrichment for any service without a registered `SpecificHandler`
/// by searching a bounded space of candidate `(operation, params)` pairs.
pub struct DynamicHandler {
    success_cache: RwLock<BoundedCache<SuccessEntry>>,
    failed_cache: RwLock<BoundedCache<()>>,
}

impl DynamicHandler {
    pub fn new() -> Self {
        DynamicHandler::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        DynamicHandler {
            success_cache: RwLock::new(BoundedCache::new(capacity)),
            failed_cache: RwLock::new(BoundedCache::new(capacity)),
        }
    }

    pub async fn success_cache_len(&self) -> usize {
        self.success_cache.read().await.len()
    }

    pub async fn success_cache_hit_rate(&self) -> f64 {
        self.success_cache.read().await.hit_rate()
    }

    pub async fn failed_cache_len(&self) -> usize {
        self.failed_cache.read().await.len()
    }

    fn candidate_operations(resource_type: &str) -> Vec<String> {
        vec![
            format!("Describe{}", resource_type),
            format!("Describe{}s", resource_type),
            format!("Get{}", resource_type),
            format!("Get{}s", resource_type),
            format!("List{}s", resource_type),
            format!("BatchGet{}", resource_type),
        ]
    }

    fn candidate_params(resource: &Resource) -> Vec<(&'static str, String)> {
        let mut candidates = vec![
            (
                "type_name",
                format!("{}Name", resource.r#type),
            ),
            ("type_id", format!("{}Id", resource.r#type)),
            ("name", "Name".to_string()),
            ("id", "Id".to_string()),
        ];
        if let Some(arn) = &resource.arn {
            candidates.push(("arn", "ResourceArn".to_string()));
            let _ = arn;
        }
        candidates
    }

    fn param_value<'a>(key: &str, resource: &'a Resource) -> &'a str {
        if key == "ResourceArn" {
            resource.arn.as_deref().unwrap_or(&resource.id)
        } else {
            &resource.id
        }
    }

    /// Enumerate candidates, skip anything the safety gate wouldn't classify
    /// as read_only, and return the first response with a non-metadata
    /// payload. On success, the winning `(operation, param key)` is cached
    /// per `service:type` so future resources of the same shape skip
    /// straight to it.
    pub async fn enrich(
        &self,
        client: Arc<dyn AwsClient>,
        gate: &SafetyGate,
        resource: &mut Resource,
    ) -> Result<()> {
        let cache_key = format!("{}:{}", resource.service, resource.r#type);

        if let Some(cached) = self.success_cache.read().await.get(&cache_key).cloned() {
            if let Ok(body) = self
                .try_candidate(&client, gate, resource, &cached.operation, &cached.param_key)
                .await
            {
                apply_response(resource, body);
                return Ok(());
            }
        }

        for operation in Self::candidate_operations(&resource.r#type) {
            if !matches!(gate.classify(&resource.service, &operation), crate::safety::Classification::ReadOnly) {
                continue;
            }
            for (_, param_key) in Self::candidate_params(resource) {
                let failed_key = format!("{}:{}:{}", cache_key, operation, param_key);
                if self.failed_cache.read().await.get(&failed_key).is_some() {
                    continue;
                }
                match self.try_candidate(&client, gate, resource, &operation, &param_key).await {
                    Ok(body) => {
                        self.success_cache.write().await.insert(
                            cache_key,
                            SuccessEntry {
                                operation,
                                param_key,
                            },
                        );
                        apply_response(resource, body);
                        return Ok(());
                    }
                    Err(_) => {
                        self.failed_cache.write().await.insert(failed_key, ());
                    }
                }
            }
        }

        Err(Error::enrichment(
            resource.dedup_key(),
            "no candidate operation produced a usable response".to_string(),
        ))
    }

    async fn try_candidate(
        &self,
        client: &Arc<dyn AwsClient>,
        gate: &SafetyGate,
        resource: &Resource,
        operation: &str,
        param_key: &str,
    ) -> Result<Value> {
        let value = Self::param_value(param_key, resource);
        let request = AwsCall::new(resource.service.clone(), operation.to_string(), resource.region.clone())
            .with_param(param_key.to_string(), value.to_string());
        let body = gate
            .guard(&resource.service, operation, || {
                let client = Arc::clone(client);
                let request = request.clone();
                async move { client.call(request).await }
            })
            .await?;
        if is_non_metadata_payload(&body) {
            Ok(body)
        } else {
            Err(Error::enrichment(resource.dedup_key(), "empty or metadata-only response"))
        }
    }
}

impl Default for DynamicHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn is_non_metadata_payload(body: &Value) -> bool {
    match body.as_object() {
        Some(map) => map.keys().any(|k| k != "ResponseMetadata"),
        None => !body.is_null(),
    }
}

/// Extract the largest non-metadata object in the response and attach it to
/// `service_attributes` under a `dynamic` key.
fn apply_response(resource: &mut Resource, body: Value) {
    let largest = match body.as_object() {
        Some(map) => map
            .iter()
            .filter(|(k, _)| *k != "ResponseMetadata")
            .max_by_key(|(_, v)| v.as_object().map(|o| o.len()).unwrap_or(1))
            .map(|(_, v)| v.clone())
            .unwrap_or(body.clone()),
        None => body.clone(),
    };
    resource.service_attributes.insert("dynamic".to_string(), largest);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws_client::MockAwsClient;
    use crate::model::{DiscoveredVia, Priority, Tristate};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn resource(service: &str, r#type: &str, id: &str) -> Resource {
        Resource {
            arn: None,
            id: id.to_string(),
            service: service.to_string(),
            r#type: r#type.to_string(),
            region: "us-east-1".to_string(),
            account_id: "123456789012".to_string(),
            name: None,
            tags: BTreeMap::new(),
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
        }
    }

    #[tokio::test]
    async fn finds_first_candidate_that_returns_data() {
        let client = Arc::new(MockAwsClient::new("123456789012"));
        client
            .set_response(
                "ROBOMAKER",
                "DescribeRobotApplication",
                json!({"robotApplication": {"arn": "arn:aws:robomaker:...", "name": "my-app"}}),
            )
            .await;
        let gate = SafetyGate::new(0);
        let handler = DynamicHandler::new();
        let mut res = resource("ROBOMAKER", "RobotApplication", "my-app");
        handler.enrich(client, &gate, &mut res).await.unwrap();
        assert!(res.service_attributes.contains_key("dynamic"));
    }

    #[tokio::test]
    async fn caches_successful_operation_for_reuse() {
        let client = Arc::new(MockAwsClient::new("123456789012"));
        client
            .set_response("ROBOMAKER", "DescribeRobotApplication", json!({"robotApplication": {"name": "a"}}))
            .await;
        let gate = SafetyGate::new(0);
        let handler = DynamicHandler::new();
        let mut res = resource("ROBOMAKER", "RobotApplication", "my-app");
        handler.enrich(client, &gate, &mut res).await.unwrap();
        assert_eq!(handler.success_cache_len().await, 1);
    }

    #[tokio::test]
    async fn returns_enrichment_error_when_nothing_responds() {
        let client = Arc::new(MockAwsClient::new("123456789012"));
        let gate = SafetyGate::new(0);
        let handler = DynamicHandler::new();
        let mut res = resource("ROBOMAKER", "RobotApplication", "my-app");
        let result = handler.enrich(client, &gate, &mut res).await;
        assert!(result.is_err());
    }
}
