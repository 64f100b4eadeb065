//! End-to-end exercises of the public API with `MockAwsClient`.
//! No network access, no real AWS account required.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use proptest::prelude::*;
use serde_json::json;

use inventag_rs::aws_client::{AwsClient, MockAwsClient};
use inventag_rs::compliance;
use inventag_rs::config::{AccountDescriptor, CredentialSource, Exemption, FallbackDisplay, RequiredTag, TagPolicy};
use inventag_rs::delta::DeltaDetector;
use inventag_rs::discovery::{DiscoveryOrchestrator, HandlerRegistry};
use inventag_rs::enrichment::ServiceEnricher;
use inventag_rs::model::{ComplianceStatus, DiscoveredVia, Priority, Resource, Tristate};
use inventag_rs::pipeline::PipelineRunner;
use inventag_rs::state::StateStore;
use inventag_rs::{RunConfig, RunState, SafetyGate};

fn descriptor(regions: Vec<&str>) -> AccountDescriptor {
    AccountDescriptor {
        account_id: None,
        credential_source: CredentialSource::Profile { name: "default".to_string() },
        region_filter: regions.into_iter().map(str::to_string).collect(),
        service_filter: vec![],
        tag_filter: std::collections::HashMap::new(),
    }
}

fn resource(service: &str, r#type: &str, id: &str, arn: Option<&str>) -> Resource {
    Resource {
        arn: arn.map(str::to_string),
        id: id.to_string(),
        service: service.to_string(),
        r#type: r#type.to_string(),
        region: "us-east-1".to_string(),
        account_id: "123456789012".to_string(),
        name: None,
        tags: BTreeMap::new(),
        created_at: None,
        state: None,
        discovered_via: DiscoveredVia::service_api("Describe"),
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
        missing_required_tags: Default::default(),
        invalid_tag_values: BTreeMap::new(),
    }
}

/// Every call PipelineRunner makes against a mock account
/// classifies read_only, and the safety gate records zero violations.
#[tokio::test]
async fn read_only_guarantee_across_a_full_account_run() {
    let mock = MockAwsClient::new("123456789012").with_regions(vec!["us-east-1".to_string()]);
    mock.set_response("EC2", "DescribeInstances", json!({"Reservations": []})).await;
    mock.set_response("EC2", "DescribeVolumes", json!({"Volumes": []})).await;
    mock.set_response("EC2", "DescribeVpcs", json!({"Vpcs": []})).await;
    mock.set_response("EC2", "DescribeSubnets", json!({"Subnets": []})).await;
    mock.set_response("EC2", "DescribeSecurityGroups", json!({"SecurityGroups": []})).await;
    mock.set_response("EC2", "DescribeNetworkAcls", json!({"NetworkAcls": []})).await;
    mock.set_response("S3", "ListBuckets", json!({"Buckets": []})).await;
    mock.set_response("ResourceGroupsTaggingAPI", "GetResources", json!({"ResourceTagMappingList": []})).await;
    let mock = Arc::new(mock);
    let client: Arc<dyn AwsClient> = mock.clone();

    let gate = SafetyGate::new(0);
    let registry = HandlerRegistry::with_defaults(&gate);
    let orchestrator = DiscoveryOrchestrator::new(registry, 4, Duration::from_secs(5));
    let enricher = ServiceEnricher::with_defaults(&gate);
    let config = RunConfig::default();
    let policy = TagPolicy::default();

    let runner = Arc::new(PipelineRunner::new(Arc::clone(&client), gate.clone(), orchestrator, enricher, None, config));
    let report = runner.run(&[descriptor(vec!["us-east-1"])], &policy).await;

    assert_eq!(report.accounts.len(), 1);
    assert_eq!(report.accounts[0].state, RunState::Done);
    assert_eq!(gate.violation_count(), 0);
    assert!(!gate.should_abort());
    assert_eq!(report.metadata.safety_violations, 0);
    assert_eq!(report.metadata.accounts_done, 1);

    let recorded = mock.recorded_calls().await;
    assert!(!recorded.is_empty());
    const READ_ONLY_PREFIXES: &[&str] = &["Describe", "Get", "List", "Head", "Select", "Query", "Scan", "BatchGet", "Lookup"];
    for call in &recorded {
        assert!(
            READ_ONLY_PREFIXES.iter().any(|p| call.operation.starts_with(p)),
            "unexpected non-read-only operation recorded: {}",
            call.operation
        );
    }
    assert_eq!(gate.audit_len().await, recorded.len());
    assert_eq!(report.audit_log.len(), recorded.len());
}

/// Primary wins name/priority, tags union with primary precedence.
#[test]
fn merge_precedence_prefers_primary_fields_and_unions_tags() {
    let mut primary = resource("EC2", "Instance", "i-a", Some("arn:aws:ec2:us-east-1:123456789012:instance/i-a"));
    primary.name = Some("ec2-a".to_string());
    primary.tags.insert("Env".to_string(), "prod".to_string());

    let mut fallback = primary.clone();
    fallback.priority = Priority::Fallback;
    fallback.name = None;
    fallback.tags = BTreeMap::new();
    fallback.tags.insert("Env".to_string(), "dev".to_string());
    fallback.tags.insert("Owner".to_string(), "team".to_string());

    primary.merge_fallback(&fallback);

    assert_eq!(primary.name.as_deref(), Some("ec2-a"));
    assert_eq!(primary.tags.get("Env").unwrap(), "prod");
    assert_eq!(primary.tags.get("Owner").unwrap(), "team");
    assert_eq!(primary.priority, Priority::Primary);
}

/// Fallback-display auto/never/always over a fixed primary and
/// fallback set (2 EC2 found by both tiers, 2 RoboMaker found only by
/// fallback).
#[test]
fn fallback_display_policy_controls_fallback_only_visibility() {
    use inventag_rs::discovery::merge;

    let primary = vec![
        resource("EC2", "Instance", "i-1", Some("arn:ec2:i-1")),
        resource("EC2", "Instance", "i-2", Some("arn:ec2:i-2")),
    ];
    let fallback = vec![
        resource("EC2", "Instance", "i-1", Some("arn:ec2:i-1")),
        resource("EC2", "Instance", "i-2", Some("arn:ec2:i-2")),
        resource("ROBOMAKER", "RobotApplication", "r-1", Some("arn:robomaker:r-1")),
        resource("ROBOMAKER", "RobotApplication", "r-2", Some("arn:robomaker:r-2")),
    ];
    let mut available = BTreeMap::new();
    available.insert("EC2".to_string(), true);

    let auto = merge(primary.clone(), fallback.clone(), &available, FallbackDisplay::Auto);
    assert_eq!(auto.iter().filter(|r| r.service == "EC2").count(), 2);
    assert_eq!(auto.iter().filter(|r| r.service == "ROBOMAKER").count(), 2);

    let never = merge(primary.clone(), fallback.clone(), &available, FallbackDisplay::Never);
    assert_eq!(never.len(), 2);
    assert!(never.iter().all(|r| r.service == "EC2"));

    let always = merge(primary, fallback, &available, FallbackDisplay::Always);
    assert_eq!(always.len(), 4);
}

/// A small fixture covering allowed-values, pattern, missing-tag, and
/// untagged outcomes in one pass.
#[test]
fn compliance_verdicts_match_the_fixture() {
    let policy = TagPolicy {
        required_tags: vec![
            RequiredTag::Constrained {
                key: "Environment".to_string(),
                allowed_values: Some(vec!["prod".to_string(), "staging".to_string(), "dev".to_string()]),
                required_values: None,
                pattern: None,
            },
            RequiredTag::Bare("Owner".to_string()),
        ],
        service_specific: Default::default(),
        exemptions: Vec::<Exemption>::new(),
    };

    let mut r1 = resource("EC2", "Instance", "i-1", Some("arn:r1"));
    r1.tags.insert("Environment".to_string(), "prod".to_string());
    r1.tags.insert("Owner".to_string(), "a".to_string());

    let mut r2 = resource("EC2", "Instance", "i-2", Some("arn:r2"));
    r2.tags.insert("Environment".to_string(), "qa".to_string());
    r2.tags.insert("Owner".to_string(), "b".to_string());

    let mut r3 = resource("EC2", "Instance", "i-3", Some("arn:r3"));
    r3.tags.insert("Owner".to_string(), "c".to_string());

    let r4 = resource("EC2", "Instance", "i-4", Some("arn:r4"));

    let mut resources = vec![r1, r2, r3, r4];
    let summary = compliance::evaluate(&policy, &mut resources);

    assert_eq!(resources[0].compliance_status, Some(ComplianceStatus::Compliant));
    assert_eq!(resources[1].compliance_status, Some(ComplianceStatus::NonCompliant));
    assert!(resources[1].invalid_tag_values.contains_key("Environment"));
    assert_eq!(resources[2].compliance_status, Some(ComplianceStatus::NonCompliant));
    assert!(resources[2].missing_required_tags.contains("Environment"));
    assert_eq!(resources[3].compliance_status, Some(ComplianceStatus::Untagged));

    assert_eq!(summary.total, 4);
    assert_eq!(summary.compliant, 1);
    assert_eq!(summary.non_compliant, 2);
    assert_eq!(summary.untagged, 1);
    assert_eq!(summary.compliant_pct, Some(25.0));
}

/// A before/after snapshot pair covering an add, a removal, and a
/// state-field modification.
#[test]
fn delta_computation_matches_the_fixture() {
    let mut b_before = resource("EC2", "Instance", "B", Some("arn:b"));
    b_before.state = Some("running".to_string());
    let a = resource("EC2", "Instance", "A", Some("arn:a"));
    let c = resource("EC2", "Instance", "C", Some("arn:c"));
    let previous = vec![a.clone(), b_before, c];

    let mut b_after = resource("EC2", "Instance", "B", Some("arn:b"));
    b_after.state = Some("stopped".to_string());
    let d = resource("EC2", "Instance", "D", Some("arn:d"));
    let current = vec![a, b_after, d];

    let delta = DeltaDetector::compute(&previous, &current);

    assert_eq!(delta.added, vec!["arn:d".to_string()]);
    assert_eq!(delta.removed, vec!["arn:c".to_string()]);
    assert_eq!(delta.modified.len(), 1);
    assert_eq!(delta.modified[0].arn, "arn:b");
    let state_change = delta.modified[0].changes.get("state").expect("state change recorded");
    assert_eq!(state_change.old, json!("running"));
    assert_eq!(state_change.new, json!("stopped"));
}

/// A handler whose describe call outlives the operation timeout
/// fails only that resource's enrichment; the run still completes.
#[tokio::test]
async fn enrichment_timeout_is_contained_to_the_slow_resource() {
    use async_trait::async_trait;
    use inventag_rs::enrichment::SpecificHandler;
    use inventag_rs::error::Result;

    struct SlowHandler;

    #[async_trait]
    impl SpecificHandler for SlowHandler {
        fn handles(&self, service: &str, resource_type: &str) -> bool {
            service == "SLOWSVC" && resource_type == "Thing"
        }

        fn service_keys(&self) -> Vec<&'static str> {
            vec!["SLOWSVC"]
        }

        fn read_only_ops(&self) -> Vec<&'static str> {
            vec!["DescribeThing"]
        }

        async fn enrich(&self, _client: Arc<dyn AwsClient>, _gate: &SafetyGate, _resource: &mut Resource) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    let gate = SafetyGate::new(0);
    let mut enricher = ServiceEnricher::new();
    enricher.register(Arc::new(SlowHandler), &gate);

    let client: Arc<dyn AwsClient> = Arc::new(MockAwsClient::new("123456789012"));
    let mut resources = vec![
        resource("SLOWSVC", "Thing", "slow-1", Some("arn:slow-1")),
        resource("S3", "Bucket", "fast-1", Some("arn:fast-1")),
    ];

    enricher
        .enrich_all(client, &gate, &mut resources, Duration::from_millis(50))
        .await;

    assert!(!resources[0].enrichment_errors.is_empty());
    assert!(resources[1].enrichment_errors.is_empty());
}

/// Covers the `write_snapshot` / `read_snapshot` round trip invariant
/// (recomputed checksum equals stored checksum) against a temp directory,
/// independent of the crate's own internal state tests.
#[tokio::test]
async fn snapshot_round_trip_preserves_checksum() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::new(dir.path());
    let resources = vec![resource("S3", "Bucket", "b-1", Some("arn:aws:s3:::b-1"))];

    let snapshot = store
        .write_snapshot("123456789012", vec!["us-east-1".to_string()], resources, Utc::now())
        .await
        .unwrap();
    let reloaded = store.read_snapshot("123456789012", &snapshot.snapshot_id).await.unwrap();

    assert_eq!(reloaded.checksum, snapshot.checksum);
}

/// Builds one distinctly-keyed resource per entry so presence/absence in a
/// generated subset is unambiguous from its index alone.
fn resource_from_entry(index: usize, tags: &BTreeMap<String, String>, state: &Option<String>) -> Resource {
    let id = format!("i-{}", index);
    let arn = format!("arn:law:{}", index);
    let mut r = resource("EC2", "Instance", &id, Some(&arn));
    r.tags = tags.clone();
    r.state = state.clone();
    r
}

fn entries_strategy() -> impl Strategy<Value = Vec<(BTreeMap<String, String>, Option<String>)>> {
    prop::collection::vec(
        (
            prop::collection::btree_map("[A-Za-z]{1,6}", "[A-Za-z0-9]{1,6}", 0..4),
            prop::option::of("[a-z]{3,8}"),
        ),
        0..8,
    )
}

proptest! {
    /// §8 law: delta(S, S) has zero added, zero removed, zero modified,
    /// zero compliance changes.
    #[test]
    fn delta_of_a_snapshot_against_itself_is_empty(entries in entries_strategy()) {
        let resources: Vec<Resource> = entries
            .iter()
            .enumerate()
            .map(|(i, (tags, state))| resource_from_entry(i, tags, state))
            .collect();

        let delta = DeltaDetector::compute(&resources, &resources);

        prop_assert!(delta.added.is_empty());
        prop_assert!(delta.removed.is_empty());
        prop_assert!(delta.modified.is_empty());
        prop_assert!(delta.compliance_changes.is_empty());
    }

    /// §8 law: keys(added(S1->S2)) == keys(removed(S2->S1)), and vice versa.
    #[test]
    fn delta_added_and_removed_are_symmetric_across_direction(
        entries in entries_strategy(),
        mask1 in prop::collection::vec(any::<bool>(), 1..8),
        mask2 in prop::collection::vec(any::<bool>(), 1..8),
    ) {
        prop_assume!(!entries.is_empty());
        let resources: Vec<Resource> = entries
            .iter()
            .enumerate()
            .map(|(i, (tags, state))| resource_from_entry(i, tags, state))
            .collect();

        let s1: Vec<Resource> = resources
            .iter()
            .enumerate()
            .filter(|(i, _)| mask1[i % mask1.len()])
            .map(|(_, r)| r.clone())
            .collect();
        let s2: Vec<Resource> = resources
            .iter()
            .enumerate()
            .filter(|(i, _)| mask2[i % mask2.len()])
            .map(|(_, r)| r.clone())
            .collect();

        let forward = DeltaDetector::compute(&s1, &s2);
        let backward = DeltaDetector::compute(&s2, &s1);

        let mut added_forward = forward.added.clone();
        added_forward.sort();
        let mut removed_backward = backward.removed.clone();
        removed_backward.sort();
        prop_assert_eq!(added_forward, removed_backward);

        let mut removed_forward = forward.removed.clone();
        removed_forward.sort();
        let mut added_backward = backward.added.clone();
        added_backward.sort();
        prop_assert_eq!(removed_forward, added_backward);
    }

    /// §8 law: two identical inventories serialized to snapshots produce
    /// equal checksums, regardless of when each snapshot was written.
    #[test]
    fn identical_inventories_produce_equal_snapshot_checksums(entries in entries_strategy()) {
        let resources: Vec<Resource> = entries
            .iter()
            .enumerate()
            .map(|(i, (tags, state))| resource_from_entry(i, tags, state))
            .collect();

        let rt = tokio::runtime::Runtime::new().unwrap();
        let (checksum_a, checksum_b) = rt.block_on(async {
            let dir_a = tempfile::tempdir().unwrap();
            let store_a = StateStore::new(dir_a.path());
            let snapshot_a = store_a
                .write_snapshot("123456789012", vec!["us-east-1".to_string()], resources.clone(), Utc::now())
                .await
                .unwrap();

            let dir_b = tempfile::tempdir().unwrap();
            let store_b = StateStore::new(dir_b.path());
            let snapshot_b = store_b
                .write_snapshot("123456789012", vec!["us-east-1".to_string()], resources.clone(), Utc::now())
                .await
                .unwrap();

            (snapshot_a.checksum, snapshot_b.checksum)
        });

        prop_assert_eq!(checksum_a, checksum_b);
    }
}
