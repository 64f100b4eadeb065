use serde::{Deserialize, Serialize};

use super::resource::Resource;

/// Metadata header stored alongside a snapshot's resource list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotHeader {
    pub schema_version: u32,
    pub producer_version: String,
    pub account_id: String,
    pub regions: Vec<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// An immutable, checksum-verified serialization of one inventory run.
/// `resources` is sorted by ARN (or `service:region:id` for resources
/// without one) before checksum computation, so the on-disk artifact and
/// its checksum are stable regardless of discovery order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub snapshot_id: String,
    pub header: SnapshotHeader,
    pub resources: Vec<Resource>,
    pub checksum: String,
}

impl Snapshot {
    /// Resources indexed by their dedup key, for delta computation.
    pub fn by_key(&self) -> std::collections::BTreeMap<String, &Resource> {
        self.resources.iter().map(|r| (r.dedup_key(), r)).collect()
    }
}
