//! Persists and retrieves `Snapshot`s on the local filesystem, keyed by
//! account and timestamp, with a SHA-256 integrity checksum over the
//! canonicalized resource list.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::fs;

use crate::error::{Error, Result};
use crate::model::{Resource, Snapshot, SnapshotHeader};

const SCHEMA_VERSION: u32 = 1;

pub struct StateStore {
    root: PathBuf,
}

impl StateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        StateStore { root: root.into() }
    }

    /// Build a `Snapshot` from a resource set and persist it under
    /// `<root>/<account_id>/<snapshot_id>.json`. The checksum covers the
    /// canonical (sorted-key) JSON encoding of `resources`, so two snapshots
    /// with the same resources in different discovery order still match.
    pub async fn write_snapshot(&self, account_id: &str, regions: Vec<String>, mut resources: Vec<Resource>, created_at: DateTime<Utc>) -> Result<Snapshot> {
        resources.sort_by(|a, b| a.dedup_key().cmp(&b.dedup_key()));
        let snapshot_id = format!("{}-{}", account_id, created_at.format("%Y%m%dT%H%M%SZ"));
        let checksum = checksum_of(&resources)?;
        let snapshot = Snapshot {
            snapshot_id: snapshot_id.clone(),
            header: SnapshotHeader {
                schema_version: SCHEMA_VERSION,
                producer_version: env!("CARGO_PKG_VERSION").to_string(),
                account_id: account_id.to_string(),
                regions,
                created_at,
            },
            resources,
            checksum,
        };

        let dir = self.root.join(account_id);
        fs::create_dir_all(&dir).await.map_err(|e| Error::io(e.to_string()))?;
        let path = dir.join(format!("{}.json", snapshot_id));
        let body = serde_json::to_vec_pretty(&snapshot).map_err(Error::from)?;
        fs::write(&path, body).await.map_err(|e| Error::io(e.to_string()))?;
        Ok(snapshot)
    }

    /// Load a snapshot and verify its checksum still matches its resources.
    pub async fn read_snapshot(&self, account_id: &str, snapshot_id: &str) -> Result<Snapshot> {
        let path = self.root.join(account_id).join(format!("{}.json", snapshot_id));
        let body = fs::read(&path).await.map_err(|e| Error::io(e.to_string()))?;
        let snapshot: Snapshot = serde_json::from_slice(&body).map_err(Error::from)?;
        let recomputed = checksum_of(&snapshot.resources)?;
        if recomputed != snapshot.checksum {
            return Err(Error::integrity(snapshot.snapshot_id.clone(), snapshot.checksum.clone(), recomputed));
        }
        Ok(snapshot)
    }

    /// List snapshot ids for an account, newest first by filename ordering
    /// (timestamps sort lexically because of the fixed-width format used in
    /// `write_snapshot`).
    pub async fn list_snapshots(&self, account_id: &str) -> Result<Vec<String>> {
        let dir = self.root.join(account_id);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(e.to_string())),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| Error::io(e.to_string()))? {
            if let Some(name) = entry.file_name().to_str() {
                if let Some(id) = name.strip_suffix(".json") {
                    ids.push(id.to_string());
                }
            }
        }
        ids.sort();
        ids.reverse();
        Ok(ids)
    }

    /// Return the most recent snapshot preceding `before`, if any.
    pub async fn latest_before(&self, account_id: &str, before: DateTime<Utc>) -> Result<Option<Snapshot>> {
        for id in self.list_snapshots(account_id).await? {
            let snapshot = self.read_snapshot(account_id, &id).await?;
            if snapshot.header.created_at < before {
                return Ok(Some(snapshot));
            }
        }
        Ok(None)
    }

    /// Delete snapshots older than `retention_days` relative to `now`. Only
    /// ever runs on explicit invocation; nothing in this module deletes
    /// state implicitly.
    pub async fn prune(&self, account_id: &str, retention_days: u32, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now - chrono::Duration::days(retention_days as i64);
        let mut pruned = 0;
        for id in self.list_snapshots(account_id).await? {
            let snapshot = self.read_snapshot(account_id, &id).await?;
            if snapshot.header.created_at < cutoff {
                let path = self.root.join(account_id).join(format!("{}.json", id));
                fs::remove_file(&path).await.map_err(|e| Error::io(e.to_string()))?;
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Canonicalize by re-serializing through `serde_json::Value`, whose map
/// type is a `BTreeMap` and therefore always emits sorted keys, then hash.
fn checksum_of(resources: &[Resource]) -> Result<String> {
    let value: Value = serde_json::to_value(resources).map_err(Error::from)?;
    let canonical = serde_json::to_vec(&value).map_err(Error::from)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(format!("{:x}", hasher.finalize()))
}
