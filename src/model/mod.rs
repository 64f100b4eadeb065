//! Core data types shared by every pipeline stage.

mod delta;
pub mod network;
mod resource;
mod security;
mod snapshot;

pub use delta::{ChangeType, ComplianceChange, Delta, DeltaSummary, FieldChange, ModifiedResource};
pub use network::{Subnet, Vpc};
pub use resource::{ComplianceStatus, DiscoveredVia, Priority, Resource, Tristate};
pub use security::{Rule, RuleRiskLevel, SecurityGroup};
pub use snapshot::{Snapshot, SnapshotHeader};
