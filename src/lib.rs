//! Read-only AWS inventory and governance engine.
//!
//! Discovers resources across accounts and regions through a two-tier
//! strategy (per-service handlers backed by the Resource Groups Tagging API
//! as a fallback), enriches them with service-specific detail, analyzes
//! network placement and security-group risk, evaluates tag compliance, and
//! persists point-in-time snapshots with delta detection between runs.
//! Every outbound AWS call is classified read-only before it is allowed to
//! execute; nothing in this crate mutates an account.

pub mod account;
pub mod aws_client;
pub mod compliance;
pub mod config;
pub mod delta;
pub mod discovery;
pub mod enrichment;
pub mod error;
pub mod model;
pub mod network;
pub mod pipeline;
pub mod retry;
pub mod safety;
pub mod security_analysis;
pub mod state;

pub use config::{AccountDescriptor, RunConfig, TagPolicy};
pub use error::{Error, Result};
pub use model::Resource;
pub use pipeline::{AccountReport, PipelineRunner, Report, RunState};
pub use safety::SafetyGate;
