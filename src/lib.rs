//! Verkko - NetworkConfig operator e2e harness
//!
//! Verkko validates the NetworkConfig controller by mutating the custom
//! resources it reconciles, driving RDMA traffic inside workload pods, and
//! verifying that each node's metrics endpoint converges to the expected
//! posture (enabled/disabled, right port, right TLS/RBAC stance).
//!
//! The scenario layer guarantees cleanup: snapshots are taken before any
//! mutation and restored unconditionally, so a failing test never leaves the
//! cluster half-mutated.
//!
//! # Example
//!
//! ```ignore
//! use serde_json::json;
//! use verkko::{scenario, Context};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     verkko::telemetry::init_logging();
//!     let ctx = Context::new().await?;
//!
//!     scenario::run(&ctx, "disable-exporter", |s| Box::pin(async move {
//!         let outcome = s.mutate_all(&json!({
//!             "spec": { "metricsExporter": { "enable": false } }
//!         })).await;
//!         scenario::require_applied(&outcome)?;
//!         // exercise traffic, observe metrics ...
//!         Ok(())
//!     })).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod context;
pub mod metrics;
pub mod retry;
pub mod scenario;
pub mod telemetry;

// Re-export commonly used types
pub use config::Settings;
pub use context::{
    AccessError, Context, Gvr, MutationOutcome, NetworkConfigView, PatchIntent, PatchOutcome,
    PortBinding, Snapshot, WorkloadPod,
};
pub use scenario::{Scenario, ScenarioError};
