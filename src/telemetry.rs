//! Logging for the harness
//!
//! Scenario runs are read back from CI logs, so output goes to stderr in
//! compact single-line form with targets elided. `RUST_LOG` overrides the
//! default filter, which keeps the harness chatty and the HTTP stack under
//! the Kubernetes client quiet.
//!
//! # Example
//!
//! ```no_run
//! verkko::telemetry::init_logging();
//! // RUST_LOG=debug cargo test ... for per-fetch poller output
//! ```

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter applied when `RUST_LOG` is unset: harness events at info, the
/// transport crates underneath kube only when they warn.
const DEFAULT_FILTER: &str = "info,kube=warn,hyper=warn,tower=warn";

/// Initialize logging for a test run
///
/// Safe to call from every test in a binary; only the first call installs
/// the subscriber, later calls are no-ops.
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).compact())
        .try_init();
}
