//! Configuration for the harness
//!
//! All cluster-specific knobs come from the environment so the same test
//! binary runs unchanged against lab and CI clusters. Build programmatically
//! or call [`Settings::from_env`] - no config files needed.
//!
//! # Example
//!
//! ```
//! use verkko::config::Settings;
//!
//! let settings = Settings::from_env()
//!     .config_namespace("kube-amd-network")
//!     .max_workers(4);
//! ```

use std::path::PathBuf;

/// Default width of the fan-out worker pool
const DEFAULT_MAX_WORKERS: usize = 6;

/// Composite loopback RDMA traffic command run inside each workload pod
const DEFAULT_TRAFFIC_COMMAND: &str = "timeout 60 ib_write_bw -d ionic_0 -i 1 -n 1000 -F -a -x 1 -q 1 -b & \
     sleep 3 && \
     ib_write_bw -d ionic_0 -i 1 -n 1000 -F -a -x 1 -q 1 -b localhost ; \
     pkill -9 ib_write_bw";

/// Harness configuration
///
/// Kubeconfig location is not modeled here: `kube::Client::try_default()`
/// already honors `KUBECONFIG` and in-cluster credentials.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Namespace holding the NetworkConfig custom resources
    pub config_namespace: String,

    /// Namespace holding the workload pods that generate traffic
    pub workload_namespace: String,

    /// Upper bound on concurrent per-resource / per-pod operations
    pub max_workers: usize,

    /// Directory with client.crt, client.key and ca.crt for mTLS fetches
    pub cert_dir: PathBuf,

    /// Service name presented to TLS validation via curl --resolve
    pub metrics_service_name: String,

    /// Shell command executed inside each workload pod to generate traffic
    pub traffic_command: String,
}

impl Settings {
    /// Build settings from the environment
    ///
    /// Recognized variables: `NETWORKCONFIG_NAMESPACE`, `WORKLOAD_NAMESPACE`,
    /// `TEST_MAX_WORKERS`, `LOCAL_CERT_DIR`, `METRICS_SERVICE_NAME`,
    /// `TRAFFIC_COMMAND`. Unset or unparseable values fall back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let max_workers = std::env::var("TEST_MAX_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_WORKERS);

        let cert_dir = std::env::var("LOCAL_CERT_DIR").map_or_else(
            |_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join("certs")
            },
            PathBuf::from,
        );

        Self {
            config_namespace: std::env::var("NETWORKCONFIG_NAMESPACE")
                .unwrap_or_else(|_| "kube-amd-network".to_string()),
            workload_namespace: std::env::var("WORKLOAD_NAMESPACE")
                .unwrap_or_else(|_| "default".to_string()),
            max_workers,
            cert_dir,
            metrics_service_name: std::env::var("METRICS_SERVICE_NAME")
                .unwrap_or_else(|_| "my-metrics-service".to_string()),
            traffic_command: std::env::var("TRAFFIC_COMMAND")
                .unwrap_or_else(|_| DEFAULT_TRAFFIC_COMMAND.to_string()),
        }
    }

    /// Set the namespace holding the custom resources
    #[must_use]
    pub fn config_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config_namespace = namespace.into();
        self
    }

    /// Set the namespace holding the workload pods
    #[must_use]
    pub fn workload_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.workload_namespace = namespace.into();
        self
    }

    /// Set the worker-pool width cap
    #[must_use]
    pub fn max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Set the local certificate directory for mTLS fetches
    #[must_use]
    pub fn cert_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cert_dir = dir.into();
        self
    }

    /// Set the TLS service name used with curl --resolve
    #[must_use]
    pub fn metrics_service_name(mut self, name: impl Into<String>) -> Self {
        self.metrics_service_name = name.into();
        self
    }

    /// Set the in-pod traffic command
    #[must_use]
    pub fn traffic_command(mut self, command: impl Into<String>) -> Self {
        self.traffic_command = command.into();
        self
    }

    /// Worker count for one fan-out round
    ///
    /// Scales the configured cap down to the item count, but never below 2
    /// so a failing item cannot serialize the whole round.
    #[must_use]
    pub fn worker_cap(&self, count: usize) -> usize {
        self.max_workers.min(count.max(2))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides() {
        let settings = Settings::from_env()
            .config_namespace("ns-a")
            .workload_namespace("ns-b")
            .max_workers(3)
            .metrics_service_name("metrics.test")
            .cert_dir("/tmp/certs")
            .traffic_command("true");

        assert_eq!(settings.config_namespace, "ns-a");
        assert_eq!(settings.workload_namespace, "ns-b");
        assert_eq!(settings.max_workers, 3);
        assert_eq!(settings.metrics_service_name, "metrics.test");
        assert_eq!(settings.cert_dir, PathBuf::from("/tmp/certs"));
        assert_eq!(settings.traffic_command, "true");
    }

    #[test]
    fn test_worker_cap_scales_to_count() {
        let settings = Settings::from_env().max_workers(6);

        // Large rounds are capped at the configured width
        assert_eq!(settings.worker_cap(20), 6);
        // Small rounds shrink with the item count
        assert_eq!(settings.worker_cap(4), 4);
        // But never below 2
        assert_eq!(settings.worker_cap(1), 2);
        assert_eq!(settings.worker_cap(0), 2);
    }

    #[test]
    fn test_worker_cap_respects_small_configured_width() {
        let settings = Settings::from_env().max_workers(2);
        assert_eq!(settings.worker_cap(10), 2);
    }
}
