use super::types::PortBinding;
use super::{AccessError, Context};
use crate::metrics::text_has_sample;
use crate::retry::{retry, Backoff};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// curl --connect-timeout for every metrics fetch
const CONNECT_TIMEOUT_SECS: u32 = 3;

/// Exec timeout for one in-pod metrics pull
const PULL_EXEC_TIMEOUT: Duration = Duration::from_secs(5);

/// Wall-clock limit on one local mTLS curl
const LOCAL_CURL_TIMEOUT: Duration = Duration::from_secs(10);

impl Context {
    /// Pull metrics text over plain HTTP, from inside a workload pod
    ///
    /// Node addresses are not routable from the test host in the target
    /// environment, so the fetch runs inside the pod. `|| true` keeps curl's
    /// own exit code from failing the exec; an unreachable endpoint comes
    /// back as empty text.
    pub async fn pull_metrics(
        &self,
        pod_name: &str,
        binding: &PortBinding,
    ) -> Result<String, AccessError> {
        let command = format!(
            "curl -sS --connect-timeout {CONNECT_TIMEOUT_SECS} http://{}:{}/metrics || true",
            binding.node_address, binding.port
        );
        self.exec_in_pod(
            pod_name,
            &self.settings.workload_namespace,
            &command,
            PULL_EXEC_TIMEOUT,
        )
        .await
    }

    /// Whether the endpoint currently serves at least one numeric sample
    ///
    /// A failed pull is `false`, not an error.
    pub async fn metrics_have_sample(&self, pod_name: &str, binding: &PortBinding) -> bool {
        match self.pull_metrics(pod_name, binding).await {
            Ok(text) => text_has_sample(&text),
            Err(e) => {
                debug!(pod = %pod_name, error = %e, "Metrics pull failed");
                false
            }
        }
    }

    /// Poll until the endpoint serves a numeric sample, or the deadline passes
    ///
    /// Reconciliation and endpoint propagation are asynchronous with no done
    /// signal, so convergence is observed rather than awaited. Transient
    /// fetch failures are "not ready yet" at debug level; the loop only ends
    /// on a sample or on the deadline. Returns readiness as a bool.
    pub async fn wait_metrics_ready(
        &self,
        pod_name: &str,
        binding: &PortBinding,
        timeout: Duration,
        interval: Duration,
    ) -> bool {
        let result: Result<(), String> = retry(|| async move {
            match self.pull_metrics(pod_name, binding).await {
                Ok(text) if text_has_sample(&text) => Ok(()),
                Ok(_) => Err("no numeric samples yet".to_string()),
                Err(e) => {
                    debug!(
                        pod = %pod_name,
                        error = %e,
                        "Metrics fetch failed; treating as not ready"
                    );
                    Err(e.to_string())
                }
            }
        })
        .deadline(timeout)
        .backoff(Backoff::Fixed(interval))
        .run()
        .await;

        result.is_ok()
    }

    /// Pull metrics over mutual TLS from the test host
    ///
    /// Client certificate, key and CA bundle are loaded from the configured
    /// local directory; if any file is absent the fetch fails fast without a
    /// network call. The configured service name is presented for TLS
    /// validation via a `--resolve` hostname override.
    pub async fn pull_metrics_mtls(&self, binding: &PortBinding) -> Result<String, AccessError> {
        let dir = &self.settings.cert_dir;
        let client_crt = dir.join("client.crt");
        let client_key = dir.join("client.key");
        let ca_crt = dir.join("ca.crt");

        let missing: Vec<String> = [&client_crt, &client_key, &ca_crt]
            .into_iter()
            .filter(|p| !p.is_file())
            .map(|p| p.display().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(AccessError::Transport(format!(
                "missing local cert files for mTLS fetch: {}",
                missing.join(", ")
            )));
        }

        let resolve = format!(
            "{}:{}:{}",
            binding.service_name, binding.port, binding.node_address
        );
        let url = format!("https://{}:{}/metrics", binding.service_name, binding.port);

        let output = tokio::time::timeout(
            LOCAL_CURL_TIMEOUT,
            Command::new("curl")
                .arg("--cert")
                .arg(&client_crt)
                .arg("--key")
                .arg(&client_key)
                .arg("--cacert")
                .arg(&ca_crt)
                .args(["-sS", "-H", "Accept: */*", "--resolve"])
                .arg(&resolve)
                .arg(&url)
                .output(),
        )
        .await
        .map_err(|_| {
            AccessError::Transport(format!("local curl timed out after {LOCAL_CURL_TIMEOUT:?}"))
        })?
        .map_err(|e| AccessError::Transport(format!("failed to run local curl: {e}")))?;

        if !output.status.success() {
            warn!(
                code = ?output.status.code(),
                stderr = %String::from_utf8_lossy(&output.stderr),
                "Local curl returned non-zero"
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Poll the mTLS endpoint until a numeric sample appears
    ///
    /// Same loop as [`wait_metrics_ready`](Context::wait_metrics_ready) with
    /// the local mTLS fetch as the transport.
    pub async fn wait_metrics_ready_mtls(
        &self,
        binding: &PortBinding,
        timeout: Duration,
        interval: Duration,
    ) -> bool {
        let result: Result<(), String> = retry(|| async move {
            match self.pull_metrics_mtls(binding).await {
                Ok(text) if text_has_sample(&text) => Ok(()),
                Ok(_) => Err("no numeric samples yet".to_string()),
                Err(e) => {
                    debug!(error = %e, "mTLS metrics fetch failed; treating as not ready");
                    Err(e.to_string())
                }
            }
        })
        .deadline(timeout)
        .backoff(Backoff::Fixed(interval))
        .run()
        .await;

        result.is_ok()
    }

    /// In-pod metrics fetch with bounded backoff against an arbitrary address
    ///
    /// Used by scenarios probing endpoints that may be slow to appear (or
    /// expected never to appear). Returns the first non-empty payload, or
    /// `None` after exhausting the attempts.
    pub async fn fetch_metrics_with_backoff(
        &self,
        pod_name: &str,
        address: &str,
        port: i32,
        attempts: u32,
        delay: Duration,
    ) -> Option<String> {
        let command = format!(
            "curl -sS --connect-timeout {CONNECT_TIMEOUT_SECS} http://{address}:{port}/metrics || true"
        );

        let result: Result<String, String> = retry(|| {
            let command = command.clone();
            async move {
                match self
                    .exec_in_pod(
                        pod_name,
                        &self.settings.workload_namespace,
                        &command,
                        PULL_EXEC_TIMEOUT,
                    )
                    .await
                {
                    Ok(text) if !text.trim().is_empty() => Ok(text),
                    Ok(_) => Err(format!("empty response from {address}:{port}")),
                    Err(e) => {
                        debug!(
                            pod = %pod_name,
                            address = %address,
                            error = %e,
                            "Fetch attempt failed"
                        );
                        Err(e.to_string())
                    }
                }
            }
        })
        .attempts(attempts)
        .backoff(Backoff::Fixed(delay))
        .run()
        .await;

        result.ok()
    }
}
