use super::{AccessError, Context};
use futures::stream::{self, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, AttachParams};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, error, info};

/// Wall-clock limit on one traffic run inside a pod
const TRAFFIC_TIMEOUT: Duration = Duration::from_secs(60);

impl Context {
    /// Run a shell command in a pod, returning combined stdout+stderr
    ///
    /// The command is wrapped in `/bin/sh -c` and runs in the pod's first
    /// container. Both output streams are drained concurrently and handed
    /// back as one text - no stream separation is guaranteed. A call that
    /// outlives `timeout` is abandoned; whatever the pod produces afterwards
    /// is discarded.
    pub async fn exec_in_pod(
        &self,
        pod_name: &str,
        namespace: &str,
        command: &str,
        timeout: Duration,
    ) -> Result<String, AccessError> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);

        let attach_params = AttachParams {
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let shell = vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            command.to_string(),
        ];

        let exec = async {
            let mut attached = pods
                .exec(pod_name, shell, &attach_params)
                .await
                .map_err(|e| {
                    AccessError::Transport(format!("exec in '{namespace}/{pod_name}': {e}"))
                })?;

            let mut stdout = attached.stdout();
            let mut stderr = attached.stderr();

            let read_out = async {
                let mut text = String::new();
                if let Some(stream) = stdout.as_mut() {
                    let _ = stream.read_to_string(&mut text).await;
                }
                text
            };
            let read_err = async {
                let mut text = String::new();
                if let Some(stream) = stderr.as_mut() {
                    let _ = stream.read_to_string(&mut text).await;
                }
                text
            };

            let (mut out_text, err_text) = tokio::join!(read_out, read_err);
            out_text.push_str(&err_text);
            Ok::<String, AccessError>(out_text)
        };

        let output = match tokio::time::timeout(timeout, exec).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(AccessError::Transport(format!(
                    "exec in '{namespace}/{pod_name}' timed out after {timeout:?}"
                )))
            }
        };

        debug!(
            namespace = %namespace,
            pod = %pod_name,
            "Executed command in pod"
        );

        Ok(output)
    }

    /// Run the configured traffic command in one workload pod
    ///
    /// Never fails the round: an exec error is captured as `ERROR: ...`
    /// output text for the scenario report.
    pub async fn run_traffic(&self, pod_name: &str) -> String {
        info!(
            namespace = %self.settings.workload_namespace,
            pod = %pod_name,
            "Running traffic command in pod"
        );

        match self
            .exec_in_pod(
                pod_name,
                &self.settings.workload_namespace,
                &self.settings.traffic_command,
                TRAFFIC_TIMEOUT,
            )
            .await
        {
            Ok(output) => output,
            Err(e) => {
                error!(
                    namespace = %self.settings.workload_namespace,
                    pod = %pod_name,
                    error = %e,
                    "Traffic command failed in pod"
                );
                format!("ERROR: {e}")
            }
        }
    }

    /// Run the traffic command in every given pod concurrently
    ///
    /// Pod failures are tolerated per pod - the map always contains one
    /// entry per input pod, with error text where the exec failed.
    pub async fn exercise_traffic(&self, pod_names: &[String]) -> BTreeMap<String, String> {
        let cap = self.settings.worker_cap(pod_names.len());

        let pods: Vec<String> = pod_names.to_vec();

        stream::iter(pods)
            .map(|pod| async move {
                let output = self.run_traffic(&pod).await;
                (pod, output)
            })
            .buffer_unordered(cap)
            .collect()
            .await
    }
}
