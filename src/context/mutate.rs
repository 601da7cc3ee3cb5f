use super::types::{MutationOutcome, PatchIntent, PatchOutcome, Snapshot};
use super::Context;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::future::Future;
use tracing::{error, info, warn};

/// Fan out patches with bounded parallelism and roll back on partial failure
///
/// The core of the mutation orchestrator, parameterized over the patch and
/// restore operations so its atomicity policy is testable without a cluster.
/// All patches are submitted through a `buffer_unordered` pool of width
/// `cap`; completion order is unspecified and results are aggregated only
/// after each worker's future resolves. If any patch fails (error or
/// validation rejection), every already-applied resource is restored before
/// the outcome is returned - a failed setup step must never leave the
/// cluster half-mutated. Restore failures are logged, never masking the
/// original failure. On total success nothing is restored: the caller keeps
/// its snapshots for the scenario's own end-of-test restore.
pub async fn apply_with_rollback<P, PFut, R, RFut>(
    intents: Vec<PatchIntent>,
    cap: usize,
    patch: P,
    restore: R,
) -> MutationOutcome
where
    P: Fn(PatchIntent) -> PFut,
    PFut: Future<Output = Result<PatchOutcome, String>>,
    R: Fn(String) -> RFut,
    RFut: Future<Output = Result<(), String>>,
{
    let patch = &patch;
    let results: Vec<(String, Result<PatchOutcome, String>)> = stream::iter(intents)
        .map(|intent| async move {
            let name = intent.name.clone();
            (name, patch(intent).await)
        })
        .buffer_unordered(cap.max(1))
        .collect()
        .await;

    let mut outcome = MutationOutcome::default();
    for (name, result) in results {
        match result {
            Ok(PatchOutcome::Applied) => outcome.succeeded.push(name),
            Ok(PatchOutcome::Rejected { status, body }) => {
                let reason = format!("rejected ({status}): {body}");
                outcome.rejected.insert(name.clone(), reason.clone());
                outcome.failed.insert(name, reason);
            }
            Err(e) => {
                outcome.failed.insert(name, e);
            }
        }
    }

    if !outcome.failed.is_empty() && !outcome.succeeded.is_empty() {
        warn!(
            failed = outcome.failed.len(),
            applied = outcome.succeeded.len(),
            "Partial mutation failure; rolling back applied patches"
        );
        for name in &outcome.succeeded {
            if let Err(e) = restore(name.clone()).await {
                error!(name = %name, error = %e, "Rollback failed");
            }
        }
    }

    outcome
}

impl Context {
    /// Concurrently patch NetworkConfigs, rolling back on partial failure
    ///
    /// Parallelism is `min(settings.max_workers, max(2, intents.len()))`.
    /// Rollback restores each applied resource from its entry in
    /// `snapshots` via the conflict-safe replace.
    pub async fn mutate_configs(
        &self,
        intents: Vec<PatchIntent>,
        snapshots: &[Snapshot],
    ) -> MutationOutcome {
        let cap = self.settings.worker_cap(intents.len());
        let by_name: BTreeMap<&str, &serde_json::Value> = snapshots
            .iter()
            .map(|s| (s.name.as_str(), &s.document))
            .collect();

        info!(
            namespace = %self.settings.config_namespace,
            count = intents.len(),
            workers = cap,
            "Applying mutation round"
        );

        let by_name = &by_name;
        apply_with_rollback(
            intents,
            cap,
            |intent| async move {
                self.patch_config(&intent.name, &intent.body)
                    .await
                    .map_err(|e| e.to_string())
            },
            |name| async move {
                match by_name.get(name.as_str()) {
                    Some(doc) => self
                        .replace_with_retry(&name, (*doc).clone())
                        .await
                        .map_err(|e| e.to_string()),
                    None => Err(format!("no snapshot for '{name}'")),
                }
            },
        )
        .await
    }
}
