//! Heal orchestrator.
//!
//! Three stages: retry the path's replay under a bounded policy, mark the path
//! broken on exhaustion, then re-discover the site and verify the replacement
//! path. Status moves `active → broken → healing → active | broken`.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::json;

use crate::error::{ScoutError, ScoutResult};
use crate::retry::RetryPolicy;
use crate::scout::{Scout, ScoutRequest};
use crate::store::Store;
use crate::types::{PathStatus, RunKind, RunRecord, RunStatus, ScoutedPath};
use crate::worker::{Worker, WorkerOutcome, WorkerRequest};

#[derive(Debug, Clone)]
pub struct HealRequest {
    pub path_id: String,
    /// What the caller saw fail; recorded with the "mark broken" run.
    pub error: Option<String>,
}

impl HealRequest {
    pub fn new(path_id: &str) -> Self {
        Self {
            path_id: path_id.to_string(),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealOutcome {
    pub healed: bool,
    /// Replacement path that replayed successfully.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_path_id: Option<String>,
    /// Replacement path that was persisted but failed verification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unverified_path_id: Option<String>,
}

/// Why a replay attempt did not count as a success.
#[derive(Debug)]
enum ReplayFailure {
    /// The worker answered `success: false` without raising.
    Soft(String),
    Error(ScoutError),
}

impl fmt::Display for ReplayFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplayFailure::Soft(message) => f.write_str(message),
            ReplayFailure::Error(e) => write!(f, "{e}"),
        }
    }
}

impl ReplayFailure {
    fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ReplayFailure::Error(ScoutError::Persistence { .. } | ScoutError::NotFound { .. })
        )
    }

    /// Collaborator failures that heal must not absorb.
    fn into_fatal(self) -> Option<ScoutError> {
        match self {
            ReplayFailure::Error(e @ (ScoutError::Persistence { .. } | ScoutError::NotFound { .. })) => {
                Some(e)
            }
            _ => None,
        }
    }
}

pub struct Healer {
    scout: Arc<Scout>,
    worker: Arc<Worker>,
    store: Arc<dyn Store>,
    policy: RetryPolicy,
}

impl Healer {
    pub fn new(scout: Arc<Scout>, worker: Arc<Worker>) -> Self {
        let store = Arc::clone(scout.store());
        Self {
            scout,
            worker,
            store,
            policy: RetryPolicy::heal_default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn replay(&self, path_id: &str) -> Result<WorkerOutcome, ReplayFailure> {
        match self.worker.run(&WorkerRequest::new(path_id)).await {
            Ok(outcome) if outcome.success => Ok(outcome),
            Ok(outcome) => Err(ReplayFailure::Soft(
                outcome
                    .response
                    .map(|r| r.as_str().map(str::to_string).unwrap_or_else(|| r.to_string()))
                    .unwrap_or_else(|| "replay unsuccessful".to_string()),
            )),
            Err(e) => Err(ReplayFailure::Error(e)),
        }
    }

    async fn transition(
        &self,
        path_id: &str,
        update: impl FnOnce(&mut ScoutedPath),
    ) -> ScoutResult<ScoutedPath> {
        let mut path = self.store.get_path(path_id).await?;
        update(&mut path);
        self.store.save_path(&path).await?;
        Ok(path)
    }

    async fn record(
        &self,
        path_id: &str,
        status: RunStatus,
        started: Instant,
        error: Option<String>,
        detail: serde_json::Value,
    ) -> ScoutResult<()> {
        let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let mut run = RunRecord::new(RunKind::Heal, status, elapsed)
            .for_path(path_id)
            .with_detail(detail);
        if let Some(error) = error {
            run = run.with_error(error);
        }
        self.store.save_run(&run).await
    }

    pub async fn heal(&self, request: &HealRequest) -> ScoutResult<HealOutcome> {
        let started = Instant::now();
        let path_id = request.path_id.as_str();
        // Unknown paths fail fast instead of burning retries.
        self.store.get_path(path_id).await?;
        tracing::info!("healing path {path_id}");

        // Stage 1: retry.
        let last_failure = match self
            .policy
            .run_while(|_| self.replay(path_id), ReplayFailure::is_retryable)
            .await
        {
            Ok(_) => {
                tracing::info!("path {path_id} replayed on retry, no heal needed");
                return Ok(HealOutcome {
                    healed: true,
                    ..Default::default()
                });
            }
            Err(failure) => failure,
        };
        let last_message = last_failure.to_string();
        if let Some(fatal) = last_failure.into_fatal() {
            return Err(fatal);
        }

        // Stage 2: mark broken.
        tracing::warn!(
            "path {path_id} failed {} attempts: {last_message}",
            self.policy.max_attempts()
        );
        let path = self
            .transition(path_id, |p| {
                p.status = PathStatus::Broken;
                p.fail_count += 1;
            })
            .await?;
        self.record(
            path_id,
            RunStatus::Failure,
            started,
            Some(request.error.clone().unwrap_or_else(|| last_message.clone())),
            json!({
                "stage": "retry",
                "attempts": self.policy.max_attempts(),
                "lastError": last_message,
            }),
        )
        .await?;

        // Stage 3: re-discover and verify.
        self.transition(path_id, |p| p.status = PathStatus::Healing).await?;
        let rediscovered = match self.store.get_site(&path.site_id).await {
            Ok(site) => {
                let scout_request = ScoutRequest::new(&site.url, &path.task).without_cache();
                self.scout.scout(&scout_request).await
            }
            Err(e) => Err(e),
        };
        let outcome = match rediscovered {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("re-discovery for path {path_id} failed: {e}");
                self.transition(path_id, |p| p.status = PathStatus::Broken).await?;
                return Err(e);
            }
        };

        let new_path_id = outcome.path_id;
        match self.replay(&new_path_id).await {
            Ok(_) => {
                self.transition(path_id, |p| {
                    p.status = PathStatus::Active;
                    p.heal_count += 1;
                })
                .await?;
                self.record(
                    path_id,
                    RunStatus::Success,
                    started,
                    None,
                    json!({ "stage": "verify", "newPathId": new_path_id }),
                )
                .await?;
                tracing::info!("path {path_id} healed via {new_path_id}");
                Ok(HealOutcome {
                    healed: true,
                    new_path_id: Some(new_path_id),
                    unverified_path_id: None,
                })
            }
            Err(failure) => {
                let message = failure.to_string();
                if let Some(fatal) = failure.into_fatal() {
                    self.transition(path_id, |p| p.status = PathStatus::Broken).await?;
                    return Err(fatal);
                }
                self.transition(path_id, |p| {
                    p.status = PathStatus::Broken;
                    p.fail_count += 1;
                    p.heal_count += 1;
                })
                .await?;
                self.record(
                    path_id,
                    RunStatus::Failure,
                    started,
                    Some(message),
                    json!({ "stage": "verify", "unverifiedPathId": new_path_id }),
                )
                .await?;
                tracing::warn!("replacement path {new_path_id} for {path_id} failed verification");
                Ok(HealOutcome {
                    healed: false,
                    new_path_id: None,
                    unverified_path_id: Some(new_path_id),
                })
            }
        }
    }
}
