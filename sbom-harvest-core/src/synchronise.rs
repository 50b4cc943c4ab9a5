//! High-level pipeline: discovers repositories and drives each one through
//! probe → clone → SBOM → register → upload on a bounded worker pool.
//!
//! # Major Types
//! - [`Orchestrator`]: owns the worker pool for one work set.
//! - [`SynchroniseReport`]: team, completed work set, statistics and the
//!   best-effort failures of a run.
//!
//! # Responsibilities
//! - Admission control: at most `worker_limit` items hold a slot at once. The
//!   slot is a semaphore permit owned by the worker task, so it is released
//!   on every exit path.
//! - Failure isolation: one item's error is recorded on that item only. The
//!   whole work set is always drained before returning.
//! - Aggregation: failures are collected after all workers finish, in
//!   work-set order.
//!
//! # Error Handling
//! Setup and discovery errors abort the run before any pipeline work. Item
//! errors come back as an [`AggregatedError`], which is fatal only when the
//! work set has exactly one item.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::{error, info, warn, Instrument};

use crate::config::HarvestConfig;
use crate::contract::{LoginRequest, Team};
use crate::descriptor::{PipelineState, RepositoryDescriptor, WorkSet};
use crate::directory::DirectoryClient;
use crate::error::{AggregatedError, DiscoveryError, StageError, SynchroniseError};
use crate::session::{establish_session, PipelineCredentials};
use crate::stages;
use crate::stats::Statistics;
use crate::worker::{Collaborators, Pipeline};

/// Completed work set plus the aggregate of its failures.
#[derive(Debug)]
pub struct RunOutcome {
    pub work_set: WorkSet,
    pub error: Option<AggregatedError>,
}

pub struct Orchestrator {
    pipeline: Arc<Pipeline>,
    worker_limit: usize,
}

impl Orchestrator {
    pub fn new(pipeline: Pipeline) -> Self {
        let worker_limit = pipeline.config().worker_limit.max(1);
        Self {
            pipeline: Arc::new(pipeline),
            worker_limit,
        }
    }

    pub fn worker_limit(&self) -> usize {
        self.worker_limit
    }

    /// Clone destination an aborted worker may have left behind. `None` when
    /// clones are kept or the directory predates this run.
    async fn leftover_clone(&self, descriptor: &RepositoryDescriptor) -> Option<PathBuf> {
        let config = self.pipeline.config();
        if config.keep_clones {
            return None;
        }
        let path = stages::clone_path(&config.working_dir, &descriptor.name);
        match tokio::fs::try_exists(&path).await {
            Ok(false) => Some(path),
            _ => None,
        }
    }

    /// Runs every item of `work_set` to an absorbing state.
    pub async fn run(&self, work_set: WorkSet, credentials: &PipelineCredentials) -> RunOutcome {
        let total = work_set.len();
        let slots = Arc::new(Semaphore::new(self.worker_limit));
        let credentials = Arc::new(credentials.clone());
        let mut in_flight = FuturesUnordered::new();
        let mut completed: Vec<(usize, RepositoryDescriptor)> = Vec::with_capacity(total);

        for (index, descriptor) in work_set.into_iter().enumerate() {
            let permit = match slots.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    let mut descriptor = descriptor;
                    descriptor.fail(StageError::Worker(e.to_string()));
                    completed.push((index, descriptor));
                    continue;
                }
            };

            // Kept so a panicking worker still leaves a record behind.
            let fallback = descriptor.clone();
            let leftover = self.leftover_clone(&descriptor).await;
            let pipeline = Arc::clone(&self.pipeline);
            let credentials = Arc::clone(&credentials);
            let span = tracing::info_span!("worker", index, repo_name = %descriptor.name);

            let handle = tokio::spawn(
                async move {
                    let _slot = permit;
                    pipeline.drive(descriptor, &credentials).await
                }
                .instrument(span),
            );

            in_flight.push(async move {
                match handle.await {
                    Ok(descriptor) => (index, descriptor),
                    Err(e) => {
                        error!(repo_name = %fallback.name, error = %e, "worker aborted");
                        if let Some(path) = leftover {
                            stages::remove_clone_dir(&path).await;
                        }
                        let mut descriptor = fallback;
                        descriptor.fail(StageError::Worker(e.to_string()));
                        (index, descriptor)
                    }
                }
            });

            // Drain whatever already finished so completion logs stay timely.
            while let Some(Some(done)) = futures::FutureExt::now_or_never(in_flight.next()) {
                log_completion(&done);
                completed.push(done);
            }
        }

        while let Some(done) = in_flight.next().await {
            log_completion(&done);
            completed.push(done);
        }

        completed.sort_by_key(|(index, _)| *index);
        let work_set: WorkSet = completed.into_iter().map(|(_, d)| d).collect();
        let failures = work_set
            .iter()
            .filter_map(|d| d.error().map(|e| (d.name.clone(), e.clone())))
            .collect();

        RunOutcome {
            work_set,
            error: AggregatedError::from_failures(failures),
        }
    }
}

fn log_completion((index, descriptor): &(usize, RepositoryDescriptor)) {
    info!(
        index,
        repo_name = %descriptor.name,
        state = descriptor.state.name(),
        "finished processing result"
    );
}

/// Outcome of a whole harvest run.
#[derive(Debug)]
pub struct SynchroniseReport {
    pub team: Team,
    pub work_set: WorkSet,
    pub statistics: Statistics,
    /// Item failures of a multi-repository run; the run itself still succeeded.
    pub error: Option<AggregatedError>,
}

impl SynchroniseReport {
    pub fn success_count(&self) -> usize {
        self.work_set
            .iter()
            .filter(|d| d.state == PipelineState::Uploaded)
            .count()
    }

    pub fn failures(&self) -> Vec<&RepositoryDescriptor> {
        self.work_set.iter().filter(|d| d.error().is_some()).collect()
    }
}

impl fmt::Display for SynchroniseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Team: {} ({})", self.team.name, self.team.id)?;
        writeln!(
            f,
            "Repositories: {} total, {} uploaded, {} empty, {} failed",
            self.statistics.total,
            self.success_count(),
            self.statistics.empty,
            self.statistics.errored
        )?;
        for (language, count) in &self.statistics.languages {
            writeln!(f, "  {language}: {count}")?;
        }
        for d in &self.work_set {
            write!(f, "- {} [{}] {}", d.name, d.language_or_default(), d.state.name())?;
            if let Some(status) = &d.status_text {
                write!(f, " ({status})")?;
            }
            if let Some(err) = d.error() {
                write!(f, ": {err}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Entrypoint: sets up the team, discovers repositories and runs the pipeline.
pub async fn synchronise(
    config: &HarvestConfig,
    login: &LoginRequest,
    collaborators: Collaborators,
) -> Result<SynchroniseReport, SynchroniseError> {
    config.trace_loaded();
    info!(org = %config.org, "[SYNC] Starting harvest");

    let (team, credentials) =
        establish_session(collaborators.tracking.as_ref(), login, &config.org)
            .await
            .map_err(|e| {
                error!(error = %e, "[SYNC][ERROR] error building harbor");
                e
            })?;

    let directory = DirectoryClient::new(
        Arc::clone(&collaborators.repository_api),
        config.directory.clone(),
    );
    let work_set = directory
        .list_repositories(&config.org, config.repo.as_deref())
        .await
        .map_err(|e| {
            error!(error = %e, "[SYNC][ERROR] error fetching repos");
            e
        })?;
    if work_set.is_empty() {
        error!(org = %config.org, "[SYNC][ERROR] no results");
        return Err(DiscoveryError::NoRepositories {
            org: config.org.clone(),
        }
        .into());
    }

    let orchestrator = Orchestrator::new(Pipeline::new(collaborators, config.pipeline.clone()));
    let outcome = orchestrator.run(work_set, &credentials).await;
    let statistics = directory.stats(&outcome.work_set).clone();

    if let Some(err) = &outcome.error {
        error!(failed = err.len(), error = %err, "[SYNC] generator complete with errors");
        if outcome.work_set.len() == 1 {
            return Err(SynchroniseError::Repository(err.clone()));
        }
        warn!(
            failed = err.len(),
            total = outcome.work_set.len(),
            "[SYNC] continuing despite repository failures"
        );
    } else {
        info!("[SYNC] generator complete");
    }

    Ok(SynchroniseReport {
        team,
        work_set: outcome.work_set,
        statistics,
        error: outcome.error,
    })
}
