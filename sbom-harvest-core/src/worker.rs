//! Drives one descriptor through the stage sequence.
//!
//! ```text
//! Discovered -> Probed -> Cloned -> Generated -> Registered -> Uploaded
//!     |           |         |          |             |
//!     +-> Empty   +---------+----------+-------------+--> Failed(cause)
//! ```
//! Admission policy (language allow-list, archived/disabled) runs first and
//! moves rejected items straight to `Skipped`.

use std::sync::Arc;

use tracing::{error, info};

use crate::config::PipelineConfig;
use crate::contract::{Cloner, RepositoryApi, SbomGenerator, TrackingService};
use crate::descriptor::{PipelineState, RepositoryDescriptor, SkipReason};
use crate::error::StageError;
use crate::session::PipelineCredentials;
use crate::stages;

/// The collaborators a run needs, shared by every worker.
#[derive(Clone)]
pub struct Collaborators {
    pub repository_api: Arc<dyn RepositoryApi>,
    pub tracking: Arc<dyn TrackingService>,
    pub cloner: Arc<dyn Cloner>,
    pub generator: Arc<dyn SbomGenerator>,
}

pub struct Pipeline {
    collaborators: Collaborators,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(collaborators: Collaborators, config: PipelineConfig) -> Self {
        Self {
            collaborators,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Reason to leave `descriptor` out of the run, if any.
    pub fn admission(&self, descriptor: &RepositoryDescriptor) -> Option<SkipReason> {
        if !self.config.is_target_language(descriptor.language.as_deref()) {
            return Some(SkipReason::UnsupportedLanguage(
                descriptor.language_or_default().to_string(),
            ));
        }
        if descriptor.archived {
            return Some(SkipReason::Archived);
        }
        if descriptor.disabled {
            return Some(SkipReason::Disabled);
        }
        None
    }

    /// Performs the single transition out of the current state.
    pub async fn step(
        &self,
        descriptor: &mut RepositoryDescriptor,
        credentials: &PipelineCredentials,
    ) {
        let c = &self.collaborators;
        let stage = descriptor.state.name();
        let result = match descriptor.state {
            PipelineState::Discovered => stages::probe(c.repository_api.as_ref(), descriptor).await,
            PipelineState::Probed => {
                stages::clone_repository(c.cloner.as_ref(), &self.config.working_dir, descriptor)
                    .await
            }
            PipelineState::Cloned => {
                let generated = stages::generate_sbom(c.generator.as_ref(), descriptor).await;
                if !self.config.keep_clones {
                    stages::remove_clone(descriptor).await;
                }
                generated.and_then(|next| match descriptor.sbom.as_deref() {
                    Some(sbom) if !sbom.trim().is_empty() => Ok(next),
                    _ => Err(StageError::Generate(format!(
                        "empty SBOM for {}",
                        descriptor.name
                    ))),
                })
            }
            PipelineState::Generated => {
                stages::register_project(c.tracking.as_ref(), credentials, descriptor).await
            }
            PipelineState::Registered => {
                stages::upload_sbom(c.tracking.as_ref(), credentials, descriptor).await
            }
            _ => return,
        };

        match result {
            Ok(next) => descriptor.advance(next),
            Err(e) => {
                error!(
                    repo_name = %descriptor.name,
                    stage,
                    error = %e,
                    "stage failed"
                );
                descriptor.fail(e);
            }
        }
    }

    /// Runs `descriptor` until it reaches an absorbing state.
    pub async fn drive(
        &self,
        mut descriptor: RepositoryDescriptor,
        credentials: &PipelineCredentials,
    ) -> RepositoryDescriptor {
        if descriptor.state == PipelineState::Discovered {
            if let Some(reason) = self.admission(&descriptor) {
                info!(repo_name = %descriptor.name, %reason, "skipping repository");
                descriptor.advance(PipelineState::Skipped(reason));
                return descriptor;
            }
        }

        info!(
            repo_name = %descriptor.name,
            language = descriptor.language_or_default(),
            "processing result"
        );
        while !descriptor.state.is_terminal() {
            self.step(&mut descriptor, credentials).await;
        }
        descriptor
    }
}
