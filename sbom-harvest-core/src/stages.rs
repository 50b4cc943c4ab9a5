//! Pipeline stage adapters.
//!
//! Each stage takes exclusive access to one descriptor, calls through to its
//! collaborator, and returns the next [`PipelineState`] or the [`StageError`]
//! that ends the item. No stage retries.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::contract::{
    Cloner, Codebase, Project, RepositoryApi, SbomGenerator, TrackingService,
    UploadAcknowledgement,
};
use crate::descriptor::{PipelineState, RepositoryDescriptor};
use crate::error::StageError;
use crate::session::PipelineCredentials;

const STATUS_OK: u16 = 200;
const STATUS_NO_CONTENT: u16 = 204;

/// Looks up the contributors side-channel of `descriptor`.
///
/// Only a 204 response confirms emptiness. A transport failure records an
/// error and answers `true`; any status other than 200/204 records an error
/// and answers `false`. Callers must consult [`RepositoryDescriptor::error`]
/// before trusting the answer.
pub async fn is_empty(api: &dyn RepositoryApi, descriptor: &mut RepositoryDescriptor) -> bool {
    let reply = match api.get_contributors(&descriptor.contributors_url).await {
        Ok(reply) => reply,
        Err(e) => {
            descriptor.fail(StageError::Probe(format!(
                "error retrieving contributors: {e}"
            )));
            return true;
        }
    };

    if reply.status != STATUS_OK && reply.status != STATUS_NO_CONTENT {
        descriptor.fail(StageError::Probe(format!(
            "unexpected response in is_empty: status_code: {} - {}",
            reply.status, reply.body
        )));
    }

    reply.status == STATUS_NO_CONTENT
}

/// `Discovered` to `Probed` or `Empty`.
pub async fn probe(
    api: &dyn RepositoryApi,
    descriptor: &mut RepositoryDescriptor,
) -> Result<PipelineState, StageError> {
    let empty = is_empty(api, descriptor).await;
    if let Some(err) = descriptor.error() {
        return Err(err.clone());
    }
    if empty {
        descriptor.is_empty = true;
        debug!(repo_name = %descriptor.name, repo_url = %descriptor.html_url, "skipping empty repo");
        return Ok(PipelineState::Empty);
    }
    Ok(PipelineState::Probed)
}

/// Address understood by the clone utility: `git::<url>.git`.
///
/// Returns `None` for a blank source URL.
pub fn clone_address(html_url: &str) -> Option<String> {
    let url = html_url.trim();
    let url = url.strip_prefix("git::").unwrap_or(url);
    if url.is_empty() {
        return None;
    }
    if url.ends_with(".git") {
        Some(format!("git::{url}"))
    } else {
        Some(format!("git::{url}.git"))
    }
}

/// Local destination for a clone. It must not exist before cloning.
pub fn clone_path(working_dir: &Path, name: &str) -> PathBuf {
    working_dir.join(name)
}

/// `Probed` to `Cloned`.
pub async fn clone_repository(
    cloner: &dyn Cloner,
    working_dir: &Path,
    descriptor: &mut RepositoryDescriptor,
) -> Result<PipelineState, StageError> {
    let address = clone_address(&descriptor.html_url).ok_or_else(|| {
        StageError::Clone(format!(
            "clone address cannot be blank: {}",
            descriptor.name
        ))
    })?;

    let destination = clone_path(working_dir, &descriptor.name);
    let exists = tokio::fs::try_exists(&destination).await.map_err(|e| {
        StageError::Clone(format!(
            "error checking destination {}: {e}",
            destination.display()
        ))
    })?;
    if exists {
        return Err(StageError::Clone(format!(
            "destination {} already exists",
            destination.display()
        )));
    }

    cloner
        .clone_repository(&address, &destination)
        .await
        .map_err(|e| {
            StageError::Clone(format!(
                "error cloning repo {} from {}: {}",
                descriptor.name, address, e
            ))
        })?;

    info!(
        repo_name = %descriptor.name,
        repo_url = %descriptor.html_url,
        path = %destination.display(),
        "finished cloning repo"
    );
    descriptor.clone_path = Some(destination);
    Ok(PipelineState::Cloned)
}

/// `Cloned` to `Generated`. An empty document is accepted here; the worker
/// rejects it.
pub async fn generate_sbom(
    generator: &dyn SbomGenerator,
    descriptor: &mut RepositoryDescriptor,
) -> Result<PipelineState, StageError> {
    let source = descriptor.clone_path.clone().ok_or_else(|| {
        StageError::Generate(format!("no local clone for {}", descriptor.name))
    })?;

    let sbom = generator
        .generate(&source)
        .await
        .map_err(|e| StageError::Generate(e.to_string()))?;

    debug!(repo_name = %descriptor.name, bytes = sbom.len(), "generated sbom");
    descriptor.sbom = Some(sbom);
    Ok(PipelineState::Generated)
}

/// Deletes the local clone. Failure is logged and otherwise ignored.
pub async fn remove_clone(descriptor: &mut RepositoryDescriptor) {
    let Some(path) = descriptor.clone_path.take() else {
        return;
    };
    remove_clone_dir(&path).await;
}

/// Deletes a clone directory. Failure is logged and otherwise ignored.
pub async fn remove_clone_dir(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed local clone"),
        Err(e) => warn!(error = %e, path = %path.display(), "Failed to remove local clone"),
    }
}

/// `Generated` to `Registered`: creates the project and its single codebase.
pub async fn register_project(
    tracking: &dyn TrackingService,
    credentials: &PipelineCredentials,
    descriptor: &mut RepositoryDescriptor,
) -> Result<PipelineState, StageError> {
    let language = descriptor.language.clone().unwrap_or_default();
    let request = Project {
        name: descriptor.name.clone(),
        codebases: vec![Codebase {
            name: descriptor.name.clone(),
            language,
            ..Default::default()
        }],
        ..Default::default()
    };

    let reply = tracking
        .create_project(&credentials.session_token, &credentials.team_id, &request)
        .await
        .map_err(|e| StageError::Register(e.to_string()))?;

    if !reply.is_success() {
        return Err(StageError::Register(format!(
            "error creating project: {}",
            reply.status_text
        )));
    }

    let project: Project = serde_json::from_str(&reply.body).map_err(|e| {
        StageError::Register(format!(
            "error unmarshalling create project response: {e}"
        ))
    })?;

    if project.id.is_empty() {
        return Err(StageError::Register("invalid project_id".to_string()));
    }
    let [codebase] = project.codebases.as_slice() else {
        return Err(StageError::Register(format!(
            "unexpected create project response: codebases length {}",
            project.codebases.len()
        )));
    };
    if codebase.id.is_empty() {
        return Err(StageError::Register("invalid codebase_id".to_string()));
    }

    info!(
        name = %project.name,
        project_id = %project.id,
        codebase_name = %codebase.name,
        codebase_id = %codebase.id,
        "project created"
    );
    descriptor.project_id = Some(project.id.clone());
    descriptor.codebase_id = Some(codebase.id.clone());
    Ok(PipelineState::Registered)
}

/// `Registered` to `Uploaded`. Status and status text are recorded on the
/// descriptor whether or not the upload succeeds.
pub async fn upload_sbom(
    tracking: &dyn TrackingService,
    credentials: &PipelineCredentials,
    descriptor: &mut RepositoryDescriptor,
) -> Result<PipelineState, StageError> {
    let (Some(project_id), Some(codebase_id), Some(sbom)) = (
        descriptor.project_id.as_deref(),
        descriptor.codebase_id.as_deref(),
        descriptor.sbom.as_deref(),
    ) else {
        return Err(StageError::Upload(format!(
            "{} is not registered or has no sbom",
            descriptor.name
        )));
    };

    info!(
        repo_name = %descriptor.name,
        team_id = %credentials.team_id,
        project_id,
        codebase_id,
        "attempting to upload"
    );
    let reply = tracking
        .upload_sbom(
            &credentials.upload_token,
            &credentials.team_id,
            project_id,
            codebase_id,
            sbom,
        )
        .await
        .map_err(|e| StageError::Upload(format!("error posting SBOM: {e}")))?;

    descriptor.status_code = Some(reply.status);
    descriptor.status_text = Some(reply.status_text.clone());

    if !reply.is_success() {
        return Err(StageError::Upload(format!(
            "unsuccessful SBOM upload {}: status_code {} - status {}",
            descriptor.name, reply.status, reply.status_text
        )));
    }

    let ack: UploadAcknowledgement = serde_json::from_str(&reply.body).map_err(|e| {
        StageError::Upload(format!("error unmarshalling SBOM upload response: {e}"))
    })?;
    descriptor.upload_response = Some(ack);
    Ok(PipelineState::Uploaded)
}
