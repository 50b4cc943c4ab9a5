//! # contract: ports between the pipeline and the outside world
//!
//! The pipeline talks to four collaborators, each behind a trait so that real
//! clients and test doubles are interchangeable:
//!
//! - [`RepositoryApi`]: the repository-hosting API (listing, single lookup,
//!   contributors side-channel used for the emptiness probe).
//! - [`TrackingService`]: the service that records teams, projects and
//!   codebases and stores uploaded SBOMs.
//! - [`Cloner`]: materialises a repository working tree on local disk.
//! - [`SbomGenerator`]: turns a local working tree into an SBOM document.
//!
//! ## Transport contract
//! HTTP ports return an [`HttpReply`] for *any* response that was received,
//! whatever its status. Status interpretation and body decoding happen in the
//! core so that the rules are the same for every implementation. Only failing
//! to obtain a response at all is a [`TransportError`].
//!
//! ## Mocking & Testing
//! Every trait is annotated for `mockall`; the `test-export-mocks` feature
//! (on by default) exports the generated `Mock*` types to integration tests.

use std::path::Path;

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// A received HTTP response, reduced to what the pipeline inspects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    /// Canonical reason phrase, e.g. `"200 OK"`.
    pub status_text: String,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            status_text: status_text(status),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Same rendering as a live response: `"200 OK"`, or the bare number when the
/// code is out of range.
fn status_text(status: u16) -> String {
    reqwest::StatusCode::from_u16(status)
        .map(|code| code.to_string())
        .unwrap_or_else(|_| status.to_string())
}

/// Repository-hosting API.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait RepositoryApi: Send + Sync {
    /// `GET /users/{org}/repos?per_page={per_page}&page={page}`
    async fn list_repositories_page(
        &self,
        org: &str,
        per_page: u32,
        page: u32,
    ) -> Result<HttpReply, TransportError>;

    /// `GET /repos/{org}/{repo}`
    async fn get_repository(&self, org: &str, repo: &str) -> Result<HttpReply, TransportError>;

    /// `GET {contributors_url}`; 204 means the repository has no content.
    async fn get_contributors(&self, url: &str) -> Result<HttpReply, TransportError>;
}

/// Tracking service holding teams, projects, codebases and their SBOMs.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait TrackingService: Send + Sync {
    /// `POST /login`
    async fn login(&self, request: &LoginRequest) -> Result<HttpReply, TransportError>;

    /// `POST /team?children=true`
    async fn create_team(&self, session_token: &str, team: &Team)
        -> Result<HttpReply, TransportError>;

    /// `POST /project?teamId={team_id}&children=true`
    async fn create_project(
        &self,
        session_token: &str,
        team_id: &str,
        project: &Project,
    ) -> Result<HttpReply, TransportError>;

    /// `POST /{team_id}/{project_id}/{codebase_id}/sbom` with the raw SBOM body.
    async fn upload_sbom(
        &self,
        upload_token: &str,
        team_id: &str,
        project_id: &str,
        codebase_id: &str,
        sbom: &str,
    ) -> Result<HttpReply, TransportError>;
}

/// Error type for the subprocess-backed ports.
pub type ToolError = Box<dyn std::error::Error + Send + Sync>;

/// Materialises a repository at `destination`, which must not already exist.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Cloner: Send + Sync {
    async fn clone_repository(&self, address: &str, destination: &Path) -> Result<(), ToolError>;
}

/// Produces a serialized SBOM for a local source tree.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait SbomGenerator: Send + Sync {
    async fn generate(&self, source_path: &Path) -> Result<String, ToolError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub tokens: Vec<Token>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub is_team_lead: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub fisma: String,
    #[serde(default)]
    pub codebases: Vec<Codebase>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Codebase {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub build_tool: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub token: String,
}

/// Acknowledgement returned by a successful SBOM upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadAcknowledgement {
    pub valid: bool,
    #[serde(rename = "s3BucketName", default)]
    pub storage_bucket: String,
    #[serde(rename = "s3ObjectKey", default)]
    pub storage_key: String,
}
