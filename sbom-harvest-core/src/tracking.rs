//! `reqwest` implementation of the tracking-service port (Harbor API).
//!
//! All calls are `POST`s with a JSON content type. The `Authorization` header
//! carries the token verbatim, without a scheme prefix, and is omitted for
//! login. Uploads get a longer per-request timeout than the other calls.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;

use crate::contract::{HttpReply, LoginRequest, Project, Team, TrackingService};
use crate::error::TransportError;
use crate::http::{read_reply, JSON_CONTENT_TYPE, TRACKING_TIMEOUT, UPLOAD_TIMEOUT, USER_AGENT};

pub struct HarborClient {
    client: Client,
    api_base_url: String,
}

impl HarborClient {
    /// `api_base_url` is the versioned API root, e.g. `https://host/api/v1`.
    pub fn new(api_base_url: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(TRACKING_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        tracing::info!(api_base_url, "Initialized HarborClient");
        Ok(Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn login_url(&self) -> String {
        format!("{}/login", self.api_base_url)
    }

    pub fn create_team_url(&self) -> String {
        format!("{}/team?children=true", self.api_base_url)
    }

    pub fn create_project_url(&self, team_id: &str) -> String {
        format!("{}/project?teamId={}&children=true", self.api_base_url, team_id)
    }

    pub fn upload_url(&self, team_id: &str, project_id: &str, codebase_id: &str) -> String {
        format!(
            "{}/{}/{}/{}/sbom",
            self.api_base_url, team_id, project_id, codebase_id
        )
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        token: Option<&str>,
        body: &T,
    ) -> Result<HttpReply, TransportError> {
        let body = serde_json::to_vec(body)
            .map_err(|e| TransportError::new(url, format!("error marshalling request: {e}")))?;
        self.post(url, token, body, None).await
    }

    async fn post(
        &self,
        url: &str,
        token: Option<&str>,
        body: Vec<u8>,
        timeout: Option<std::time::Duration>,
    ) -> Result<HttpReply, TransportError> {
        let mut request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .body(body);
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            request = request.header(AUTHORIZATION, token);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(error = ?e, url, "error posting to harbor");
            TransportError::new(url, e)
        })?;
        read_reply(url, response).await
    }
}

#[async_trait]
impl TrackingService for HarborClient {
    async fn login(&self, request: &LoginRequest) -> Result<HttpReply, TransportError> {
        let url = self.login_url();
        tracing::info!(login_url = %url, "attempting to login to api");
        self.post_json(&url, None, request).await
    }

    async fn create_team(
        &self,
        session_token: &str,
        team: &Team,
    ) -> Result<HttpReply, TransportError> {
        self.post_json(&self.create_team_url(), Some(session_token), team)
            .await
    }

    async fn create_project(
        &self,
        session_token: &str,
        team_id: &str,
        project: &Project,
    ) -> Result<HttpReply, TransportError> {
        self.post_json(&self.create_project_url(team_id), Some(session_token), project)
            .await
    }

    async fn upload_sbom(
        &self,
        upload_token: &str,
        team_id: &str,
        project_id: &str,
        codebase_id: &str,
        sbom: &str,
    ) -> Result<HttpReply, TransportError> {
        let url = self.upload_url(team_id, project_id, codebase_id);
        tracing::info!(url = %url, bytes = sbom.len(), "attempting to upload");
        self.post(
            &url,
            Some(upload_token),
            sbom.as_bytes().to_vec(),
            Some(UPLOAD_TIMEOUT),
        )
        .await
    }
}
