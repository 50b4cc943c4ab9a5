//! `reqwest` implementation of [`RepositoryApi`] for the GitHub REST API.

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;

use crate::contract::{HttpReply, RepositoryApi};
use crate::error::TransportError;
use crate::http::{read_reply, DIRECTORY_TIMEOUT, USER_AGENT};

pub struct GitHubClient {
    client: Client,
    base_url: String,
    token: String,
}

impl GitHubClient {
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(DIRECTORY_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        tracing::info!(base_url, "Initialized GitHubClient");
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    pub fn repos_url(&self, org: &str, per_page: u32, page: u32) -> String {
        format!(
            "{}/users/{}/repos?per_page={}&page={}",
            self.base_url, org, per_page, page
        )
    }

    pub fn repo_url(&self, org: &str, repo: &str) -> String {
        format!("{}/repos/{}/{}", self.base_url, org, repo)
    }

    async fn get(&self, url: &str) -> Result<HttpReply, TransportError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, url, "error making http request");
                TransportError::new(url, e)
            })?;
        read_reply(url, response).await
    }
}

#[async_trait]
impl RepositoryApi for GitHubClient {
    async fn list_repositories_page(
        &self,
        org: &str,
        per_page: u32,
        page: u32,
    ) -> Result<HttpReply, TransportError> {
        self.get(&self.repos_url(org, per_page, page)).await
    }

    async fn get_repository(&self, org: &str, repo: &str) -> Result<HttpReply, TransportError> {
        self.get(&self.repo_url(org, repo)).await
    }

    async fn get_contributors(&self, url: &str) -> Result<HttpReply, TransportError> {
        self.get(url).await
    }
}
