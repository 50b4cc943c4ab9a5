//! Repository discovery: builds the work set for a run.
//!
//! Listing pages through the organization until a page shorter than the page
//! size comes back. A page that is exactly full always triggers one more
//! request, so an organization whose repository count is an exact multiple of
//! the page size ends with an empty page.

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use tracing::{debug, error, info};

use crate::config::DirectoryConfig;
use crate::contract::{HttpReply, RepositoryApi};
use crate::descriptor::{RepositoryDescriptor, RepositoryRecord, WorkSet};
use crate::error::DiscoveryError;
use crate::stats::Statistics;

pub struct DirectoryClient {
    api: Arc<dyn RepositoryApi>,
    config: DirectoryConfig,
    stats: OnceLock<Statistics>,
}

impl DirectoryClient {
    pub fn new(api: Arc<dyn RepositoryApi>, config: DirectoryConfig) -> Self {
        Self {
            api,
            config: config.normalised(),
            stats: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Lists every repository of `org`, or only `repo` when one is named.
    ///
    /// All descriptors of one call share the same capture timestamp.
    pub async fn list_repositories(
        &self,
        org: &str,
        repo: Option<&str>,
    ) -> Result<WorkSet, DiscoveryError> {
        let created_at = Utc::now();

        if let Some(repo) = repo {
            info!(org, repo, "Fetching single repository");
            let reply = self.api.get_repository(org, repo).await.map_err(|e| {
                error!(error = %e, org, repo, "Repository lookup failed");
                e
            })?;
            let record: RepositoryRecord = decode(reply)?;
            return Ok(vec![RepositoryDescriptor::from_record(record, created_at)]);
        }

        let page_size = self.config.page_size;
        let mut page = self.config.start_page;
        let mut work_set = WorkSet::new();

        loop {
            let reply = self
                .api
                .list_repositories_page(org, page_size, page)
                .await
                .map_err(|e| {
                    error!(error = %e, org, page, "Repository page request failed");
                    e
                })?;
            info!(org, page, status_code = reply.status, "fetch_repos");

            let records: Vec<RepositoryRecord> = decode(reply)?;
            let returned = records.len();
            debug!(org, page, returned, "Decoded repository page");

            work_set.extend(
                records
                    .into_iter()
                    .map(|r| RepositoryDescriptor::from_record(r, created_at)),
            );

            if returned < page_size as usize {
                break;
            }
            page += 1;
        }

        info!(org, repositories = work_set.len(), "Discovery complete");
        Ok(work_set)
    }

    /// Summary of a completed work set, computed on the first call only.
    pub fn stats(&self, work_set: &[RepositoryDescriptor]) -> &Statistics {
        self.stats.get_or_init(|| {
            let stats = Statistics::compute(work_set);
            debug!(
                total = stats.total,
                empty = stats.empty,
                errored = stats.errored,
                "Computed work set statistics"
            );
            stats
        })
    }
}

fn decode<T: serde::de::DeserializeOwned>(reply: HttpReply) -> Result<T, DiscoveryError> {
    if !reply.is_success() {
        error!(status_code = reply.status, body = %reply.body, "fetch_repos failed");
        return Err(DiscoveryError::Status {
            status: reply.status,
            body: reply.body,
        });
    }
    serde_json::from_str(&reply.body).map_err(|e| {
        error!(error = %e, "Failed to decode repository response");
        DiscoveryError::Decode(e.to_string())
    })
}
