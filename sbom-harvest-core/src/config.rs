use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, info};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const DEFAULT_WORKING_DIR: &str = "/tmp";
pub const DEFAULT_WORKER_LIMIT: usize = 10;
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Languages the SBOM tool is known to handle.
pub const DEFAULT_TARGET_LANGUAGES: &[&str] = &[
    "Java",
    "Python",
    "Jinja",
    "XSLT",
    "Ruby",
    "SAS",
    "Groovy",
    "JavaScript",
    "Vue",
    "Shell",
    "Go",
    "TypeScript",
    "HCL",
];

/// How discovery pages through the organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub page_size: u32,
    pub start_page: u32,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            start_page: DEFAULT_PAGE,
        }
    }
}

impl DirectoryConfig {
    /// Zero values fall back to the defaults.
    pub fn normalised(self) -> Self {
        Self {
            page_size: if self.page_size == 0 {
                DEFAULT_PAGE_SIZE
            } else {
                self.page_size
            },
            start_page: if self.start_page == 0 {
                DEFAULT_PAGE
            } else {
                self.start_page
            },
        }
    }
}

/// Settings for the per-item pipeline and its worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub working_dir: PathBuf,
    pub worker_limit: usize,
    pub target_languages: BTreeSet<String>,
    /// Leave local clones on disk after SBOM generation.
    pub keep_clones: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from(DEFAULT_WORKING_DIR),
            worker_limit: DEFAULT_WORKER_LIMIT,
            target_languages: DEFAULT_TARGET_LANGUAGES
                .iter()
                .map(|l| l.to_string())
                .collect(),
            keep_clones: false,
        }
    }
}

impl PipelineConfig {
    pub fn is_target_language(&self, language: Option<&str>) -> bool {
        language.is_some_and(|l| self.target_languages.contains(l))
    }

    pub fn trace_loaded(&self) {
        info!(
            working_dir = %self.working_dir.display(),
            worker_limit = self.worker_limit,
            target_languages = self.target_languages.len(),
            keep_clones = self.keep_clones,
            "Loaded PipelineConfig"
        );
        debug!(?self, "PipelineConfig loaded (full debug)");
    }
}

/// Everything one harvest run needs, secrets excluded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestConfig {
    pub org: String,
    /// Harvest this single repository instead of the whole organization.
    pub repo: Option<String>,
    pub directory: DirectoryConfig,
    pub pipeline: PipelineConfig,
}

impl HarvestConfig {
    pub fn trace_loaded(&self) {
        info!(
            org = %self.org,
            repo = self.repo.as_deref().unwrap_or("<all>"),
            page_size = self.directory.page_size,
            start_page = self.directory.start_page,
            "Loaded HarvestConfig"
        );
        self.pipeline.trace_loaded();
    }
}
