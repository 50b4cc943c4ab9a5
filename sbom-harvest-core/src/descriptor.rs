//! Per-repository record carried through the pipeline.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::contract::UploadAcknowledgement;
use crate::error::StageError;

/// Language bucket used when the hosting API reports no language.
pub const LANGUAGE_NOT_SPECIFIED: &str = "Not specified";

/// Repository as returned by the hosting API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub name: String,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub contributors_url: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub archived: Option<bool>,
    #[serde(default)]
    pub disabled: Option<bool>,
}

/// Why an item was left out of the pipeline without being an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    UnsupportedLanguage(String),
    Archived,
    Disabled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnsupportedLanguage(lang) => write!(f, "unsupported language {lang}"),
            SkipReason::Archived => f.write_str("archived"),
            SkipReason::Disabled => f.write_str("disabled"),
        }
    }
}

/// Position of an item in the pipeline.
///
/// `Empty`, `Skipped`, `Uploaded` and `Failed` are absorbing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Discovered,
    Probed,
    Empty,
    Skipped(SkipReason),
    Cloned,
    Generated,
    Registered,
    Uploaded,
    Failed(StageError),
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineState::Empty
                | PipelineState::Skipped(_)
                | PipelineState::Uploaded
                | PipelineState::Failed(_)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Discovered => "discovered",
            PipelineState::Probed => "probed",
            PipelineState::Empty => "empty",
            PipelineState::Skipped(_) => "skipped",
            PipelineState::Cloned => "cloned",
            PipelineState::Generated => "generated",
            PipelineState::Registered => "registered",
            PipelineState::Uploaded => "uploaded",
            PipelineState::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryDescriptor {
    pub name: String,
    pub html_url: String,
    pub contributors_url: String,
    pub language: Option<String>,
    pub archived: bool,
    pub disabled: bool,
    /// Capture time shared by every descriptor of one discovery.
    pub created_at: DateTime<Utc>,

    pub is_empty: bool,
    pub clone_path: Option<PathBuf>,
    pub sbom: Option<String>,
    pub project_id: Option<String>,
    pub codebase_id: Option<String>,
    pub status_code: Option<u16>,
    pub status_text: Option<String>,
    pub upload_response: Option<UploadAcknowledgement>,
    pub state: PipelineState,
}

impl RepositoryDescriptor {
    pub fn from_record(record: RepositoryRecord, created_at: DateTime<Utc>) -> Self {
        Self {
            name: record.name,
            html_url: record.html_url,
            contributors_url: record.contributors_url,
            language: record.language.filter(|l| !l.is_empty()),
            archived: record.archived.unwrap_or(false),
            disabled: record.disabled.unwrap_or(false),
            created_at,
            is_empty: false,
            clone_path: None,
            sbom: None,
            project_id: None,
            codebase_id: None,
            status_code: None,
            status_text: None,
            upload_response: None,
            state: PipelineState::Discovered,
        }
    }

    /// Language tag, or [`LANGUAGE_NOT_SPECIFIED`] when the API left it unset.
    pub fn language_or_default(&self) -> &str {
        self.language.as_deref().unwrap_or(LANGUAGE_NOT_SPECIFIED)
    }

    pub fn error(&self) -> Option<&StageError> {
        match &self.state {
            PipelineState::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Records a terminal error. The first failure wins.
    pub fn fail(&mut self, err: StageError) {
        if self.error().is_none() {
            self.state = PipelineState::Failed(err);
        }
    }

    /// Moves to `next` unless the item already reached an absorbing state.
    pub fn advance(&mut self, next: PipelineState) {
        if !self.state.is_terminal() {
            self.state = next;
        }
    }
}

/// Ordered collection of descriptors for one run.
pub type WorkSet = Vec<RepositoryDescriptor>;
