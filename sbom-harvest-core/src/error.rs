//! Error taxonomy for a harvest run.
//!
//! Two kinds of failure exist:
//! - run-level errors ([`DiscoveryError`], [`SetupError`]) abort the run before
//!   any pipeline work starts;
//! - per-item errors ([`StageError`]) are recorded on the owning descriptor and
//!   only resurface collectively through [`AggregatedError`].

use std::fmt;

/// Failure to complete an HTTP exchange at all (connect, timeout, body read).
#[derive(Debug, Clone, thiserror::Error)]
#[error("transport error calling {url}: {reason}")]
pub struct TransportError {
    pub url: String,
    pub reason: String,
}

impl TransportError {
    pub fn new(url: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}

/// Fatal to discovery: no partial work set is ever returned.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("error making http request: {0}")]
    Transport(#[from] TransportError),

    #[error("error in fetch_repos: status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("error unmarshalling response body: {0}")]
    Decode(String),

    #[error("no repositories found for {org}")]
    NoRepositories { org: String },
}

/// Login or team creation against the tracking service failed.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("error logging in: {0}")]
    Login(String),

    #[error("error creating team: {0}")]
    Team(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Terminal per-item failure. The variant names the stage that failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StageError {
    #[error("probe failed: {0}")]
    Probe(String),

    #[error("clone failed: {0}")]
    Clone(String),

    #[error("sbom generation failed: {0}")]
    Generate(String),

    #[error("project registration failed: {0}")]
    Register(String),

    #[error("sbom upload failed: {0}")]
    Upload(String),

    #[error("worker aborted: {0}")]
    Worker(String),
}

/// Every failed item of a run, in work-set order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedError {
    pub failures: Vec<(String, StageError)>,
}

impl AggregatedError {
    /// Returns `None` when nothing failed.
    pub fn from_failures(failures: Vec<(String, StageError)>) -> Option<Self> {
        if failures.is_empty() {
            None
        } else {
            Some(Self { failures })
        }
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for AggregatedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} repositories failed:", self.failures.len())?;
        for (name, err) in &self.failures {
            writeln!(f, "\t* {name}: {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregatedError {}

/// Top-level result of [`crate::synchronise::synchronise`].
#[derive(Debug, thiserror::Error)]
pub enum SynchroniseError {
    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// Single-repository runs promote the item's failure to the whole run.
    #[error("single repository run failed: {0}")]
    Repository(AggregatedError),
}
