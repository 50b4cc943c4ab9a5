//! Subprocess-backed ports: `git` for cloning, `syft` for SBOM generation.

use std::path::Path;
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;

use crate::contract::{Cloner, SbomGenerator, ToolError};

/// Output format passed to the SBOM tool.
pub const SBOM_FORMAT: &str = "cyclonedx-json";

/// Shallow `git clone` of the default branch.
pub struct GitCloner {
    program: String,
}

impl GitCloner {
    pub fn new() -> Self {
        Self::with_program("git")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for GitCloner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cloner for GitCloner {
    async fn clone_repository(&self, address: &str, destination: &Path) -> Result<(), ToolError> {
        let url = address.strip_prefix("git::").unwrap_or(address);

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                tracing::error!(error = ?e, path = %parent.display(), "Failed to create working directory");
                e
            })?;
        }

        let output = Command::new(&self.program)
            .arg("clone")
            .arg("--depth")
            .arg("1")
            .arg(url)
            .arg(destination)
            .output()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, repo_url = url, "Failed to launch git process");
                e
            })?;

        check_status(&self.program, &output)?;
        tracing::debug!(repo_url = url, path = %destination.display(), "Successfully cloned git repository");
        Ok(())
    }
}

/// Runs `syft --output cyclonedx-json <path>` and captures stdout.
pub struct SyftGenerator {
    program: String,
}

impl SyftGenerator {
    pub fn new() -> Self {
        Self::with_program("syft")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for SyftGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SbomGenerator for SyftGenerator {
    async fn generate(&self, source_path: &Path) -> Result<String, ToolError> {
        let output = Command::new(&self.program)
            .arg("--output")
            .arg(SBOM_FORMAT)
            .arg(source_path)
            .output()
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, path = %source_path.display(), "Failed to launch sbom tool");
                e
            })?;

        check_status(&self.program, &output)?;
        Ok(String::from_utf8(output.stdout)?)
    }
}

fn check_status(program: &str, output: &Output) -> Result<(), ToolError> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    tracing::error!(program, status = %output.status, stderr = %stderr.trim(), "Tool exited with non-zero code");
    Err(format!("{program} exited with {}: {}", output.status, stderr.trim()).into())
}
