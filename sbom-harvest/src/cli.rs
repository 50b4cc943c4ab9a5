/// # sbom-harvest CLI Interface (Module)
///
/// Command parsing and the composition root: wires the concrete GitHub,
/// tracking-service and subprocess adapters into the core pipeline.
///
/// All business logic (discovery, stages, orchestration) lives in
/// [`sbom_harvest_core`]. This module is strictly CLI glue.
///
/// ## How To Use
/// - Command line: `sbom-harvest generate --org <ORG> [--repo <REPO>] [--config <PATH>]`
/// - Programmatic and integration use: call [`run`] with a constructed [`Cli`].
use crate::load_config::{load_config, CliConfig};
use anyhow::Result;
use clap::{Parser, Subcommand};
use sbom_harvest_core::github::GitHubClient;
use sbom_harvest_core::synchronise::synchronise;
use sbom_harvest_core::tools::{GitCloner, SyftGenerator};
use sbom_harvest_core::tracking::HarborClient;
use sbom_harvest_core::worker::Collaborators;
use std::path::PathBuf;
use std::sync::Arc;

/// CLI for sbom-harvest: generate and upload SBOMs for an organization's repositories.
#[derive(Parser)]
#[clap(
    name = "sbom-harvest",
    version,
    about = "Generate SBOMs for every repository of a GitHub organization and upload them to Harbor"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Discover repositories, generate their SBOMs and upload them
    Generate {
        /// GitHub organization (or user) to harvest
        #[clap(long, env = "GITHUB_ORG")]
        org: String,

        /// Harvest only this repository
        #[clap(long, env = "GITHUB_REPO")]
        repo: Option<String>,

        /// Path to an optional YAML settings file
        #[clap(long)]
        config: Option<PathBuf>,
    },
}

/// Builds the production collaborators from a loaded configuration.
pub fn build_collaborators(config: &CliConfig) -> Result<Collaborators> {
    let github = GitHubClient::new(&config.github_api_url, config.fetch_token.clone())?;
    let harbor = HarborClient::new(&config.harbor_api_url)?;
    Ok(Collaborators {
        repository_api: Arc::new(github),
        tracking: Arc::new(harbor),
        cloner: Arc::new(GitCloner::new()),
        generator: Arc::new(SyftGenerator::new()),
    })
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Generate { org, repo, config } => {
            let config = load_config(&org, repo, config.as_deref())?;
            tracing::info!(command = "generate", org = %config.harvest.org, "Starting harvest");
            let collaborators = build_collaborators(&config)?;

            match synchronise(&config.harvest, &config.login, collaborators).await {
                Ok(report) => {
                    tracing::info!(
                        command = "generate",
                        total = report.statistics.total,
                        uploaded = report.success_count(),
                        failed = report.failures().len(),
                        "Harvest complete"
                    );
                    print!("{report}");
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "generate", error = %e, "Harvest failed");
                    Err(anyhow::Error::new(e))
                }
            }
        }
    }
}
