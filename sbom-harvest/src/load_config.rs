/// `load_config` module: merges an optional static YAML settings file with the
/// secrets taken from the environment into one [`CliConfig`].
///
/// # Responsibilities
/// - Parse the YAML settings file (no secrets) into typed sections
/// - Inject `GH_FETCH_TOKEN`, `HARBOR_USERNAME`, `HARBOR_PASSWORD` and
///   `CF_DOMAIN` from the environment
/// - Fall back to the core defaults for anything the file leaves out
///
/// # Errors
/// All errors use `anyhow::Error` and surface at the CLI boundary. A missing
/// fetch token or tracking-service location is a configuration error.
///
/// Accepted YAML (every key optional):
///
/// ```yaml
/// github:
///   api_url: https://api.github.com
/// harbor:
///   api_base_url: https://harbor.example.com/api/v1
/// directory:
///   page_size: 100
///   start_page: 1
/// pipeline:
///   working_dir: /tmp
///   worker_limit: 10
///   keep_clones: false
///   target_languages: [Go, Rust]
/// ```
use anyhow::{anyhow, Result};
use sbom_harvest_core::config::{
    DirectoryConfig, HarvestConfig, PipelineConfig, DEFAULT_GITHUB_API_URL,
};
use sbom_harvest_core::contract::LoginRequest;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

pub const ENV_FETCH_TOKEN: &str = "GH_FETCH_TOKEN";
pub const ENV_HARBOR_USERNAME: &str = "HARBOR_USERNAME";
pub const ENV_HARBOR_PASSWORD: &str = "HARBOR_PASSWORD";
pub const ENV_HARBOR_DOMAIN: &str = "CF_DOMAIN";
pub const HARBOR_API_PATH: &str = "/api/v1";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GitHubSection {
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HarborSection {
    pub api_base_url: Option<String>,
}

/// YAML side of the configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SettingsFile {
    pub github: GitHubSection,
    pub harbor: HarborSection,
    pub directory: DirectoryConfig,
    pub pipeline: PipelineConfig,
}

/// Everything the CLI needs to wire up a run.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub harvest: HarvestConfig,
    pub github_api_url: String,
    pub fetch_token: String,
    pub harbor_api_url: String,
    pub login: LoginRequest,
}

/// Reads `path` (when given) and injects secrets from the environment.
pub fn load_config(org: &str, repo: Option<String>, path: Option<&Path>) -> Result<CliConfig> {
    let settings = match path {
        Some(path) => read_settings(path)?,
        None => {
            info!("No config file given, using defaults");
            SettingsFile::default()
        }
    };

    if org.trim().is_empty() {
        error!("Organization is blank");
        return Err(anyhow!("organization must not be blank"));
    }

    let fetch_token = env::var(ENV_FETCH_TOKEN)
        .ok()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
            error!(var = ENV_FETCH_TOKEN, "Missing required environment variable");
            anyhow!("{ENV_FETCH_TOKEN} must be set")
        })?;

    let harbor_api_url = match settings.harbor.api_base_url {
        Some(url) => url,
        None => harbor_api_url_from_env()?,
    };

    let login = LoginRequest {
        username: secret_or_empty(ENV_HARBOR_USERNAME),
        password: secret_or_empty(ENV_HARBOR_PASSWORD),
    };

    let harvest = HarvestConfig {
        org: org.to_string(),
        repo: repo.filter(|r| !r.trim().is_empty()),
        directory: settings.directory.normalised(),
        pipeline: settings.pipeline,
    };

    Ok(CliConfig {
        harvest,
        github_api_url: settings
            .github
            .api_url
            .unwrap_or_else(|| DEFAULT_GITHUB_API_URL.to_string()),
        fetch_token,
        harbor_api_url,
        login,
    })
}

fn read_settings(path: &Path) -> Result<SettingsFile> {
    info!(config_path = ?path, "Loading configuration from file");

    let content = fs::read_to_string(path).map_err(|e| {
        error!(error = ?e, config_path = ?path, "Failed to read config file");
        anyhow!("Failed to read config file {:?}: {}", path, e)
    })?;

    let settings: SettingsFile = serde_yaml::from_str(&content).map_err(|e| {
        error!(error = ?e, config_path = ?path, "Failed to parse config YAML");
        anyhow!("Failed to parse config YAML: {e}")
    })?;
    info!(config_path = ?path, "Parsed config YAML successfully");
    Ok(settings)
}

/// `{CF_DOMAIN}/api/v1`
pub fn harbor_api_url_from_env() -> Result<String> {
    let domain = env::var(ENV_HARBOR_DOMAIN)
        .ok()
        .filter(|d| !d.is_empty())
        .ok_or_else(|| {
            error!(var = ENV_HARBOR_DOMAIN, "Missing required environment variable");
            anyhow!("{ENV_HARBOR_DOMAIN} must be set when no harbor.api_base_url is configured")
        })?;
    Ok(format!("{}{}", domain.trim_end_matches('/'), HARBOR_API_PATH))
}

fn secret_or_empty(var: &str) -> String {
    env::var(var).unwrap_or_else(|_| {
        warn!(var, "Environment variable unset, login will likely fail");
        String::new()
    })
}
