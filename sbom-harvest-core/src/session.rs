//! Login and team setup against the tracking service.
//!
//! Runs once before discovery. Any failure here aborts the run.

use chrono::Utc;
use tracing::{error, info};

use crate::contract::{LoginRequest, LoginResponse, Team, TrackingService};
use crate::error::SetupError;

/// Read-only credentials shared by every worker of a run.
#[derive(Clone, PartialEq, Eq)]
pub struct PipelineCredentials {
    /// Session token from login, used to create projects.
    pub session_token: String,
    /// Team-scoped token, used only for SBOM uploads.
    pub upload_token: String,
    pub team_id: String,
}

impl std::fmt::Debug for PipelineCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineCredentials")
            .field("session_token", &"<redacted>")
            .field("upload_token", &"<redacted>")
            .field("team_id", &self.team_id)
            .finish()
    }
}

/// Team name for a run: `{org}-{timestamp}`.
pub fn team_name(org: &str) -> String {
    format!("{}-{}", org, Utc::now().to_rfc3339())
}

pub async fn login(
    tracking: &dyn TrackingService,
    request: &LoginRequest,
) -> Result<String, SetupError> {
    info!(username = %request.username, "attempting to login to api");
    let reply = tracking.login(request).await?;
    if !reply.is_success() {
        return Err(SetupError::Login(reply.status_text));
    }
    let response: LoginResponse = serde_json::from_str(&reply.body)
        .map_err(|e| SetupError::Login(format!("error unmarshalling login response: {e}")))?;
    if response.token.is_empty() {
        return Err(SetupError::Login("login response carried no token".to_string()));
    }
    Ok(response.token)
}

/// Logs in and creates the team that owns every project of this run.
pub async fn establish_session(
    tracking: &dyn TrackingService,
    request: &LoginRequest,
    org: &str,
) -> Result<(Team, PipelineCredentials), SetupError> {
    let session_token = login(tracking, request).await.map_err(|e| {
        error!(error = %e, "error logging into harbor");
        e
    })?;

    let team = Team {
        name: team_name(org),
        ..Default::default()
    };
    let reply = tracking.create_team(&session_token, &team).await?;
    if !reply.is_success() {
        return Err(SetupError::Team(reply.status_text));
    }

    let team: Team = serde_json::from_str(&reply.body).map_err(|e| {
        SetupError::Team(format!("error unmarshalling create team response: {e}"))
    })?;

    let upload_token = match team.tokens.first() {
        None => {
            return Err(SetupError::Team(format!(
                "unexpected create team response: tokens length {}",
                team.tokens.len()
            )))
        }
        Some(token) if token.token.is_empty() => {
            return Err(SetupError::Team(
                "unexpected create team response: sbom token unset".to_string(),
            ))
        }
        Some(token) => token.token.clone(),
    };

    if team.id.is_empty() {
        return Err(SetupError::Team("invalid team_id".to_string()));
    }

    info!(team_id = %team.id, team_name = %team.name, "team created");
    let credentials = PipelineCredentials {
        session_token,
        upload_token,
        team_id: team.id.clone(),
    };
    Ok((team, credentials))
}
