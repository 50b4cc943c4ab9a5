use std::time::Duration;

use crate::contract::HttpReply;
use crate::error::TransportError;

/// Discovery and emptiness probe calls.
pub const DIRECTORY_TIMEOUT: Duration = Duration::from_secs(10);
/// Login, team and project calls.
pub const TRACKING_TIMEOUT: Duration = Duration::from_secs(60);
/// SBOM uploads carry the largest bodies.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(300);

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";
pub const USER_AGENT: &str = concat!("sbom-harvest/", env!("CARGO_PKG_VERSION"));

/// Reads the whole response into an [`HttpReply`], whatever its status.
pub(crate) async fn read_reply(
    url: &str,
    response: reqwest::Response,
) -> Result<HttpReply, TransportError> {
    let status = response.status();
    let body = response.text().await.map_err(|e| {
        TransportError::new(url, format!("error reading response body: {e}"))
    })?;
    Ok(HttpReply {
        status: status.as_u16(),
        status_text: status.to_string(),
        body,
    })
}
