use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;

use crate::version::{Comparison, ParseVersionError, VersionIdentifier, compare};

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("failed to contact update server: {0}")]
    Request(#[source] reqwest::Error),
    #[error("update server did not respond within {}s", .timeout.as_secs())]
    Timeout { timeout: Duration },
    #[error("update check failed with HTTP {status}{body_snippet}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body_snippet: String,
    },
    #[error("failed to read update check response: {0}")]
    Body(#[source] reqwest::Error),
    #[error("update server returned an invalid version: {0}")]
    Parse(#[from] ParseVersionError),
}

impl CheckError {
    fn from_request(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            Self::Timeout { timeout }
        } else {
            Self::Request(error)
        }
    }

    fn from_body(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            Self::Timeout { timeout }
        } else {
            Self::Body(error)
        }
    }
}

/// Outcome of a single update check. Never cached: every check asks the
/// server again.
#[derive(Debug)]
pub enum UpdateDecision {
    UpToDate,
    UpdateAvailable(VersionIdentifier),
    CheckFailed(CheckError),
}

impl UpdateDecision {
    #[must_use]
    pub fn from_versions(current: &VersionIdentifier, latest: VersionIdentifier) -> Self {
        match compare(current, &latest) {
            Comparison::Newer => Self::UpdateAvailable(latest),
            Comparison::UpToDate => Self::UpToDate,
        }
    }
}

/// Fetch the latest published version from a plain-text endpoint whose whole
/// body is the version string.
///
/// # Errors
/// Returns an error when the request fails or times out, the server answers
/// with a non-success status, or the body is not a valid version.
pub async fn fetch_latest_version(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<VersionIdentifier, CheckError> {
    debug!("Checking latest version at {url}");

    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|error| CheckError::from_request(error, timeout))?;

    if !response.status().is_success() {
        let status = response.status();
        let body_snippet = response
            .text()
            .await
            .ok()
            .map(|body| response_snippet(&body, 160))
            .unwrap_or_default();
        return Err(CheckError::HttpStatus {
            status,
            body_snippet,
        });
    }

    let body = response
        .text()
        .await
        .map_err(|error| CheckError::from_body(error, timeout))?;

    Ok(VersionIdentifier::parse(&body)?)
}

/// Query the version endpoint and compare against `current`.
pub async fn check_for_update(
    client: &reqwest::Client,
    current: &VersionIdentifier,
    url: &str,
    timeout: Duration,
) -> UpdateDecision {
    match fetch_latest_version(client, url, timeout).await {
        Ok(latest) => {
            let decision = UpdateDecision::from_versions(current, latest);
            match &decision {
                UpdateDecision::UpdateAvailable(latest) => {
                    info!("Update available: {current} -> {latest}");
                }
                _ => info!("Version {current} is up to date"),
            }
            decision
        }
        Err(error) => {
            warn!("Update check failed: {error}");
            UpdateDecision::CheckFailed(error)
        }
    }
}

fn response_snippet(body: &str, max_chars: usize) -> String {
    let snippet: String = body.trim().chars().take(max_chars).collect();
    if snippet.is_empty() {
        String::new()
    } else {
        format!(": {snippet}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(input: &str) -> VersionIdentifier {
        VersionIdentifier::parse(input).expect("test version should parse")
    }

    #[test]
    fn decision_reports_newer_remote_version() {
        let decision = UpdateDecision::from_versions(&v("1.0.1"), v("1.0.2"));
        assert!(matches!(
            decision,
            UpdateDecision::UpdateAvailable(ref latest) if latest.to_string() == "1.0.2"
        ));
    }

    #[test]
    fn decision_treats_older_remote_as_up_to_date() {
        let decision = UpdateDecision::from_versions(&v("1.1.0"), v("1.0.9"));
        assert!(matches!(decision, UpdateDecision::UpToDate));
    }

    #[test]
    fn response_snippet_truncates_and_prefixes() {
        assert_eq!(response_snippet("", 10), "");
        assert_eq!(response_snippet("  \n", 10), "");
        assert_eq!(response_snippet("not found", 3), ": not");
    }

    #[test]
    fn timeout_error_message_reports_seconds() {
        let error = CheckError::Timeout {
            timeout: Duration::from_secs(5),
        };
        assert_eq!(
            error.to_string(),
            "update server did not respond within 5s"
        );
    }
}
