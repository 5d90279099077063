use std::time::Duration;

use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

use crate::domain::{iso8601, WaitlistEntry};

#[derive(Clone)]
pub struct RelayClient {
    http_client: Client,
    target: Option<Secret<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Delivered,
    Skipped,
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Failed to reach the relay target")]
    Transport(#[source] reqwest::Error),
    #[error("Relay target responded with {0}")]
    Status(StatusCode),
    #[error("Relay target sent an unreadable response")]
    Decode(#[source] reqwest::Error),
    #[error("Relay target rejected the entry: {0}")]
    Rejected(String),
}

#[derive(Serialize)]
struct RelayRequest<'a> {
    email: &'a str,
    timestamp: String,
}

#[derive(Deserialize)]
struct RelayResponse {
    success: bool,
    #[serde(default)]
    error: Option<String>,
}

impl RelayClient {
    pub fn new(target: Option<Secret<String>>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            target,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.target.is_some()
    }

    #[tracing::instrument(
        name = "Relaying a waitlist entry",
        skip(self, entry),
        fields(waitlist_email = %entry.email)
    )]
    pub async fn relay(&self, entry: &WaitlistEntry) -> Result<RelayOutcome, RelayError> {
        let Some(target) = &self.target else {
            tracing::warn!("Relay target not configured, skipping relay");
            return Ok(RelayOutcome::Skipped);
        };

        let request_body = RelayRequest {
            email: &entry.email,
            timestamp: iso8601::format(&entry.subscribed_at),
        };

        let response = self
            .http_client
            .post(target.expose_secret())
            .json(&request_body)
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.without_url()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Status(status));
        }

        let body = response
            .json::<RelayResponse>()
            .await
            .map_err(|e| RelayError::Decode(e.without_url()))?;
        if !body.success {
            return Err(RelayError::Rejected(
                body.error
                    .unwrap_or_else(|| "Unknown error from relay target".to_string()),
            ));
        }

        tracing::info!("Waitlist entry relayed");
        Ok(RelayOutcome::Delivered)
    }
}
