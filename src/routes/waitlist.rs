use std::fmt::Debug;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::domain::{EmailError, WaitlistEmail};
use crate::relay_client::RelayClient;
use crate::routes::error_chain_fmt;
use crate::waitlist_store::WaitlistStore;

pub const SERVER_ERROR_MESSAGE: &str = "Something went wrong. Please try again later.";

#[derive(Debug, Serialize)]
pub struct WaitlistResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl WaitlistResponse {
    pub fn accepted() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
        }
    }
}

#[tracing::instrument(
    name = "Adding an email to the waitlist",
    skip(store, relay_client, body),
    fields(waitlist_email = tracing::field::Empty)
)]
pub async fn join_waitlist(
    State(store): State<Arc<WaitlistStore>>,
    State(relay_client): State<RelayClient>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<WaitlistResponse>, WaitlistError> {
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            tracing::warn!(reason = %rejection.body_text(), "Unreadable waitlist request body");
            Value::Null
        }
    };

    let email =
        WaitlistEmail::parse(body.get("email")).map_err(WaitlistError::ValidationError)?;
    tracing::Span::current().record("waitlist_email", &tracing::field::display(&email));

    let entry = store
        .append(&email)
        .await
        .context("Failed to persist a new waitlist entry")?;

    if let Err(error) = relay_client.relay(&entry).await {
        let error = anyhow::Error::new(error);
        tracing::error!(
            error.cause_chain = ?error,
            error.message = %error,
            "Failed to relay a waitlist entry, the local copy is kept",
        );
    }

    Ok(Json(WaitlistResponse::accepted()))
}

#[derive(thiserror::Error)]
pub enum WaitlistError {
    #[error("{0}")]
    ValidationError(EmailError),
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl Debug for WaitlistError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        error_chain_fmt(self, f)
    }
}

impl IntoResponse for WaitlistError {
    fn into_response(self) -> axum::response::Response {
        match self {
            WaitlistError::ValidationError(e) => (
                StatusCode::BAD_REQUEST,
                Json(WaitlistResponse::rejected(e.to_string())),
            ),
            WaitlistError::UnexpectedError(_) => {
                tracing::error!("{:?}", self);

                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(WaitlistResponse::rejected(SERVER_ERROR_MESSAGE)),
                )
            }
        }
        .into_response()
    }
}
