//! Inbound SMS webhook.
//!
//! The provider posts a form for every message a contact sends to the
//! project number and relays whatever `messages` the response lists back to
//! that contact.

use axum::extract::rejection::FormRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use sched_core::{Phone, PhoneError, ReplyPayload};

use crate::server::AppState;

const INCOMING_MESSAGE: &str = "incoming_message";

/// Fields read from the provider's form post. Everything else it sends is
/// ignored.
#[derive(Default, Deserialize)]
pub struct WebhookForm {
    pub secret: Option<String>,
    pub event: Option<String>,
    pub content: Option<String>,
    pub from_number: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

#[instrument(skip_all, fields(phone = tracing::field::Empty))]
pub async fn webhook_handler(
    State(state): State<AppState>,
    form: Result<Form<WebhookForm>, FormRejection>,
) -> Response {
    let Form(form) = match form {
        Ok(form) => form,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "malformed webhook body");
            state.metrics.increment("webhook.malformed", &[], 1);
            return error_response(StatusCode::BAD_REQUEST, "malformed form body");
        }
    };

    let authorized = form
        .secret
        .as_deref()
        .is_some_and(|secret| state.webhook_key.verify(secret));
    if !authorized {
        warn!(secret_present = form.secret.is_some(), "webhook secret rejected");
        state.metrics.increment("webhook.rejected", &[], 1);
        return error_response(StatusCode::FORBIDDEN, "invalid webhook secret");
    }

    if form.event.as_deref() != Some(INCOMING_MESSAGE) {
        debug!(event = ?form.event, "ignoring webhook event");
        state.metrics.increment("webhook.ignored", &[], 1);
        return Json(ReplyPayload::empty()).into_response();
    }

    let Some(content) = form.content.filter(|c| !c.trim().is_empty()) else {
        state.metrics.increment("webhook.invalid", &[], 1);
        return error_response(StatusCode::BAD_REQUEST, "missing content");
    };
    let phone = match Phone::parse(form.from_number.as_deref().unwrap_or_default()) {
        Ok(phone) => phone,
        Err(e) => {
            state.metrics.increment("webhook.invalid", &[], 1);
            let message = match e {
                PhoneError::Empty => "missing from_number".to_string(),
                PhoneError::TooLong(_) => e.to_string(),
            };
            return error_response(StatusCode::BAD_REQUEST, message);
        }
    };
    tracing::Span::current().record("phone", phone.as_str());

    match state.subscriptions.handle(&phone, &content) {
        Ok(reply) => {
            info!(reply = reply.kind(), mutated = reply.mutated(), "webhook command handled");
            state
                .metrics
                .increment("webhook.replies", &[("reply", reply.kind())], 1);
            Json(ReplyPayload::from(reply)).into_response()
        }
        Err(e) => {
            error!(error = %e, "failed to apply subscriber command");
            state.metrics.increment("webhook.errors", &[], 1);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
        }
    }
}
