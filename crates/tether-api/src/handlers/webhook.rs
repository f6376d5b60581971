//! Identity-provider webhook ingress.
//!
//! Verifies the Svix signature over the raw body, then maps the event kind
//! to a single user store call. `user.created` additionally writes the new
//! internal id back to the provider. Unknown kinds are acknowledged with an
//! empty 200 so the provider stops redelivering them.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use tether_core::{
    events::{DeletedUserPayload, UserPayload},
    TetherError, User, UserEvent,
};
use tracing::{debug, error, info, instrument, warn, Span};

use crate::{crypto::WebhookHeaders, AppState};

/// Body returned for every handled user event.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Always `"OK"`.
    pub message: &'static str,
    /// The row the store returned, `null` when there was none.
    pub user: Option<User>,
}

impl WebhookResponse {
    fn ok(user: Option<User>) -> Response {
        (StatusCode::OK, Json(Self { message: "OK", user })).into_response()
    }
}

/// Receives a webhook delivery.
///
/// # Responses
///
/// - 200 with `{message, user}` for handled user events
/// - 200 with an empty body for event kinds Tether does not act on
/// - 400 (plain text) for missing headers, bad signatures and malformed
///   payloads
/// - 500 (plain text) when the user store fails
#[instrument(
    name = "clerk_webhook",
    skip_all,
    fields(
        content_length = body.len(),
        msg_id = tracing::field::Empty,
        event_type = tracing::field::Empty,
        clerk_id = tracing::field::Empty,
    )
)]
pub async fn clerk_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match process(&state, &headers, &body).await {
        Ok(response) => response,
        Err(e) => error_response(&e),
    }
}

async fn process(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Response, TetherError> {
    let webhook_headers = WebhookHeaders::from_headers(headers)?;
    Span::current().record("msg_id", webhook_headers.id);

    let verified = state.webhook.verify_event(&webhook_headers, body)?;

    let span = Span::current();
    span.record("event_type", verified.event.event_type());
    if let Some(clerk_id) = verified.event.external_id() {
        span.record("clerk_id", clerk_id.as_str());
    }
    debug!(timestamp = verified.timestamp, "Webhook signature verified");

    match verified.event {
        UserEvent::UserCreated(user) => handle_created(state, &user).await,
        UserEvent::UserUpdated(user) => handle_updated(state, &user).await,
        UserEvent::UserDeleted(deleted) => handle_deleted(state, &deleted).await,
        UserEvent::Unhandled { event_type } => {
            info!(event_type = %event_type, "Ignoring unhandled event type");
            Ok(StatusCode::OK.into_response())
        },
    }
}

async fn handle_created(state: &AppState, user: &UserPayload) -> Result<Response, TetherError> {
    let record = user.to_new_user()?;
    let created = state.store.create_user(record).await?;

    match &created {
        Some(row) => {
            info!(user_id = %row.id, "User created");
            if let Err(e) = state.identity.set_internal_id(&row.clerk_id, row.id).await {
                let err = TetherError::from(e);
                warn!(
                    code = err.code(),
                    error = %err,
                    user_id = %row.id,
                    "Failed to link user metadata"
                );
            }
        },
        None => warn!("User store returned no row for created user"),
    }

    Ok(WebhookResponse::ok(created))
}

async fn handle_updated(state: &AppState, user: &UserPayload) -> Result<Response, TetherError> {
    let update = user.to_update()?;
    let updated = state.store.update_user(user.id.clone(), update).await?;

    match &updated {
        Some(row) => info!(user_id = %row.id, "User updated"),
        None => warn!("Update for unknown user"),
    }

    Ok(WebhookResponse::ok(updated))
}

async fn handle_deleted(
    state: &AppState,
    deleted: &DeletedUserPayload,
) -> Result<Response, TetherError> {
    let clerk_id = deleted.external_id()?.clone();
    let removed = state.store.delete_user(clerk_id).await?;

    match &removed {
        Some(row) => info!(user_id = %row.id, "User deleted"),
        None => warn!("Delete for unknown user"),
    }

    Ok(WebhookResponse::ok(removed))
}

/// Maps an error to a plain-text response.
///
/// Verification and storage details are logged, never returned.
fn error_response(err: &TetherError) -> Response {
    let (status, message) = match err {
        TetherError::MissingHeaders { .. } => {
            (StatusCode::BAD_REQUEST, "Error: missing svix headers".to_string())
        },
        TetherError::InvalidSignature { .. } => {
            (StatusCode::BAD_REQUEST, "Error: invalid webhook signature".to_string())
        },
        TetherError::MalformedPayload { reason } => {
            (StatusCode::BAD_REQUEST, format!("Error: malformed payload: {reason}"))
        },
        TetherError::Persistence(_)
        | TetherError::IdentityProvider(_)
        | TetherError::Configuration(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Error: internal server error".to_string())
        },
    };

    if err.is_sender_error() {
        warn!(code = err.code(), error = %err, "Rejected webhook");
    } else {
        error!(code = err.code(), error = %err, "Webhook processing failed");
    }

    (status, message).into_response()
}
