//! Identity-provider Backend API client.
//!
//! After a user row is created, the ingress writes the internal id back to
//! the provider as `public_metadata.userId` so both systems can resolve each
//! other. Only the metadata merge endpoint is used.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tether_core::{ExternalUserId, TetherError, UserId};
use thiserror::Error;
use tracing::{info_span, Instrument};

const MAX_ERROR_BODY: usize = 1024;

/// Identity provider call errors.
#[derive(Debug, Clone, Error)]
pub enum IdentityError {
    /// Connection to the provider failed.
    #[error("network error: {0}")]
    Network(String),

    /// The provider did not answer in time.
    #[error("request timeout after {0}s")]
    Timeout(u64),

    /// The provider rejected the request (4xx).
    #[error("client error: HTTP {status}: {body}")]
    ClientError {
        /// HTTP status code
        status: u16,
        /// Response body, truncated
        body: String,
    },

    /// The provider failed (5xx).
    #[error("server error: HTTP {status}: {body}")]
    ServerError {
        /// HTTP status code
        status: u16,
        /// Response body, truncated
        body: String,
    },

    /// The client could not be built.
    #[error("invalid identity client configuration: {0}")]
    Configuration(String),
}

impl From<IdentityError> for TetherError {
    fn from(err: IdentityError) -> Self {
        Self::IdentityProvider(err.to_string())
    }
}

/// Writes Tether's internal id back to the identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// Merges `{"userId": user_id}` into the provider user's public metadata.
    async fn set_internal_id(
        &self,
        clerk_id: &ExternalUserId,
        user_id: UserId,
    ) -> Result<(), IdentityError>;
}

/// Connection settings for [`ClerkClient`].
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Backend API base URL, without trailing slash.
    pub api_url: String,
    /// Backend API secret key (`sk_...`).
    pub secret_key: SecretString,
    /// Per-request timeout.
    pub timeout: Duration,
    /// User agent sent with every request.
    pub user_agent: String,
}

/// Clerk Backend API client.
#[derive(Debug, Clone)]
pub struct ClerkClient {
    client: reqwest::Client,
    api_url: String,
    secret_key: SecretString,
    timeout: Duration,
}

impl ClerkClient {
    /// Creates a client with the given settings.
    ///
    /// # Errors
    ///
    /// Returns `IdentityError::Configuration` if the HTTP client cannot be
    /// built.
    pub fn new(config: IdentityConfig) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| IdentityError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key,
            timeout: config.timeout,
        })
    }

    fn metadata_url(&self, clerk_id: &ExternalUserId) -> String {
        format!("{}/users/{}/metadata", self.api_url, clerk_id)
    }
}

#[async_trait]
impl IdentityProvider for ClerkClient {
    async fn set_internal_id(
        &self,
        clerk_id: &ExternalUserId,
        user_id: UserId,
    ) -> Result<(), IdentityError> {
        let span = info_span!("set_internal_id", clerk_id = %clerk_id, user_id = %user_id);

        async move {
            let body = json!({ "public_metadata": { "userId": user_id } });

            let response = self
                .client
                .patch(self.metadata_url(clerk_id))
                .bearer_auth(self.secret_key.expose_secret())
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        IdentityError::Timeout(self.timeout.as_secs())
                    } else {
                        IdentityError::Network(e.to_string())
                    }
                })?;

            let status = response.status();
            if status.is_success() {
                tracing::debug!(status = status.as_u16(), "metadata updated");
                return Ok(());
            }

            let body = match response.text().await {
                Ok(text) => truncate(text),
                Err(e) => format!("[failed to read response body: {e}]"),
            };

            tracing::warn!(status = status.as_u16(), "identity provider rejected metadata update");

            if status.is_server_error() {
                Err(IdentityError::ServerError { status: status.as_u16(), body })
            } else {
                Err(IdentityError::ClientError { status: status.as_u16(), body })
            }
        }
        .instrument(span)
        .await
    }
}

fn truncate(mut text: String) -> String {
    if text.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
        text.push_str("... (truncated)");
    }
    text
}
