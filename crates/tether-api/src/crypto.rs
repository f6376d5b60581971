//! Svix-compatible webhook signature verification.
//!
//! The identity provider delivers webhooks through Svix. Every request
//! carries a message id, a Unix timestamp and one or more signatures:
//!
//! ```text
//! svix-id:        msg_2Yh...
//! svix-timestamp: 1700000000
//! svix-signature: v1,K5oZfzN95Z9UVu1EsfQmfVNQhnkZ2pj9o9NDN/H/pI4= v1,...
//! ```
//!
//! A signature is `v1,` followed by the base64 HMAC-SHA256 of
//! `"{id}.{timestamp}.{body}"`, keyed with the decoded endpoint secret
//! (`whsec_` + base64). A message is authentic when any `v1` entry matches.

use std::{sync::Arc, time::Duration};

use axum::http::HeaderMap;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretSlice};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tether_core::{Clock, RealClock, TetherError, UserEvent};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Message id header.
pub const SVIX_ID: &str = "svix-id";
/// Timestamp header.
pub const SVIX_TIMESTAMP: &str = "svix-timestamp";
/// Signature header.
pub const SVIX_SIGNATURE: &str = "svix-signature";

const WEBHOOK_ID: &str = "webhook-id";
const WEBHOOK_TIMESTAMP: &str = "webhook-timestamp";
const WEBHOOK_SIGNATURE: &str = "webhook-signature";

const SECRET_PREFIX: &str = "whsec_";
const SIGNATURE_VERSION: &str = "v1";

/// Default freshness window for webhook timestamps.
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(5 * 60);

/// Signature verification errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// The endpoint secret could not be decoded.
    #[error("invalid webhook secret: {0}")]
    InvalidSecret(String),

    /// The timestamp header is not an integer.
    #[error("invalid timestamp header: {0}")]
    InvalidTimestamp(String),

    /// The timestamp is older than the tolerance allows.
    #[error("message timestamp too old")]
    TimestampTooOld,

    /// The timestamp is further in the future than the tolerance allows.
    #[error("message timestamp too new")]
    TimestampTooNew,

    /// No `v1` entry in the signature header matched.
    #[error("no matching signature found")]
    NoMatchingSignature,

    /// The body was authentic but is not a valid event envelope.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl From<SignatureError> for TetherError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::InvalidPayload(reason) => Self::MalformedPayload { reason },
            SignatureError::InvalidSecret(reason) => Self::Configuration(reason),
            other => Self::InvalidSignature { reason: other.to_string() },
        }
    }
}

/// The three Svix headers of a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebhookHeaders<'a> {
    /// Message id, stable across redeliveries.
    pub id: &'a str,
    /// Signing time as sent.
    pub timestamp: &'a str,
    /// Space-separated `version,signature` entries.
    pub signature: &'a str,
}

impl<'a> WebhookHeaders<'a> {
    /// Reads the Svix headers, falling back to the unbranded `webhook-*`
    /// names.
    ///
    /// # Errors
    ///
    /// Returns `TetherError::MissingHeaders` naming every header that is
    /// absent, empty, or not valid ASCII.
    pub fn from_headers(headers: &'a HeaderMap) -> Result<Self, TetherError> {
        let id = header_value(headers, SVIX_ID, WEBHOOK_ID);
        let timestamp = header_value(headers, SVIX_TIMESTAMP, WEBHOOK_TIMESTAMP);
        let signature = header_value(headers, SVIX_SIGNATURE, WEBHOOK_SIGNATURE);

        match (id, timestamp, signature) {
            (Some(id), Some(timestamp), Some(signature)) => Ok(Self { id, timestamp, signature }),
            (id, timestamp, signature) => {
                let found = [(SVIX_ID, id), (SVIX_TIMESTAMP, timestamp), (SVIX_SIGNATURE, signature)];
                let missing = found
                    .into_iter()
                    .filter(|(_, value)| value.is_none())
                    .map(|(name, _)| name)
                    .collect();
                Err(TetherError::MissingHeaders { missing })
            },
        }
    }
}

fn header_value<'a>(headers: &'a HeaderMap, primary: &str, fallback: &str) -> Option<&'a str> {
    [primary, fallback]
        .into_iter()
        .filter_map(|name| headers.get(name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|value| !value.is_empty())
}

/// An event whose bytes passed signature and freshness checks.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedEvent {
    /// Svix message id.
    pub msg_id: String,
    /// Signing time, seconds since the Unix epoch.
    pub timestamp: i64,
    /// The decoded event.
    pub event: UserEvent,
}

/// Svix webhook verifier for a single endpoint secret.
#[derive(Debug)]
pub struct Webhook {
    key: SecretSlice<u8>,
    tolerance: Duration,
    clock: Arc<dyn Clock>,
}

impl Webhook {
    /// Creates a verifier from a `whsec_`-prefixed (or bare) base64 secret.
    ///
    /// # Errors
    ///
    /// Returns `SignatureError::InvalidSecret` if the secret is empty or not
    /// valid base64.
    pub fn new(secret: &str) -> Result<Self, SignatureError> {
        let encoded = secret.trim();
        let encoded = encoded.strip_prefix(SECRET_PREFIX).unwrap_or(encoded);

        if encoded.is_empty() {
            return Err(SignatureError::InvalidSecret("secret is empty".to_string()));
        }

        let key = STANDARD
            .decode(encoded)
            .map_err(|e| SignatureError::InvalidSecret(format!("secret is not base64: {e}")))?;

        Ok(Self::from_bytes(key))
    }

    /// Creates a verifier from raw key bytes.
    pub fn from_bytes(key: Vec<u8>) -> Self {
        Self { key: SecretSlice::from(key), tolerance: DEFAULT_TOLERANCE, clock: Arc::new(RealClock) }
    }

    /// Sets the freshness window.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Sets the clock timestamps are compared against.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the freshness window.
    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Produces a `v1,<base64>` signature for a message.
    ///
    /// # Errors
    ///
    /// Returns `SignatureError::InvalidSecret` if the key is rejected by the
    /// MAC.
    pub fn sign(&self, msg_id: &str, timestamp: i64, body: &[u8]) -> Result<String, SignatureError> {
        let digest = self.digest(msg_id, timestamp, body)?;
        Ok(format!("{SIGNATURE_VERSION},{}", STANDARD.encode(digest)))
    }

    /// Checks freshness and signature of a delivery and returns the signed
    /// timestamp.
    ///
    /// # Errors
    ///
    /// Returns the first check that failed.
    pub fn verify(&self, headers: &WebhookHeaders<'_>, body: &[u8]) -> Result<i64, SignatureError> {
        let timestamp = self.verify_timestamp(headers.timestamp)?;
        let expected = self.digest(headers.id, timestamp, body)?;

        let matched = headers
            .signature
            .split_whitespace()
            .filter_map(|entry| entry.split_once(','))
            .filter(|(version, _)| *version == SIGNATURE_VERSION)
            .filter_map(|(_, signature)| STANDARD.decode(signature).ok())
            .any(|provided| bool::from(expected.as_slice().ct_eq(provided.as_slice())));

        if matched {
            Ok(timestamp)
        } else {
            Err(SignatureError::NoMatchingSignature)
        }
    }

    /// Verifies a delivery and decodes its body into a typed event.
    ///
    /// The event is decoded from the same bytes that were authenticated.
    ///
    /// # Errors
    ///
    /// Returns the verification failure, or `InvalidPayload` when the
    /// authentic body is not a valid event.
    pub fn verify_event(
        &self,
        headers: &WebhookHeaders<'_>,
        body: &[u8],
    ) -> Result<VerifiedEvent, SignatureError> {
        let timestamp = self.verify(headers, body)?;

        let event = UserEvent::from_slice(body).map_err(|e| match e {
            TetherError::MalformedPayload { reason } => SignatureError::InvalidPayload(reason),
            other => SignatureError::InvalidPayload(other.to_string()),
        })?;

        Ok(VerifiedEvent { msg_id: headers.id.to_string(), timestamp, event })
    }

    fn verify_timestamp(&self, raw: &str) -> Result<i64, SignatureError> {
        let timestamp: i64 =
            raw.parse().map_err(|_| SignatureError::InvalidTimestamp(raw.to_string()))?;

        let now = self.clock.unix_timestamp();
        let tolerance = i64::try_from(self.tolerance.as_secs()).unwrap_or(i64::MAX);

        if timestamp < now.saturating_sub(tolerance) {
            return Err(SignatureError::TimestampTooOld);
        }
        if timestamp > now.saturating_add(tolerance) {
            return Err(SignatureError::TimestampTooNew);
        }

        Ok(timestamp)
    }

    fn digest(&self, msg_id: &str, timestamp: i64, body: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let mut mac = HmacSha256::new_from_slice(self.key.expose_secret())
            .map_err(|e| SignatureError::InvalidSecret(e.to_string()))?;
        mac.update(msg_id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}
