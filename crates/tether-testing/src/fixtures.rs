//! Test data builders for webhook deliveries.
//!
//! Payload builders produce provider-shaped JSON; [`SignedRequest`] wraps a
//! body in a Svix-signed HTTP request for the ingress route.

use axum::body::Body;
use http::Request;
use serde_json::{json, Value};
use tether_api::{server::WEBHOOK_PATH, Webhook};
use uuid::Uuid;

/// Endpoint secret the test app verifies with.
pub const TEST_WEBHOOK_SECRET: &str = "whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw";

/// A different, valid secret for negative tests.
pub const OTHER_WEBHOOK_SECRET: &str = "whsec_dGhpcyBpcyBub3QgdGhlIHJpZ2h0IGtleQ==";

/// Wall-clock second the test clock starts at.
pub const TEST_NOW: i64 = 1_700_000_000;

/// Wraps `data` in a provider event envelope.
pub fn event(event_type: &str, data: Value) -> Value {
    json!({
        "type": event_type,
        "object": "event",
        "data": data,
    })
}

/// A `user.deleted` envelope for `id`.
pub fn user_deleted(id: &str) -> Value {
    event("user.deleted", json!({ "id": id, "object": "user", "deleted": true }))
}

/// Builder for provider user objects.
#[derive(Debug, Clone)]
pub struct UserPayloadBuilder {
    id: String,
    emails: Vec<String>,
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    image_url: Option<String>,
}

impl UserPayloadBuilder {
    /// Creates a user with one email address and a username derived from
    /// `id`.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            emails: vec![format!("{id}@example.com")],
            username: Some(id.clone()),
            first_name: None,
            last_name: None,
            image_url: None,
            id,
        }
    }

    /// Replaces the email list with a single address.
    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.emails = vec![email.into()];
        self
    }

    /// Replaces the email list.
    #[must_use]
    pub fn emails<I, S>(mut self, emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.emails = emails.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the username, `None` for null.
    #[must_use]
    pub fn username(mut self, username: Option<&str>) -> Self {
        self.username = username.map(str::to_string);
        self
    }

    /// Sets given and family name.
    #[must_use]
    pub fn name(mut self, first: Option<&str>, last: Option<&str>) -> Self {
        self.first_name = first.map(str::to_string);
        self.last_name = last.map(str::to_string);
        self
    }

    /// Sets the profile image URL.
    #[must_use]
    pub fn image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    /// Builds the provider user object.
    pub fn build(&self) -> Value {
        let email_addresses: Vec<Value> = self
            .emails
            .iter()
            .map(|email| {
                json!({
                    "id": format!("idn_{}", Uuid::new_v4().simple()),
                    "object": "email_address",
                    "email_address": email,
                })
            })
            .collect();

        json!({
            "id": self.id,
            "object": "user",
            "email_addresses": email_addresses,
            "username": self.username,
            "first_name": self.first_name,
            "last_name": self.last_name,
            "image_url": self.image_url,
            "public_metadata": {},
            "private_metadata": {},
            "unsafe_metadata": {},
        })
    }

    /// A `user.created` envelope for this user.
    pub fn created(&self) -> Value {
        event("user.created", self.build())
    }

    /// A `user.updated` envelope for this user.
    pub fn updated(&self) -> Value {
        event("user.updated", self.build())
    }
}

/// Builder for a Svix-signed request to the webhook route.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    body: Vec<u8>,
    msg_id: String,
    timestamp: i64,
    secret: String,
    signature: Option<String>,
    omitted: Vec<&'static str>,
}

impl SignedRequest {
    /// Signs `body` with the test secret at [`TEST_NOW`].
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            msg_id: format!("msg_{}", Uuid::new_v4().simple()),
            timestamp: TEST_NOW,
            secret: TEST_WEBHOOK_SECRET.to_string(),
            signature: None,
            omitted: Vec::new(),
        }
    }

    /// Signs a JSON value.
    pub fn json(value: &Value) -> Self {
        Self::new(value.to_string())
    }

    /// Sets the message id.
    #[must_use]
    pub fn msg_id(mut self, msg_id: impl Into<String>) -> Self {
        self.msg_id = msg_id.into();
        self
    }

    /// Sets the signing timestamp.
    #[must_use]
    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Signs with a different endpoint secret.
    #[must_use]
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = secret.into();
        self
    }

    /// Sends `signature` verbatim instead of signing.
    #[must_use]
    pub fn signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// Leaves out one of the `svix-*` headers.
    #[must_use]
    pub fn without_header(mut self, name: &'static str) -> Self {
        self.omitted.push(name);
        self
    }

    /// Returns the signature header value this request will carry.
    ///
    /// # Errors
    ///
    /// Fails if the secret is not a valid Svix secret.
    pub fn signature_header(&self) -> anyhow::Result<String> {
        match &self.signature {
            Some(signature) => Ok(signature.clone()),
            None => Ok(Webhook::new(&self.secret)?.sign(&self.msg_id, self.timestamp, &self.body)?),
        }
    }

    /// Builds the request.
    ///
    /// # Errors
    ///
    /// Fails if signing fails or the request cannot be assembled.
    pub fn build(self) -> anyhow::Result<Request<Body>> {
        let signature = self.signature_header()?;
        let timestamp = self.timestamp.to_string();

        let mut builder = Request::builder()
            .method("POST")
            .uri(WEBHOOK_PATH)
            .header("content-type", "application/json");

        for (name, value) in [
            ("svix-id", self.msg_id.as_str()),
            ("svix-timestamp", timestamp.as_str()),
            ("svix-signature", signature.as_str()),
        ] {
            if !self.omitted.contains(&name) {
                builder = builder.header(name, value);
            }
        }

        Ok(builder.body(Body::from(self.body))?)
    }
}
