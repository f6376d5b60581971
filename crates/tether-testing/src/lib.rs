//! Test infrastructure for the Tether ingress.
//!
//! Provides an in-process app wired to in-memory doubles, payload and signed
//! request builders, and a mock identity provider API. Time is pinned to
//! [`fixtures::TEST_NOW`] so signature freshness is deterministic.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::Result;
use axum::{body::Body, Router};
use bytes::Bytes;
use http::{HeaderMap, Request, StatusCode};
use serde_json::Value;
use tether_api::{create_router, AppState, IdentityProvider, ServerOptions, Webhook};
use tower::ServiceExt;

pub mod clerk_api;
pub mod fixtures;
pub mod identity;

pub use clerk_api::MockClerkApi;
pub use fixtures::{SignedRequest, UserPayloadBuilder, TEST_NOW, TEST_WEBHOOK_SECRET};
pub use identity::RecordingIdentityProvider;
pub use tether_core::{
    storage::mock::{MockUserStore, StoreCall},
    TestClock,
};

/// The ingress router wired to in-memory collaborators.
pub struct TestApp {
    /// User store double.
    pub store: MockUserStore,
    /// Identity provider double, unused when a custom provider was given.
    pub identity: RecordingIdentityProvider,
    /// Clock shared with the verifier and health checks.
    pub clock: TestClock,
    router: Router,
}

impl TestApp {
    /// Creates an app with a recording identity provider.
    ///
    /// # Errors
    ///
    /// Fails if the test secret cannot be decoded.
    pub fn new() -> Result<Self> {
        let identity = RecordingIdentityProvider::new();
        Self::build(identity.clone(), Arc::new(identity), ServerOptions::default())
    }

    /// Creates an app that writes metadata through `provider`.
    ///
    /// # Errors
    ///
    /// Fails if the test secret cannot be decoded.
    pub fn with_identity(provider: Arc<dyn IdentityProvider>) -> Result<Self> {
        Self::build(RecordingIdentityProvider::new(), provider, ServerOptions::default())
    }

    /// Creates an app with custom transport limits.
    ///
    /// # Errors
    ///
    /// Fails if the test secret cannot be decoded.
    pub fn with_options(options: ServerOptions) -> Result<Self> {
        let identity = RecordingIdentityProvider::new();
        Self::build(identity.clone(), Arc::new(identity), options)
    }

    fn build(
        identity: RecordingIdentityProvider,
        provider: Arc<dyn IdentityProvider>,
        options: ServerOptions,
    ) -> Result<Self> {
        let store = MockUserStore::new();
        let clock = TestClock::at_unix(TEST_NOW);
        let webhook = Webhook::new(TEST_WEBHOOK_SECRET)?.with_clock(Arc::new(clock.clone()));

        let state = AppState::new(webhook, Arc::new(store.clone()), provider)
            .with_clock(Arc::new(clock.clone()));

        Ok(Self { store, identity, clock, router: create_router(state, options) })
    }

    /// Returns a clone of the router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Sends a request through the full middleware stack.
    ///
    /// # Errors
    ///
    /// Fails if the body cannot be read.
    pub async fn send(&self, request: Request<Body>) -> Result<TestResponse> {
        let response = self.router().oneshot(request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await?;

        Ok(TestResponse { status, headers, body })
    }

    /// Signs and sends a JSON webhook.
    ///
    /// # Errors
    ///
    /// Fails if signing or sending fails.
    pub async fn deliver(&self, payload: &Value) -> Result<TestResponse> {
        self.send(SignedRequest::json(payload).build()?).await
    }

    /// Sends a GET request to `uri`.
    ///
    /// # Errors
    ///
    /// Fails if the request cannot be built or sent.
    pub async fn get(&self, uri: &str) -> Result<TestResponse> {
        self.send(Request::builder().method("GET").uri(uri).body(Body::empty())?).await
    }
}

/// A fully buffered response.
#[derive(Debug)]
pub struct TestResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}

impl TestResponse {
    /// Parses the body as JSON.
    ///
    /// # Errors
    ///
    /// Fails if the body is not JSON.
    pub fn json(&self) -> Result<Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Returns the body as text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
