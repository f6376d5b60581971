//! Wiremock-backed stand-in for the identity provider Backend API.

use std::time::Duration;

use serde_json::Value;
use tether_api::{ClerkClient, IdentityConfig};
use wiremock::{
    matchers::{header, method, path, path_regex},
    Mock, MockServer, ResponseTemplate,
};

/// Secret key the mock API expects as bearer token.
pub const TEST_CLERK_SECRET_KEY: &str = "sk_test_tether";

/// Mock Backend API listening on a random port.
pub struct MockClerkApi {
    server: MockServer,
}

impl MockClerkApi {
    /// Starts a new mock server.
    pub async fn start() -> Self {
        Self { server: MockServer::start().await }
    }

    /// Base URL to configure the client with.
    pub fn api_url(&self) -> String {
        format!("{}/v1", self.server.uri())
    }

    /// Builds a client pointed at this server.
    ///
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built.
    pub fn client(&self) -> anyhow::Result<ClerkClient> {
        Ok(ClerkClient::new(IdentityConfig {
            api_url: self.api_url(),
            secret_key: TEST_CLERK_SECRET_KEY.to_string().into(),
            timeout: Duration::from_secs(2),
            user_agent: "tether-testing".to_string(),
        })?)
    }

    /// Accepts exactly `times` authenticated metadata updates for `clerk_id`.
    pub async fn expect_metadata_update(&self, clerk_id: &str, times: u64) {
        Mock::given(method("PATCH"))
            .and(path(format!("/v1/users/{clerk_id}/metadata")))
            .and(header("authorization", format!("Bearer {TEST_CLERK_SECRET_KEY}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": clerk_id,
                "object": "user",
            })))
            .expect(times)
            .mount(&self.server)
            .await;
    }

    /// Answers every metadata update with `status`.
    pub async fn fail_metadata_updates(&self, status: u16) {
        Mock::given(method("PATCH"))
            .and(path_regex(r"^/v1/users/[^/]+/metadata$"))
            .respond_with(ResponseTemplate::new(status).set_body_string("upstream failure"))
            .mount(&self.server)
            .await;
    }

    /// Returns the JSON bodies of every request received.
    pub async fn received_bodies(&self) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|request| serde_json::from_slice(&request.body).ok())
            .collect()
    }

    /// Verifies the `expect` counts of mounted mocks.
    pub async fn verify(&self) {
        self.server.verify().await;
    }
}
