//! Tether HTTP ingress.
//!
//! Receives identity-provider webhooks, verifies them, and mirrors user
//! lifecycle events into the user store.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;

use tether_core::{Clock, RealClock, UserStore};

pub mod config;
pub mod crypto;
pub mod handlers;
pub mod identity;
pub mod server;

pub use config::Config;
pub use crypto::{SignatureError, VerifiedEvent, Webhook, WebhookHeaders};
pub use identity::{ClerkClient, IdentityConfig, IdentityError, IdentityProvider};
pub use server::{create_router, start_server, ServerOptions};

/// Collaborators shared by every request.
///
/// Holds only `Arc`s to thread-safe values; cloning is cheap and requests
/// share no mutable state through it.
#[derive(Clone)]
pub struct AppState {
    /// Signature verifier for the configured endpoint secret.
    pub webhook: Arc<Webhook>,
    /// User persistence.
    pub store: Arc<dyn UserStore>,
    /// Identity provider metadata API.
    pub identity: Arc<dyn IdentityProvider>,
    /// Clock for health timings.
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Creates state with the real clock.
    pub fn new(
        webhook: Webhook,
        store: Arc<dyn UserStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self { webhook: Arc::new(webhook), store, identity, clock: Arc::new(RealClock) }
    }

    /// Replaces the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}
