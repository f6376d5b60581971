//! HTTP request handlers for the Tether ingress.
//!
//! - `webhook` - identity-provider webhook ingress
//! - `health` - health, readiness and liveness probes
//!
//! Rejections are answered in plain text. The error code from the taxonomy
//! (E1001-E2002) is logged alongside, so a response can be matched to its
//! log line by request id.

pub mod health;
pub mod webhook;

pub use health::{health_check, liveness_check, readiness_check};
pub use webhook::clerk_webhook;
