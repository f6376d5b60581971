#![no_main]

//! Fuzz target for Svix signature verification.
//!
//! Splits the input into header values and a body and runs them through
//! header extraction and verification. Neither may panic, whatever the
//! secret, timestamp or signature list looks like.

use std::sync::Arc;

use http::{HeaderMap, HeaderValue};
use libfuzzer_sys::fuzz_target;
use tether_api::{Webhook, WebhookHeaders};
use tether_core::TestClock;

const SECRET: &str = "whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw";
const NOW: i64 = 1_700_000_000;

fuzz_target!(|data: &[u8]| {
    fuzz_secret_parsing(data);
    fuzz_verification(data);
});

fn fuzz_secret_parsing(data: &[u8]) {
    let secret = String::from_utf8_lossy(data);
    let _ = Webhook::new(&secret);
    let _ = Webhook::new(&format!("whsec_{secret}"));
}

fn fuzz_verification(data: &[u8]) {
    let Ok(webhook) = Webhook::new(SECRET) else {
        return;
    };
    let webhook = webhook.with_clock(Arc::new(TestClock::at_unix(NOW)));

    let mut parts = data.splitn(4, |byte| *byte == b'\n');
    let id = parts.next().unwrap_or_default();
    let timestamp = parts.next().unwrap_or_default();
    let signature = parts.next().unwrap_or_default();
    let body = parts.next().unwrap_or_default();

    let mut headers = HeaderMap::new();
    for (name, value) in [("svix-id", id), ("svix-timestamp", timestamp), ("svix-signature", signature)]
    {
        if let Ok(value) = HeaderValue::from_bytes(value) {
            headers.insert(name, value);
        }
    }

    if let Ok(extracted) = WebhookHeaders::from_headers(&headers) {
        let _ = webhook.verify_event(&extracted, body);
    }

    // A correctly signed fuzzed body must always verify.
    let Ok(id) = std::str::from_utf8(id) else {
        return;
    };
    let Ok(signature) = webhook.sign(id, NOW, body) else {
        return;
    };
    let timestamp = NOW.to_string();
    let signed = WebhookHeaders { id, timestamp: &timestamp, signature: &signature };
    assert!(webhook.verify(&signed, body).is_ok());
}
