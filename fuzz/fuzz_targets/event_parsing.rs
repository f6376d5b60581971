#![no_main]

//! Fuzz target for webhook event decoding.
//!
//! Decoding arbitrary bytes must either fail with a malformed payload error
//! or produce an event whose projections do not panic.

use libfuzzer_sys::fuzz_target;
use tether_core::{TetherError, UserEvent};

fuzz_target!(|data: &[u8]| {
    match UserEvent::from_slice(data) {
        Ok(event) => exercise(&event),
        Err(error) => assert!(matches!(error, TetherError::MalformedPayload { .. })),
    }
});

fn exercise(event: &UserEvent) {
    let _ = event.event_type();
    let _ = event.external_id();

    match event {
        UserEvent::UserCreated(payload) => {
            let _ = payload.to_new_user();
        },
        UserEvent::UserUpdated(payload) => {
            let _ = payload.to_update();
        },
        UserEvent::UserDeleted(payload) => {
            let _ = payload.external_id();
        },
        UserEvent::Unhandled { .. } => {},
    }

    let _ = event.to_envelope();
}
