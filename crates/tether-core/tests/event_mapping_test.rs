//! Property tests for event decoding and the user lifecycle it drives.

use proptest::prelude::*;
use serde_json::json;
use tether_core::{
    storage::mock::MockUserStore, ExternalUserId, TetherError, UserEvent, UserStore,
};

fn user_data(id: &str, emails: &[String], username: Option<&str>) -> serde_json::Value {
    let email_addresses: Vec<_> =
        emails.iter().map(|email| json!({ "email_address": email })).collect();

    json!({
        "id": id,
        "object": "user",
        "email_addresses": email_addresses,
        "username": username,
        "first_name": null,
        "last_name": null,
        "image_url": null,
    })
}

fn envelope(event_type: &str, data: serde_json::Value) -> Vec<u8> {
    json!({ "type": event_type, "object": "event", "data": data }).to_string().into_bytes()
}

proptest! {
    #[test]
    fn arbitrary_bodies_never_panic(body in proptest::collection::vec(any::<u8>(), 0..512)) {
        let _ = UserEvent::from_slice(&body);
    }

    #[test]
    fn unknown_event_types_are_unhandled(
        event_type in "[a-z]{1,12}\\.[a-z]{1,12}",
        data in proptest::collection::hash_map("[a-z]{1,8}", "[a-z0-9]{0,8}", 0..4),
    ) {
        prop_assume!(!matches!(event_type.as_str(), "user.created" | "user.updated" | "user.deleted"));

        let event = UserEvent::from_slice(&envelope(&event_type, json!(data))).unwrap();

        prop_assert_eq!(event.event_type(), event_type.as_str());
        prop_assert!(event.external_id().is_none());
        let is_unhandled = matches!(event, UserEvent::Unhandled { .. });
        prop_assert!(is_unhandled);
    }

    #[test]
    fn first_email_becomes_primary(
        emails in proptest::collection::vec("[a-z]{1,8}@[a-z]{1,8}\\.com", 1..5),
        username in "[a-z]{1,12}",
    ) {
        let body = envelope("user.created", user_data("user_1", &emails, Some(&username)));

        let UserEvent::UserCreated(payload) = UserEvent::from_slice(&body).unwrap() else {
            panic!("expected user.created");
        };
        let record = payload.to_new_user().unwrap();

        prop_assert_eq!(&record.email, &emails[0]);
        prop_assert_eq!(record.username, username);
        prop_assert_eq!(record.clerk_id, ExternalUserId::from("user_1"));
    }

    #[test]
    fn blank_usernames_are_malformed(username in "[ \t]{0,4}") {
        let emails = vec!["a@b.com".to_string()];
        let body = envelope("user.updated", user_data("user_1", &emails, Some(&username)));

        let UserEvent::UserUpdated(payload) = UserEvent::from_slice(&body).unwrap() else {
            panic!("expected user.updated");
        };

        let is_malformed = matches!(payload.to_update(), Err(TetherError::MalformedPayload { .. }));
        prop_assert!(is_malformed);
    }
}

#[tokio::test]
async fn lifecycle_round_trip_through_store() {
    let store = MockUserStore::new();
    let emails = vec!["a@b.com".to_string()];

    let created = UserEvent::from_slice(&envelope(
        "user.created",
        user_data("user_1", &emails, Some("abu")),
    ))
    .unwrap();
    let UserEvent::UserCreated(payload) = created else { panic!("expected user.created") };
    let user = store.create_user(payload.to_new_user().unwrap()).await.unwrap().unwrap();

    let updated = UserEvent::from_slice(&envelope(
        "user.updated",
        user_data("user_1", &["ignored@b.com".to_string()], Some("ada")),
    ))
    .unwrap();
    let UserEvent::UserUpdated(payload) = updated else { panic!("expected user.updated") };
    let changed = store
        .update_user(payload.id.clone(), payload.to_update().unwrap())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(changed.id, user.id);
    assert_eq!(changed.username, "ada");
    assert_eq!(changed.email, "a@b.com");

    let deleted =
        UserEvent::from_slice(&envelope("user.deleted", json!({ "id": "user_1", "deleted": true })))
            .unwrap();
    let UserEvent::UserDeleted(payload) = deleted else { panic!("expected user.deleted") };
    let removed = store.delete_user(payload.external_id().unwrap().clone()).await.unwrap();

    assert_eq!(removed.map(|user| user.id), Some(user.id));
    assert!(store.is_empty().await);
}
