//! Webhook ingress tests.
//!
//! Drives the full router with signed deliveries and asserts on the calls
//! that reach the user store and the identity provider.

use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;
use tether_api::IdentityError;
use tether_core::{ExternalUserId, NewUser, UserUpdate};
use tether_testing::{
    fixtures::{event, user_deleted},
    SignedRequest, StoreCall, TestApp, UserPayloadBuilder,
};

fn sample_user() -> UserPayloadBuilder {
    UserPayloadBuilder::new("u1")
        .email("a@b.com")
        .username(Some("abu"))
        .name(Some("A"), Some("B"))
        .image_url("http://img")
}

#[tokio::test]
async fn user_created_creates_user_and_links_metadata() -> Result<()> {
    let app = TestApp::new()?;

    let response = app.deliver(&sample_user().created()).await?;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json()?;
    assert_eq!(body["message"], "OK");
    assert_eq!(body["user"]["clerkId"], "u1");
    assert_eq!(body["user"]["email"], "a@b.com");

    assert_eq!(app.store.calls().await, vec![StoreCall::Create(NewUser {
        clerk_id: ExternalUserId::from("u1"),
        email: "a@b.com".to_string(),
        username: "abu".to_string(),
        first_name: Some("A".to_string()),
        last_name: Some("B".to_string()),
        photo: Some("http://img".to_string()),
    })]);

    let stored = app.store.get(&ExternalUserId::from("u1")).await.expect("user stored");
    assert_eq!(app.identity.calls().await, vec![(ExternalUserId::from("u1"), stored.id)]);
    assert_eq!(body["user"]["id"], stored.id.to_string());
    Ok(())
}

#[tokio::test]
async fn user_created_uses_first_email_as_primary() -> Result<()> {
    let app = TestApp::new()?;
    let user = sample_user().emails(["first@b.com", "second@b.com"]);

    app.deliver(&user.created()).await?;

    let stored = app.store.get(&ExternalUserId::from("u1")).await.expect("user stored");
    assert_eq!(stored.email, "first@b.com");
    Ok(())
}

#[tokio::test]
async fn user_created_without_row_skips_metadata() -> Result<()> {
    let app = TestApp::new()?;
    app.store.create_returns_none(true).await;

    let response = app.deliver(&sample_user().created()).await?;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()?, json!({ "message": "OK", "user": null }));
    assert!(app.identity.calls().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn duplicate_user_created_is_idempotent() -> Result<()> {
    let app = TestApp::new()?;

    let first = app.deliver(&sample_user().created()).await?.json()?;
    let second = app.deliver(&sample_user().created()).await?.json()?;

    assert_eq!(first["user"]["id"], second["user"]["id"]);
    assert_eq!(app.store.len().await, 1);
    Ok(())
}

#[tokio::test]
async fn metadata_failure_still_acknowledges() -> Result<()> {
    let app = TestApp::new()?;
    app.identity.fail_with(IdentityError::ServerError { status: 503, body: String::new() }).await;

    let response = app.deliver(&sample_user().created()).await?;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()?["user"]["clerkId"], "u1");
    assert_eq!(app.identity.calls().await.len(), 1);
    Ok(())
}

#[tokio::test]
async fn user_updated_passes_update_without_email() -> Result<()> {
    let app = TestApp::new()?;
    app.deliver(&sample_user().created()).await?;

    let changed = sample_user().email("changed@b.com").username(Some("ada")).name(Some("Ada"), None);
    let response = app.deliver(&changed.updated()).await?;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json()?;
    assert_eq!(body["user"]["username"], "ada");
    assert_eq!(body["user"]["email"], "a@b.com");

    let calls = app.store.calls().await;
    assert_eq!(calls[1], StoreCall::Update(ExternalUserId::from("u1"), UserUpdate {
        first_name: Some("Ada".to_string()),
        last_name: None,
        username: "ada".to_string(),
        photo: Some("http://img".to_string()),
    }));

    let StoreCall::Update(_, update) = &calls[1] else { panic!("expected update call") };
    assert!(serde_json::to_value(update)?.get("email").is_none());
    Ok(())
}

#[tokio::test]
async fn user_updated_for_unknown_user_returns_null() -> Result<()> {
    let app = TestApp::new()?;

    let response = app.deliver(&sample_user().updated()).await?;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()?, json!({ "message": "OK", "user": null }));
    Ok(())
}

#[tokio::test]
async fn user_deleted_calls_delete_exactly_once() -> Result<()> {
    let app = TestApp::new()?;
    app.deliver(&sample_user().created()).await?;

    let response = app.deliver(&user_deleted("u1")).await?;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()?["user"]["clerkId"], "u1");

    let deletes: Vec<_> = app
        .store
        .calls()
        .await
        .into_iter()
        .filter(|call| matches!(call, StoreCall::Delete(_)))
        .collect();
    assert_eq!(deletes, vec![StoreCall::Delete(ExternalUserId::from("u1"))]);
    assert!(app.store.is_empty().await);
    Ok(())
}

#[tokio::test]
async fn unknown_event_type_returns_empty_ok() -> Result<()> {
    let app = TestApp::new()?;

    let response = app.deliver(&event("session.created", json!({ "id": "sess_1" }))).await?;

    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.is_empty());
    assert!(app.store.calls().await.is_empty());
    assert!(app.identity.calls().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn missing_headers_are_rejected_regardless_of_body() -> Result<()> {
    let app = TestApp::new()?;

    for header in ["svix-id", "svix-timestamp", "svix-signature"] {
        let request = SignedRequest::json(&sample_user().created()).without_header(header).build()?;
        let response = app.send(request).await?;

        assert_eq!(response.status, StatusCode::BAD_REQUEST, "missing {header}");
        assert!(response.text().starts_with("Error"));
    }

    assert!(app.store.calls().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn malformed_payloads_are_rejected() -> Result<()> {
    let app = TestApp::new()?;

    let cases = [
        sample_user().emails(Vec::<String>::new()).created(),
        sample_user().username(None).created(),
        sample_user().username(None).updated(),
        event("user.deleted", json!({ "deleted": true })),
        event("user.updated", json!({ "username": "abu" })),
    ];

    for payload in cases {
        let response = app.deliver(&payload).await?;
        assert_eq!(response.status, StatusCode::BAD_REQUEST, "payload {payload}");
        assert!(response.text().contains("malformed payload"));
    }

    assert!(app.store.calls().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn null_names_are_stored_as_none() -> Result<()> {
    let app = TestApp::new()?;
    let user = UserPayloadBuilder::new("u2").email("c@d.com");

    let response = app.deliver(&user.created()).await?;

    assert_eq!(response.status, StatusCode::OK);
    let stored = app.store.get(&ExternalUserId::from("u2")).await.expect("user stored");
    assert_eq!(stored.first_name, None);
    assert_eq!(stored.last_name, None);
    assert_eq!(stored.photo, None);
    Ok(())
}

#[tokio::test]
async fn persistence_failure_returns_500_without_details() -> Result<()> {
    let app = TestApp::new()?;
    app.store.inject_failure("relation \"users\" does not exist").await;

    let response = app.deliver(&sample_user().created()).await?;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!response.text().contains("relation"));
    assert!(app.identity.calls().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn responses_carry_request_id() -> Result<()> {
    let app = TestApp::new()?;

    let response = app.deliver(&user_deleted("u1")).await?;

    assert!(response.headers.contains_key("x-request-id"));
    Ok(())
}

#[tokio::test]
async fn oversized_body_is_rejected() -> Result<()> {
    let app = TestApp::with_options(tether_api::ServerOptions {
        max_body_bytes: 256,
        ..Default::default()
    })?;
    let user = sample_user().image_url("x".repeat(1024));

    let response = app.deliver(&user.created()).await?;

    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(app.store.calls().await.is_empty());
    Ok(())
}
