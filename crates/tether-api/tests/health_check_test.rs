//! Health endpoint tests through the full router.

use anyhow::Result;
use axum::http::StatusCode;
use tether_testing::{TestApp, TEST_NOW};

#[tokio::test]
async fn health_reports_healthy_store() -> Result<()> {
    let app = TestApp::new()?;

    let response = app.get("/health").await?;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json()?;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["checks"]["database"]["status"], "up");
    assert!(body["checks"]["database"].get("message").is_none());
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    Ok(())
}

#[tokio::test]
async fn health_reports_unavailable_store() -> Result<()> {
    let app = TestApp::new()?;
    app.store.inject_failure("connection refused").await;

    let response = app.get("/health").await?;

    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    let body = response.json()?;
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["checks"]["database"]["status"], "down");
    Ok(())
}

#[tokio::test]
async fn readiness_follows_store_health() -> Result<()> {
    let app = TestApp::new()?;
    assert_eq!(app.get("/ready").await?.status, StatusCode::OK);

    app.store.inject_failure("connection refused").await;
    assert_eq!(app.get("/ready").await?.status, StatusCode::SERVICE_UNAVAILABLE);

    app.store.clear_failure().await;
    assert_eq!(app.get("/ready").await?.status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn liveness_ignores_store_failures() -> Result<()> {
    let app = TestApp::new()?;
    app.store.inject_failure("connection refused").await;

    let response = app.get("/live").await?;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json()?;
    assert_eq!(body["status"], "alive");
    assert_eq!(body["service"], "tether-api");
    Ok(())
}

#[tokio::test]
async fn health_timestamp_follows_test_clock() -> Result<()> {
    let app = TestApp::new()?;
    app.clock.advance(std::time::Duration::from_secs(60));

    let body = app.get("/health").await?.json()?;
    let timestamp: chrono::DateTime<chrono::Utc> = serde_json::from_value(body["timestamp"].clone())?;

    assert_eq!(timestamp.timestamp(), TEST_NOW + 60);
    Ok(())
}

#[tokio::test]
async fn webhook_route_rejects_get() -> Result<()> {
    let app = TestApp::new()?;

    let response = app.get(tether_api::server::WEBHOOK_PATH).await?;

    assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
    Ok(())
}
