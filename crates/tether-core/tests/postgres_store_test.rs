//! PostgreSQL user store tests.
//!
//! Runs against the database named by `DATABASE_URL` and is skipped when it
//! is unset. Each test gets its own schema, so tests can run concurrently
//! against one database without seeing each other's rows.

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, Connection, Executor, PgConnection, PgPool};
use tether_core::{
    storage::run_migrations, ExternalUserId, NewUser, PostgresUserStore, UserStore, UserUpdate,
};
use uuid::Uuid;

/// A migrated schema private to one test.
struct TestSchema {
    pool: PgPool,
    name: String,
}

impl TestSchema {
    /// Creates and migrates a fresh schema, or returns `None` when no
    /// database is configured.
    async fn create() -> Result<Option<Self>> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set, skipping PostgreSQL store test");
            return Ok(None);
        };

        let name = format!("tether_test_{}", Uuid::new_v4().simple());

        let mut admin = PgConnection::connect(&url).await.context("failed to connect")?;
        admin.execute(format!("CREATE SCHEMA \"{name}\"").as_str()).await?;
        admin.close().await?;

        let search_path = format!("SET search_path TO \"{name}\"");
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .after_connect(move |conn, _meta| {
                let search_path = search_path.clone();
                Box::pin(async move { conn.execute(search_path.as_str()).await.map(|_| ()) })
            })
            .connect(&url)
            .await
            .context("failed to create schema pool")?;

        run_migrations(&pool).await?;

        Ok(Some(Self { pool, name }))
    }

    fn store(&self) -> PostgresUserStore {
        PostgresUserStore::new(self.pool.clone())
    }

    async fn drop(self) -> Result<()> {
        sqlx::query(&format!("DROP SCHEMA \"{}\" CASCADE", self.name)).execute(&self.pool).await?;
        self.pool.close().await;
        Ok(())
    }
}

fn new_user(clerk_id: &str) -> NewUser {
    NewUser {
        clerk_id: ExternalUserId::from(clerk_id),
        email: format!("{clerk_id}@example.com"),
        username: clerk_id.to_string(),
        first_name: Some("A".to_string()),
        last_name: None,
        photo: None,
    }
}

fn update(username: &str) -> UserUpdate {
    UserUpdate {
        first_name: Some("Ada".to_string()),
        last_name: Some("Lovelace".to_string()),
        username: username.to_string(),
        photo: Some("http://img".to_string()),
    }
}

#[tokio::test]
async fn migrations_create_users_table_idempotently() -> Result<()> {
    let Some(db) = TestSchema::create().await? else { return Ok(()) };

    run_migrations(&db.pool).await?;

    let columns: Vec<(String, String)> = sqlx::query_as(
        r"
        SELECT column_name::text, is_nullable::text
        FROM information_schema.columns
        WHERE table_schema = $1 AND table_name = 'users'
        ORDER BY ordinal_position
        ",
    )
    .bind(&db.name)
    .fetch_all(&db.pool)
    .await?;

    let nullable = |name: &str| {
        columns.iter().find(|(column, _)| column == name).map(|(_, nullable)| nullable.as_str())
    };
    assert_eq!(columns.len(), 9);
    assert_eq!(nullable("clerk_id"), Some("NO"));
    assert_eq!(nullable("email"), Some("NO"));
    assert_eq!(nullable("username"), Some("NO"));
    assert_eq!(nullable("first_name"), Some("YES"));
    assert_eq!(nullable("last_name"), Some("YES"));
    assert_eq!(nullable("photo"), Some("YES"));

    db.drop().await
}

#[tokio::test]
async fn duplicate_create_returns_existing_row() -> Result<()> {
    let Some(db) = TestSchema::create().await? else { return Ok(()) };
    let store = db.store();

    let first = store.create_user(new_user("user_1")).await?.context("row inserted")?;
    let mut redelivered = new_user("user_1");
    redelivered.email = "changed@example.com".to_string();
    let second = store.create_user(redelivered).await?.context("row returned")?;

    assert_eq!(second.id, first.id);
    assert_eq!(second.email, "user_1@example.com");
    assert_eq!(second.first_name.as_deref(), Some("A"));
    assert_eq!(second.last_name, None);

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users").fetch_one(&db.pool).await?;
    assert_eq!(count, 1);

    db.drop().await
}

#[tokio::test]
async fn update_changes_profile_but_keeps_email() -> Result<()> {
    let Some(db) = TestSchema::create().await? else { return Ok(()) };
    let store = db.store();
    let created = store.create_user(new_user("user_1")).await?.context("row inserted")?;

    let updated = store
        .update_user(ExternalUserId::from("user_1"), update("ada"))
        .await?
        .context("row updated")?;

    assert_eq!(updated.id, created.id);
    assert_eq!(updated.username, "ada");
    assert_eq!(updated.last_name.as_deref(), Some("Lovelace"));
    assert_eq!(updated.photo.as_deref(), Some("http://img"));
    assert_eq!(updated.email, created.email);
    assert!(updated.updated_at >= created.updated_at);

    let found = store.find_by_external_id(ExternalUserId::from("user_1")).await?;
    assert_eq!(found, Some(updated));

    db.drop().await
}

#[tokio::test]
async fn unknown_user_update_and_delete_return_none() -> Result<()> {
    let Some(db) = TestSchema::create().await? else { return Ok(()) };
    let store = db.store();
    store.create_user(new_user("user_1")).await?;

    let ghost = ExternalUserId::from("user_ghost");
    assert!(store.update_user(ghost.clone(), update("ghost")).await?.is_none());
    assert!(store.delete_user(ghost.clone()).await?.is_none());
    assert!(store.find_by_external_id(ghost).await?.is_none());

    db.drop().await
}

#[tokio::test]
async fn delete_returns_removed_row() -> Result<()> {
    let Some(db) = TestSchema::create().await? else { return Ok(()) };
    let store = db.store();
    let created = store.create_user(new_user("user_1")).await?.context("row inserted")?;

    let removed = store.delete_user(ExternalUserId::from("user_1")).await?;

    assert_eq!(removed, Some(created));
    assert!(store.find_by_external_id(ExternalUserId::from("user_1")).await?.is_none());
    assert!(store.delete_user(ExternalUserId::from("user_1")).await?.is_none());

    db.drop().await
}

#[tokio::test]
async fn health_check_queries_database() -> Result<()> {
    let Some(db) = TestSchema::create().await? else { return Ok(()) };

    db.store().health_check().await?;

    db.drop().await
}
