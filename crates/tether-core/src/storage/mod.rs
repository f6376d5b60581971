//! User persistence behind a trait seam.
//!
//! The ingress only talks to [`UserStore`]. Production wires in
//! [`PostgresUserStore`]; tests use [`mock::MockUserStore`], which keeps
//! users in memory and records every call it receives.

use std::{future::Future, pin::Pin, sync::Arc};

use sqlx::PgPool;

pub mod users;

use crate::{
    error::Result,
    models::{ExternalUserId, NewUser, User, UserUpdate},
};

/// Storage operations the webhook ingress performs.
///
/// Each method returns the affected row, or `None` when there was nothing to
/// act on, so the ingress can report it back to the sender.
pub trait UserStore: Send + Sync + 'static {
    /// Mirrors a newly created provider user.
    ///
    /// Returns the existing row if the provider id is already mirrored.
    fn create_user(
        &self,
        record: NewUser,
    ) -> Pin<Box<dyn Future<Output = Result<Option<User>>> + Send + '_>>;

    /// Applies a profile update to the user mirroring `clerk_id`.
    ///
    /// Returns `None` when no such user exists.
    fn update_user(
        &self,
        clerk_id: ExternalUserId,
        update: UserUpdate,
    ) -> Pin<Box<dyn Future<Output = Result<Option<User>>> + Send + '_>>;

    /// Deletes the user mirroring `clerk_id`.
    ///
    /// Returns the removed row, or `None` when no such user exists.
    fn delete_user(
        &self,
        clerk_id: ExternalUserId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<User>>> + Send + '_>>;

    /// Looks up the user mirroring `clerk_id`.
    fn find_by_external_id(
        &self,
        clerk_id: ExternalUserId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<User>>> + Send + '_>>;

    /// Verifies the backing store is reachable.
    fn health_check(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// PostgreSQL implementation of [`UserStore`].
#[derive(Clone)]
pub struct PostgresUserStore {
    users: Arc<users::Repository>,
}

impl PostgresUserStore {
    /// Creates a store over the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { users: Arc::new(users::Repository::new(Arc::new(pool))) }
    }

    /// Returns the user repository.
    pub fn users(&self) -> Arc<users::Repository> {
        self.users.clone()
    }
}

impl UserStore for PostgresUserStore {
    fn create_user(
        &self,
        record: NewUser,
    ) -> Pin<Box<dyn Future<Output = Result<Option<User>>> + Send + '_>> {
        Box::pin(async move { self.users.create(&record).await })
    }

    fn update_user(
        &self,
        clerk_id: ExternalUserId,
        update: UserUpdate,
    ) -> Pin<Box<dyn Future<Output = Result<Option<User>>> + Send + '_>> {
        Box::pin(async move { self.users.update(&clerk_id, &update).await })
    }

    fn delete_user(
        &self,
        clerk_id: ExternalUserId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<User>>> + Send + '_>> {
        Box::pin(async move { self.users.delete(&clerk_id).await })
    }

    fn find_by_external_id(
        &self,
        clerk_id: ExternalUserId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<User>>> + Send + '_>> {
        Box::pin(async move { self.users.find_by_external_id(&clerk_id).await })
    }

    fn health_check(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&*self.users.pool()).await?;
            Ok(())
        })
    }
}

/// Creates the `users` table and its indexes if they do not exist.
///
/// # Errors
///
/// Returns `CoreError::Database` if any statement fails.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS users (
            id UUID PRIMARY KEY,
            clerk_id TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL,
            username TEXT NOT NULL,
            first_name TEXT,
            last_name TEXT,
            photo TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_users_email ON users(email)")
        .execute(pool)
        .await?;

    Ok(())
}

pub mod mock {
    //! In-memory user store for tests.
    //!
    //! Behaves like the PostgreSQL store (idempotent create, `None` for
    //! unknown ids) and records every call so tests can assert on exactly
    //! what the ingress asked for.

    use std::{collections::HashMap, future::Future, pin::Pin, sync::Arc};

    use chrono::Utc;
    use tokio::sync::RwLock;

    use super::UserStore;
    use crate::{
        error::{CoreError, Result},
        models::{ExternalUserId, NewUser, User, UserId, UserUpdate},
    };

    /// A call received by [`MockUserStore`].
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum StoreCall {
        /// `create_user`
        Create(NewUser),
        /// `update_user`
        Update(ExternalUserId, UserUpdate),
        /// `delete_user`
        Delete(ExternalUserId),
    }

    /// In-memory [`UserStore`] with call recording and failure injection.
    #[derive(Debug, Clone, Default)]
    pub struct MockUserStore {
        users: Arc<RwLock<HashMap<ExternalUserId, User>>>,
        calls: Arc<RwLock<Vec<StoreCall>>>,
        failure: Arc<RwLock<Option<String>>>,
        create_returns_none: Arc<RwLock<bool>>,
    }

    impl MockUserStore {
        /// Creates an empty store.
        pub fn new() -> Self {
            Self::default()
        }

        /// Seeds a user without recording a call.
        pub async fn insert(&self, user: User) {
            self.users.write().await.insert(user.clerk_id.clone(), user);
        }

        /// Makes every subsequent operation fail with a database error.
        pub async fn inject_failure(&self, message: impl Into<String>) {
            *self.failure.write().await = Some(message.into());
        }

        /// Clears an injected failure.
        pub async fn clear_failure(&self) {
            *self.failure.write().await = None;
        }

        /// Makes `create_user` report that no row was produced.
        pub async fn create_returns_none(&self, value: bool) {
            *self.create_returns_none.write().await = value;
        }

        /// Returns every recorded call in order.
        pub async fn calls(&self) -> Vec<StoreCall> {
            self.calls.read().await.clone()
        }

        /// Returns the stored row for `clerk_id`.
        pub async fn get(&self, clerk_id: &ExternalUserId) -> Option<User> {
            self.users.read().await.get(clerk_id).cloned()
        }

        /// Returns the number of stored users.
        pub async fn len(&self) -> usize {
            self.users.read().await.len()
        }

        /// Returns whether the store holds no users.
        pub async fn is_empty(&self) -> bool {
            self.users.read().await.is_empty()
        }

        async fn check_failure(&self) -> Result<()> {
            match self.failure.read().await.as_ref() {
                Some(message) => Err(CoreError::Database(message.clone())),
                None => Ok(()),
            }
        }
    }

    impl UserStore for MockUserStore {
        fn create_user(
            &self,
            record: NewUser,
        ) -> Pin<Box<dyn Future<Output = Result<Option<User>>> + Send + '_>> {
            Box::pin(async move {
                self.calls.write().await.push(StoreCall::Create(record.clone()));
                self.check_failure().await?;

                if *self.create_returns_none.read().await {
                    return Ok(None);
                }

                let mut users = self.users.write().await;
                let user = users
                    .entry(record.clerk_id.clone())
                    .or_insert_with(|| User::from_new(UserId::new(), &record, Utc::now()))
                    .clone();
                Ok(Some(user))
            })
        }

        fn update_user(
            &self,
            clerk_id: ExternalUserId,
            update: UserUpdate,
        ) -> Pin<Box<dyn Future<Output = Result<Option<User>>> + Send + '_>> {
            Box::pin(async move {
                self.calls.write().await.push(StoreCall::Update(clerk_id.clone(), update.clone()));
                self.check_failure().await?;

                let mut users = self.users.write().await;
                Ok(users.get_mut(&clerk_id).map(|user| {
                    update.apply(user, Utc::now());
                    user.clone()
                }))
            })
        }

        fn delete_user(
            &self,
            clerk_id: ExternalUserId,
        ) -> Pin<Box<dyn Future<Output = Result<Option<User>>> + Send + '_>> {
            Box::pin(async move {
                self.calls.write().await.push(StoreCall::Delete(clerk_id.clone()));
                self.check_failure().await?;

                Ok(self.users.write().await.remove(&clerk_id))
            })
        }

        fn find_by_external_id(
            &self,
            clerk_id: ExternalUserId,
        ) -> Pin<Box<dyn Future<Output = Result<Option<User>>> + Send + '_>> {
            Box::pin(async move {
                self.check_failure().await?;
                Ok(self.get(&clerk_id).await)
            })
        }

        fn health_check(&self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
            Box::pin(async move { self.check_failure().await })
        }
    }
}
