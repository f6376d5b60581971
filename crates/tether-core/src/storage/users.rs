//! Repository for user database operations.
//!
//! Rows are keyed by the identity provider's id (`clerk_id`). Every write
//! returns the affected row so the ingress can echo it back to the sender.

use std::sync::Arc;

use sqlx::{Executor, PgPool, Postgres};

use crate::{
    error::Result,
    models::{ExternalUserId, NewUser, User, UserId, UserUpdate},
};

/// Repository for user database operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Inserts a user, or returns the existing row when the provider id is
    /// already mirrored.
    ///
    /// Providers redeliver `user.created` when an acknowledgement is lost, so
    /// a conflict on `clerk_id` is not an error.
    ///
    /// # Errors
    ///
    /// Returns error if the insert or the follow-up lookup fails.
    pub async fn create(&self, record: &NewUser) -> Result<Option<User>> {
        let inserted = sqlx::query_as::<_, User>(
            r"
            INSERT INTO users (id, clerk_id, email, username, first_name, last_name, photo)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (clerk_id) DO NOTHING
            RETURNING id, clerk_id, email, username, first_name, last_name, photo,
                      created_at, updated_at
            ",
        )
        .bind(UserId::new())
        .bind(&record.clerk_id)
        .bind(&record.email)
        .bind(&record.username)
        .bind(&record.first_name)
        .bind(&record.last_name)
        .bind(&record.photo)
        .fetch_optional(&*self.pool)
        .await?;

        match inserted {
            Some(user) => Ok(Some(user)),
            None => {
                tracing::debug!(clerk_id = %record.clerk_id, "user already mirrored");
                self.find_by_external_id_impl(&*self.pool, &record.clerk_id).await
            },
        }
    }

    /// Updates the mutable profile fields of a user.
    ///
    /// # Errors
    ///
    /// Returns error if the update fails.
    pub async fn update(
        &self,
        clerk_id: &ExternalUserId,
        update: &UserUpdate,
    ) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r"
            UPDATE users
            SET first_name = $2, last_name = $3, username = $4, photo = $5, updated_at = NOW()
            WHERE clerk_id = $1
            RETURNING id, clerk_id, email, username, first_name, last_name, photo,
                      created_at, updated_at
            ",
        )
        .bind(clerk_id)
        .bind(&update.first_name)
        .bind(&update.last_name)
        .bind(&update.username)
        .bind(&update.photo)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(user)
    }

    /// Deletes a user and returns the removed row.
    ///
    /// # Errors
    ///
    /// Returns error if the delete fails.
    pub async fn delete(&self, clerk_id: &ExternalUserId) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r"
            DELETE FROM users
            WHERE clerk_id = $1
            RETURNING id, clerk_id, email, username, first_name, last_name, photo,
                      created_at, updated_at
            ",
        )
        .bind(clerk_id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(user)
    }

    /// Finds a user by provider id.
    ///
    /// # Errors
    ///
    /// Returns error if query fails.
    pub async fn find_by_external_id(&self, clerk_id: &ExternalUserId) -> Result<Option<User>> {
        self.find_by_external_id_impl(&*self.pool, clerk_id).await
    }

    async fn find_by_external_id_impl<'e, E>(
        &self,
        executor: E,
        clerk_id: &ExternalUserId,
    ) -> Result<Option<User>>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let user = sqlx::query_as::<_, User>(
            r"
            SELECT id, clerk_id, email, username, first_name, last_name, photo,
                   created_at, updated_at
            FROM users
            WHERE clerk_id = $1
            ",
        )
        .bind(clerk_id)
        .fetch_optional(executor)
        .await?;

        Ok(user)
    }
}
