//! User domain models and strongly-typed identifiers.
//!
//! Defines the persisted `User` row, the records the ingress hands to the
//! user store, and newtype wrappers that keep Tether's internal ids apart
//! from the identity provider's external ids.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Tether's internal user identifier.
///
/// Assigned when the user row is created and written back to the identity
/// provider as `public_metadata.userId`.
///
/// # Example
///
/// ```
/// use tether_core::models::UserId;
/// let user_id = UserId::new();
/// println!("Created user: {}", user_id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Creates a new random user ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for UserId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl sqlx::Type<PgDb> for UserId {
    fn type_info() -> PgTypeInfo {
        <Uuid as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for UserId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let uuid = <Uuid as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(uuid))
    }
}

impl sqlx::Encode<'_, PgDb> for UserId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <Uuid as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// The identity provider's user identifier (`user_...`).
///
/// Opaque to Tether. Serialized as a bare string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExternalUserId(pub String);

impl ExternalUserId {
    /// Wraps a provider user id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalUserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExternalUserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ExternalUserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl sqlx::Type<PgDb> for ExternalUserId {
    fn type_info() -> PgTypeInfo {
        <String as sqlx::Type<PgDb>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        <String as sqlx::Type<PgDb>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for ExternalUserId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let id = <String as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(id))
    }
}

impl sqlx::Encode<'_, PgDb> for ExternalUserId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// A locally mirrored user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Internal identifier.
    pub id: UserId,
    /// Identity provider id this row mirrors.
    pub clerk_id: ExternalUserId,
    /// Primary email address captured at creation.
    pub email: String,
    /// Provider username.
    pub username: String,
    /// Given name, if the provider collected one.
    pub first_name: Option<String>,
    /// Family name, if the provider collected one.
    pub last_name: Option<String>,
    /// Profile image URL.
    pub photo: Option<String>,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last changed.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Builds a fresh row from a create record.
    pub fn from_new(id: UserId, record: &NewUser, now: DateTime<Utc>) -> Self {
        Self {
            id,
            clerk_id: record.clerk_id.clone(),
            email: record.email.clone(),
            username: record.username.clone(),
            first_name: record.first_name.clone(),
            last_name: record.last_name.clone(),
            photo: record.photo.clone(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fields accepted when creating a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    /// Identity provider id.
    pub clerk_id: ExternalUserId,
    /// First address in the provider's email list.
    pub email: String,
    /// Provider username.
    pub username: String,
    /// Given name.
    pub first_name: Option<String>,
    /// Family name.
    pub last_name: Option<String>,
    /// Profile image URL.
    pub photo: Option<String>,
}

/// Fields accepted when updating a user.
///
/// Email is not part of the update contract; the address captured at
/// creation is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    /// Given name.
    pub first_name: Option<String>,
    /// Family name.
    pub last_name: Option<String>,
    /// Provider username.
    pub username: String,
    /// Profile image URL.
    pub photo: Option<String>,
}

impl UserUpdate {
    /// Applies the update to an in-memory row.
    pub fn apply(&self, user: &mut User, now: DateTime<Utc>) {
        user.first_name.clone_from(&self.first_name);
        user.last_name.clone_from(&self.last_name);
        user.username.clone_from(&self.username);
        user.photo.clone_from(&self.photo);
        user.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample_new_user() -> NewUser {
        NewUser {
            clerk_id: ExternalUserId::from("user_1"),
            email: "a@b.com".to_string(),
            username: "abu".to_string(),
            first_name: Some("A".to_string()),
            last_name: None,
            photo: Some("http://img".to_string()),
        }
    }

    #[test]
    fn new_user_serializes_camel_case() {
        let value = serde_json::to_value(sample_new_user()).unwrap();

        assert_eq!(
            value,
            json!({
                "clerkId": "user_1",
                "email": "a@b.com",
                "username": "abu",
                "firstName": "A",
                "lastName": null,
                "photo": "http://img",
            })
        );
    }

    #[test]
    fn user_update_has_no_email_field() {
        let update = UserUpdate {
            first_name: None,
            last_name: None,
            username: "abu".to_string(),
            photo: None,
        };

        let value = serde_json::to_value(update).unwrap();
        assert!(value.get("email").is_none());
    }

    #[test]
    fn apply_update_keeps_email_and_identity() {
        let created = Utc::now();
        let mut user = User::from_new(UserId::new(), &sample_new_user(), created);
        let original_id = user.id;
        let later = created + chrono::Duration::seconds(5);

        UserUpdate {
            first_name: Some("Ada".to_string()),
            last_name: Some("Byron".to_string()),
            username: "ada".to_string(),
            photo: None,
        }
        .apply(&mut user, later);

        assert_eq!(user.id, original_id);
        assert_eq!(user.email, "a@b.com");
        assert_eq!(user.username, "ada");
        assert_eq!(user.first_name.as_deref(), Some("Ada"));
        assert_eq!(user.photo, None);
        assert_eq!(user.created_at, created);
        assert_eq!(user.updated_at, later);
    }

    #[test]
    fn external_id_serializes_as_plain_string() {
        let id = ExternalUserId::from("user_2kerzjYiQFhFNCQW0pGVYmVoC48");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"user_2kerzjYiQFhFNCQW0pGVYmVoC48\"");
        assert_eq!(id.to_string(), "user_2kerzjYiQFhFNCQW0pGVYmVoC48");
    }
}
