//! Identity-provider webhook events.
//!
//! A webhook body is an envelope `{"type": ..., "data": {...}}`. Decoding
//! happens in two steps: the envelope first, then `data` according to
//! `type`. Unknown types decode to [`UserEvent::Unhandled`] so the ingress
//! can acknowledge them without touching storage.
//!
//! Projections into store records validate the fields each event kind needs
//! and report [`TetherError::MalformedPayload`] instead of assuming the
//! provider always sends them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    error::TetherError,
    models::{ExternalUserId, NewUser, UserUpdate},
};

/// Event type sent when a user signs up.
pub const USER_CREATED: &str = "user.created";
/// Event type sent when a user profile changes.
pub const USER_UPDATED: &str = "user.updated";
/// Event type sent when a user is deleted.
pub const USER_DELETED: &str = "user.deleted";

/// Raw webhook envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Event kind discriminant.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Kind-specific payload.
    #[serde(default)]
    pub data: Value,
    /// Provider object tag, `"event"` in practice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
    /// Provider-side emission time in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Provider instance that emitted the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

/// An email address entry on a provider user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    /// Provider id of the address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The address itself.
    pub email_address: String,
}

/// Provider user object carried by `user.created` and `user.updated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPayload {
    /// Provider user id.
    pub id: ExternalUserId,
    /// All addresses on the account, in provider order.
    #[serde(default)]
    pub email_addresses: Vec<EmailAddress>,
    /// Provider id of the primary address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_email_address_id: Option<String>,
    /// Username, null when usernames are disabled on the instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Given name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Family name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Profile image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Creation time in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    /// Last update time in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<i64>,
    /// Metadata readable from the frontend.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub public_metadata: Map<String, Value>,
}

impl UserPayload {
    /// Returns the first address in the list.
    ///
    /// Only the first entry is considered; a blank first address yields
    /// `None` even when later entries are set.
    pub fn primary_email(&self) -> Option<&str> {
        self.email_addresses
            .first()
            .map(|address| address.email_address.trim())
            .filter(|address| !address.is_empty())
    }

    fn required_username(&self) -> Result<&str, TetherError> {
        self.username
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| TetherError::malformed(format!("user {} has no username", self.id)))
    }

    /// Projects the payload into a create record.
    ///
    /// # Errors
    ///
    /// Returns `MalformedPayload` when the user has no email address or no
    /// username.
    pub fn to_new_user(&self) -> Result<NewUser, TetherError> {
        let email = self.primary_email().ok_or_else(|| {
            TetherError::malformed(format!("user {} has no email address", self.id))
        })?;
        let username = self.required_username()?;

        Ok(NewUser {
            clerk_id: self.id.clone(),
            email: email.to_string(),
            username: username.to_string(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            photo: self.image_url.clone(),
        })
    }

    /// Projects the payload into an update record.
    ///
    /// # Errors
    ///
    /// Returns `MalformedPayload` when the user has no username.
    pub fn to_update(&self) -> Result<UserUpdate, TetherError> {
        let username = self.required_username()?;

        Ok(UserUpdate {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            username: username.to_string(),
            photo: self.image_url.clone(),
        })
    }
}

/// Payload carried by `user.deleted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedUserPayload {
    /// Provider user id. Optional in the provider schema.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ExternalUserId>,
    /// Always `true` for deletions.
    #[serde(default)]
    pub deleted: bool,
    /// Provider object tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
}

impl DeletedUserPayload {
    /// Returns the id of the deleted user.
    ///
    /// # Errors
    ///
    /// Returns `MalformedPayload` when the provider omitted the id.
    pub fn external_id(&self) -> Result<&ExternalUserId, TetherError> {
        self.id
            .as_ref()
            .filter(|id| !id.as_str().is_empty())
            .ok_or_else(|| TetherError::malformed("deleted user has no id"))
    }
}

/// A decoded webhook event, one variant per kind Tether acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum UserEvent {
    /// `user.created`
    UserCreated(UserPayload),
    /// `user.updated`
    UserUpdated(UserPayload),
    /// `user.deleted`
    UserDeleted(DeletedUserPayload),
    /// Any other event kind; acknowledged without action.
    Unhandled {
        /// The event kind as sent.
        event_type: String,
    },
}

impl UserEvent {
    /// Decodes a raw JSON body.
    ///
    /// # Errors
    ///
    /// Returns `MalformedPayload` when the body is not an envelope or the
    /// data does not match the shape its event kind requires.
    pub fn from_slice(body: &[u8]) -> Result<Self, TetherError> {
        let envelope: EventEnvelope = serde_json::from_slice(body)
            .map_err(|e| TetherError::malformed(format!("invalid event envelope: {e}")))?;
        Self::from_envelope(envelope)
    }

    /// Decodes the data of an already parsed envelope.
    ///
    /// # Errors
    ///
    /// Returns `MalformedPayload` when `data` does not match the kind.
    pub fn from_envelope(envelope: EventEnvelope) -> Result<Self, TetherError> {
        let EventEnvelope { event_type, data, .. } = envelope;

        let event = match event_type.as_str() {
            USER_CREATED => Self::UserCreated(decode_data(&event_type, data)?),
            USER_UPDATED => Self::UserUpdated(decode_data(&event_type, data)?),
            USER_DELETED => Self::UserDeleted(decode_data(&event_type, data)?),
            _ => Self::Unhandled { event_type },
        };

        Ok(event)
    }

    /// Returns the event kind as sent by the provider.
    pub fn event_type(&self) -> &str {
        match self {
            Self::UserCreated(_) => USER_CREATED,
            Self::UserUpdated(_) => USER_UPDATED,
            Self::UserDeleted(_) => USER_DELETED,
            Self::Unhandled { event_type } => event_type,
        }
    }

    /// Returns the provider user id the event concerns, if any.
    pub fn external_id(&self) -> Option<&ExternalUserId> {
        match self {
            Self::UserCreated(user) | Self::UserUpdated(user) => Some(&user.id),
            Self::UserDeleted(deleted) => deleted.id.as_ref(),
            Self::Unhandled { .. } => None,
        }
    }

    /// Encodes the event back into an envelope.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the payload cannot be encoded.
    pub fn to_envelope(&self) -> serde_json::Result<EventEnvelope> {
        let data = match self {
            Self::UserCreated(user) | Self::UserUpdated(user) => serde_json::to_value(user)?,
            Self::UserDeleted(deleted) => serde_json::to_value(deleted)?,
            Self::Unhandled { .. } => Value::Object(Map::new()),
        };

        Ok(EventEnvelope {
            event_type: self.event_type().to_string(),
            data,
            object: Some("event".to_string()),
            timestamp: None,
            instance_id: None,
        })
    }
}

fn decode_data<T: serde::de::DeserializeOwned>(
    event_type: &str,
    data: Value,
) -> Result<T, TetherError> {
    serde_json::from_value(data)
        .map_err(|e| TetherError::malformed(format!("invalid {event_type} payload: {e}")))
}
