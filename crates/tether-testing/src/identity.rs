//! In-memory identity provider double.

use std::sync::Arc;

use async_trait::async_trait;
use tether_api::{IdentityError, IdentityProvider};
use tether_core::{ExternalUserId, UserId};
use tokio::sync::RwLock;

/// Records every metadata write and optionally fails them.
#[derive(Debug, Clone, Default)]
pub struct RecordingIdentityProvider {
    calls: Arc<RwLock<Vec<(ExternalUserId, UserId)>>>,
    failure: Arc<RwLock<Option<IdentityError>>>,
}

impl RecordingIdentityProvider {
    /// Creates a provider that accepts every write.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail with `error`.
    pub async fn fail_with(&self, error: IdentityError) {
        *self.failure.write().await = Some(error);
    }

    /// Returns every write received, in order.
    pub async fn calls(&self) -> Vec<(ExternalUserId, UserId)> {
        self.calls.read().await.clone()
    }
}

#[async_trait]
impl IdentityProvider for RecordingIdentityProvider {
    async fn set_internal_id(
        &self,
        clerk_id: &ExternalUserId,
        user_id: UserId,
    ) -> Result<(), IdentityError> {
        self.calls.write().await.push((clerk_id.clone(), user_id));

        match self.failure.read().await.as_ref() {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}
