use async_trait::async_trait;

use crate::chat::{SocketEvent, SocketFrame};
use crate::entities::{CredentialKey, TokenPair, UserRecord};
use crate::error::Error;
use crate::http::{ApiRequest, ApiResponse};

// ============================================================================
// Credential Port
// ============================================================================

/// Persisted session credentials (`access`, `refresh`, cached `user`)
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, key: CredentialKey) -> Result<Option<String>, Error>;

    async fn set(&self, key: CredentialKey, value: &str) -> Result<(), Error>;

    /// Removing a missing key is not an error
    async fn remove(&self, key: CredentialKey) -> Result<(), Error>;

    /// Remove all three keys together
    async fn clear(&self) -> Result<(), Error>;

    /// Persist a fresh session
    async fn store_session(&self, tokens: &TokenPair, user: &UserRecord) -> Result<(), Error> {
        let user_json = serde_json::to_string(user)
            .map_err(|e| Error::CredentialStorage(format!("failed to serialize user: {}", e)))?;

        self.set(CredentialKey::Access, &tokens.access).await?;
        self.set(CredentialKey::Refresh, &tokens.refresh).await?;
        self.set(CredentialKey::User, &user_json).await
    }

    /// Both tokens, when both are present
    async fn tokens(&self) -> Result<Option<TokenPair>, Error> {
        let access = self.get(CredentialKey::Access).await?;
        let refresh = self.get(CredentialKey::Refresh).await?;
        Ok(access.zip(refresh).map(|(access, refresh)| TokenPair { access, refresh }))
    }
}

// ============================================================================
// Transport Ports
// ============================================================================

/// Sends a single request to the API. Any HTTP status is a successful send;
/// only failures without a response are errors.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, Error>;
}

/// Real-time chat relay connection
#[async_trait]
pub trait ChatConnection: Send + Sync {
    async fn send(&self, frame: &SocketFrame) -> Result<(), Error>;

    /// Next event from the relay; `None` once the connection is closed
    async fn recv(&self) -> Result<Option<SocketEvent>, Error>;

    async fn close(&self) -> Result<(), Error>;
}
