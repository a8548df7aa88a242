use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::api_client::ApiClient;
use crate::entities::{
    CredentialKey, Credentials, LoginResponse, RefreshRequest, Registration, UserRecord,
};
use crate::error::Error;
use crate::http::ApiRequest;
use crate::ports::CredentialStore;

const LOGIN_PATH: &str = "/usuarios/login/";
const LOGOUT_PATH: &str = "/usuarios/logout/";
const REGISTER_PATH: &str = "/usuarios/";
const ME_PATH: &str = "/usuarios/me/";

/// Session lifecycle: sign-in, sign-up, sign-out and the cached account.
pub struct SessionUseCase {
    api: Arc<ApiClient>,
    store: Arc<dyn CredentialStore>,
}

impl SessionUseCase {
    pub fn new(api: Arc<ApiClient>, store: Arc<dyn CredentialStore>) -> Self {
        Self { api, store }
    }

    #[instrument(skip_all, fields(username = %credentials.username))]
    pub async fn login(&self, credentials: &Credentials) -> Result<UserRecord, Error> {
        let response: LoginResponse = self.api.post(LOGIN_PATH, credentials).await?;
        self.store
            .store_session(&response.tokens(), &response.user)
            .await?;

        info!(role = %response.user.role, "logged in");
        Ok(response.user)
    }

    /// Create an account and sign in with it.
    #[instrument(skip_all, fields(username = %registration.username, role = %registration.role))]
    pub async fn register(&self, registration: &Registration) -> Result<UserRecord, Error> {
        let created: Value = self.api.post(REGISTER_PATH, registration).await?;

        // Some deployments answer with a ready session
        if let Ok(session) = serde_json::from_value::<LoginResponse>(created) {
            self.store
                .store_session(&session.tokens(), &session.user)
                .await?;
            info!("registered and logged in");
            return Ok(session.user);
        }

        debug!("registration returned no session, logging in");
        self.login(&Credentials::new(
            registration.username.clone(),
            registration.password.clone(),
        ))
        .await
    }

    /// End the session. The backend is told about it when possible, but its
    /// answer does not matter: the local credentials are always removed.
    #[instrument(skip_all)]
    pub async fn logout(&self) -> Result<(), Error> {
        if let Some(refresh) = self.store.get(CredentialKey::Refresh).await? {
            let request = ApiRequest::post(LOGOUT_PATH).json(&RefreshRequest { refresh: &refresh })?;
            if let Err(e) = self.api.execute(request).await {
                warn!(error = %e, "backend logout failed, ignoring");
            }
        }

        self.store.clear().await?;
        info!("logged out");
        Ok(())
    }

    /// Fetch the signed-in account and refresh the cached copy.
    ///
    /// Any failure drops the cached `user` only; tokens are left alone.
    #[instrument(skip_all)]
    pub async fn current_user(&self) -> Result<Option<UserRecord>, Error> {
        match self.api.get::<UserRecord>(ME_PATH).await {
            Ok(user) => {
                let json = serde_json::to_string(&user).map_err(|e| {
                    Error::CredentialStorage(format!("failed to serialize user: {}", e))
                })?;
                self.store.set(CredentialKey::User, &json).await?;
                Ok(Some(user))
            }
            Err(e) => {
                warn!(error = %e, "failed to load current user");
                self.store.remove(CredentialKey::User).await?;
                Ok(None)
            }
        }
    }

    pub async fn cached_user(&self) -> Result<Option<UserRecord>, Error> {
        let Some(raw) = self.store.get(CredentialKey::User).await? else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                debug!(error = %e, "cached user record is unreadable");
                Ok(None)
            }
        }
    }

    pub async fn is_authenticated(&self) -> Result<bool, Error> {
        Ok(self.cached_user().await?.is_some())
    }

    /// Cached account, or [`Error::NotAuthenticated`].
    pub async fn require_user(&self) -> Result<UserRecord, Error> {
        self.cached_user().await?.ok_or(Error::NotAuthenticated)
    }
}
