//! Interceptor chain wrapped around every API call.
//!
//! Middlewares run in registration order. Each one receives the request and a
//! [`Next`] cursor over the rest of the chain; the end of the chain sends the
//! request through the [`HttpTransport`] and turns non-2xx statuses into
//! [`Error::Http`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::entities::{CredentialKey, RefreshRequest, RefreshedAccess};
use crate::error::Error;
use crate::http::{ApiRequest, ApiResponse, Attempt};
use crate::ports::{CredentialStore, HttpTransport};

pub const TOKEN_REFRESH_PATH: &str = "/token/refresh/";

#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(
        &self,
        request: ApiRequest,
        attempt: Attempt,
        next: Next<'_>,
    ) -> Result<ApiResponse, Error>;
}

/// Remaining part of the chain. It is `Copy`, so a middleware may run the
/// rest of the chain more than once.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    transport: &'a dyn HttpTransport,
    chain: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    pub fn new(transport: &'a dyn HttpTransport, chain: &'a [Arc<dyn Middleware>]) -> Self {
        Self { transport, chain }
    }

    pub async fn run(self, request: ApiRequest, attempt: Attempt) -> Result<ApiResponse, Error> {
        match self.chain.split_first() {
            Some((head, tail)) => {
                let next = Next {
                    transport: self.transport,
                    chain: tail,
                };
                head.handle(request, attempt, next).await
            }
            None => self.transport.send(&request).await?.error_for_status(),
        }
    }
}

// ============================================================================
// Bearer token
// ============================================================================

/// Attaches `Authorization: Bearer <access>` when an access token is stored.
/// Without one the request goes out unauthenticated. A bearer already set by an
/// earlier middleware is left as it is.
pub struct BearerAuth {
    store: Arc<dyn CredentialStore>,
}

impl BearerAuth {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Middleware for BearerAuth {
    async fn handle(
        &self,
        mut request: ApiRequest,
        attempt: Attempt,
        next: Next<'_>,
    ) -> Result<ApiResponse, Error> {
        if request.bearer().is_none() {
            if let Some(token) = self.store.get(CredentialKey::Access).await? {
                request.set_bearer(&token);
            }
        }
        next.run(request, attempt).await
    }
}

// ============================================================================
// Refresh on 401
// ============================================================================

enum Renewal {
    Renewed(String),
    NoRefreshToken,
}

/// Recovers from an expired access token.
///
/// A first attempt answered with 401 triggers one renewal through
/// `POST /token/refresh/`, sent straight to the transport, followed by a single
/// retry of the original request through the rest of the chain. Retries never
/// renew again. When the refresh call fails the stored credentials are
/// cleared and the refresh error is returned instead of the original 401.
///
/// The access token is attached here, so the token compared on a 401 is the one
/// the request actually carried. Renewals are serialized: a request that waited
/// for another renewal reuses its token rather than refreshing a second time.
pub struct RefreshOnUnauthorized {
    store: Arc<dyn CredentialStore>,
    transport: Arc<dyn HttpTransport>,
    refresh_lock: Mutex<()>,
}

impl RefreshOnUnauthorized {
    pub fn new(store: Arc<dyn CredentialStore>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            store,
            transport,
            refresh_lock: Mutex::new(()),
        }
    }

    /// `stale` is the access token the failed attempt was sent with.
    async fn renew(&self, stale: Option<&str>) -> Result<Renewal, Error> {
        let _guard = self.refresh_lock.lock().await;

        if let Some(current) = self.store.get(CredentialKey::Access).await? {
            if Some(current.as_str()) != stale {
                debug!("access token already renewed by a concurrent request");
                return Ok(Renewal::Renewed(current));
            }
        }

        let Some(refresh) = self.store.get(CredentialKey::Refresh).await? else {
            debug!("no refresh token stored, giving up");
            return Ok(Renewal::NoRefreshToken);
        };

        match self.request_access(&refresh).await {
            Ok(renewed) => {
                self.store
                    .set(CredentialKey::Access, &renewed.access)
                    .await?;
                if let Some(rotated) = &renewed.refresh {
                    self.store.set(CredentialKey::Refresh, rotated).await?;
                }
                debug!("access token renewed");
                Ok(Renewal::Renewed(renewed.access))
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed, clearing stored credentials");
                if let Err(clear_err) = self.store.clear().await {
                    warn!(error = %clear_err, "failed to clear stored credentials");
                }
                Err(e)
            }
        }
    }

    #[instrument(skip_all)]
    async fn request_access(&self, refresh: &str) -> Result<RefreshedAccess, Error> {
        let request = ApiRequest::post(TOKEN_REFRESH_PATH).json(&RefreshRequest { refresh })?;

        self.transport
            .send(&request)
            .await?
            .error_for_status()?
            .json::<RefreshedAccess>()
    }
}

#[async_trait]
impl Middleware for RefreshOnUnauthorized {
    async fn handle(
        &self,
        mut request: ApiRequest,
        attempt: Attempt,
        next: Next<'_>,
    ) -> Result<ApiResponse, Error> {
        if request.bearer().is_none() {
            if let Some(token) = self.store.get(CredentialKey::Access).await? {
                request.set_bearer(&token);
            }
        }
        let sent_with = request.bearer().map(str::to_string);

        let error = match next.run(request.clone(), attempt).await {
            Ok(response) => return Ok(response),
            Err(e) => e,
        };

        if attempt == Attempt::Retry || !error.is_unauthorized() {
            return Err(error);
        }

        debug!(method = %request.method, path = %request.path, "got 401, renewing access token");

        match self.renew(sent_with.as_deref()).await? {
            Renewal::Renewed(token) => {
                let mut retry = request;
                retry.set_bearer(&token);
                next.run(retry, Attempt::Retry).await
            }
            Renewal::NoRefreshToken => Err(error),
        }
    }
}
