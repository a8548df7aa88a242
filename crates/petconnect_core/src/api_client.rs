use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::instrument;

use crate::error::Error;
use crate::http::{ApiRequest, ApiResponse, Attempt};
use crate::middleware::{BearerAuth, Middleware, Next, RefreshOnUnauthorized};
use crate::ports::{CredentialStore, HttpTransport};

/// Authenticated client for the PetConnect REST API.
///
/// Every call runs through the middleware chain; the default chain attaches
/// the stored access token and renews it once on a 401.
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn HttpTransport>, store: Arc<dyn CredentialStore>) -> Self {
        Self::builder(transport.clone())
            .with(RefreshOnUnauthorized::new(store.clone(), transport))
            .with(BearerAuth::new(store))
            .build()
    }

    pub fn builder(transport: Arc<dyn HttpTransport>) -> ApiClientBuilder {
        ApiClientBuilder {
            transport,
            middlewares: Vec::new(),
        }
    }

    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, Error> {
        Next::new(self.transport.as_ref(), &self.middlewares)
            .run(request, Attempt::First)
            .await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        self.execute(ApiRequest::get(path)).await?.json()
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, Error>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.execute(ApiRequest::post(path).json(body)?)
            .await?
            .json()
    }

    pub async fn patch<B, T>(&self, path: &str, body: &B) -> Result<T, Error>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.execute(ApiRequest::patch(path).json(body)?)
            .await?
            .json()
    }

    pub async fn post_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        fields: Vec<(String, String)>,
    ) -> Result<T, Error> {
        self.execute(ApiRequest::post(path).multipart(fields))
            .await?
            .json()
    }

    pub async fn patch_multipart<T: DeserializeOwned>(
        &self,
        path: &str,
        fields: Vec<(String, String)>,
    ) -> Result<T, Error> {
        self.execute(ApiRequest::patch(path).multipart(fields))
            .await?
            .json()
    }
}

pub struct ApiClientBuilder {
    transport: Arc<dyn HttpTransport>,
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl ApiClientBuilder {
    /// Append a middleware; earlier ones wrap later ones.
    pub fn with(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middlewares.push(Arc::new(middleware));
        self
    }

    pub fn build(self) -> ApiClient {
        ApiClient {
            transport: self.transport,
            middlewares: self.middlewares,
        }
    }
}
