//! Shared HTTP client configuration for network operations.

use std::sync::Arc;
use std::time::Duration;

use petconnect_core::config::ApiSettings;
use petconnect_core::ports::CredentialStore;
use petconnect_core::{ApiClient, Error};
use reqwest::Client;

use crate::transport::ReqwestTransport;

pub const USER_AGENT: &str = concat!("petconnect/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client used for API calls, with the configured request and
/// connect timeouts.
pub fn build_http_client(settings: &ApiSettings) -> Result<Client, Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(settings.timeout_secs))
        .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
        .build()
        .map_err(|e| Error::Network(format!("failed to create HTTP client: {}", e)))
}

/// API client over reqwest with the default authentication chain.
pub fn build_api_client(
    settings: &ApiSettings,
    store: Arc<dyn CredentialStore>,
) -> Result<ApiClient, Error> {
    let transport = ReqwestTransport::new(build_http_client(settings)?, &settings.base_url);
    Ok(ApiClient::new(Arc::new(transport), store))
}
