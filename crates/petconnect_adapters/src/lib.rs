pub mod chat_socket;
pub mod configuration;
pub mod credentials;
pub mod network;
pub mod telemetry;
pub mod transport;

// Re-exports for convenience
pub use chat_socket::WsChatConnection;
pub use credentials::{
    open_credential_store, FileCredentialStore, KeyringCredentialStore, MemoryCredentialStore,
};
pub use network::build_api_client;
pub use transport::ReqwestTransport;
