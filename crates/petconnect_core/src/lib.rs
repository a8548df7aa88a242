pub mod api_client;
pub mod chat;
pub mod config;
pub mod entities;
pub mod error;
pub mod http;
pub mod middleware;
pub mod ports;
pub mod use_cases;

#[cfg(test)]
mod test_support;

pub use api_client::ApiClient;
pub use error::Error;
