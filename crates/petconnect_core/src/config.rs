use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_WS_URL: &str = "ws://localhost:8080";
/// The chat relay only accepts connections from whitelisted web origins.
pub const DEFAULT_WS_ORIGIN: &str = "http://localhost:5173";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub api: ApiSettings,
    pub storage: StorageSettings,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub ws_url: String,
    pub ws_origin: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct StorageSettings {
    pub backend: CredentialBackend,
    /// Directory for the file backend; the platform data dir when unset.
    pub dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api: ApiSettings::default(),
            storage: StorageSettings::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            ws_origin: DEFAULT_WS_ORIGIN.to_string(),
            timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("\"file\"", CredentialBackend::File)]
    #[case("\"keyring\"", CredentialBackend::Keyring)]
    #[case("\"memory\"", CredentialBackend::Memory)]
    fn test_credential_backend_names(#[case] raw: &str, #[case] expected: CredentialBackend) {
        let parsed: CredentialBackend = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_default_settings_snapshot() {
        let settings = Settings::default();
        insta::assert_json_snapshot!(settings, @r###"
        {
          "api": {
            "base_url": "http://localhost:8000/api",
            "ws_url": "ws://localhost:8080",
            "ws_origin": "http://localhost:5173",
            "timeout_secs": 30,
            "connect_timeout_secs": 10
          },
          "storage": {
            "backend": "file",
            "dir": null
          },
          "log_level": "info"
        }
        "###);
    }
}
