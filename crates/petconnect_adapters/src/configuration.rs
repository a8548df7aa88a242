use std::path::PathBuf;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use petconnect_core::config::{
    Settings, DEFAULT_API_BASE_URL, DEFAULT_WS_ORIGIN, DEFAULT_WS_URL,
};

pub const ENV_PREFIX: &str = "PETCONNECT";

pub fn get_configuration_with_paths(
    current_dir_path: Option<PathBuf>,
    system_config_dir_path: Option<PathBuf>,
) -> Result<Settings, config::ConfigError> {
    let config_directory = current_dir_path.unwrap_or_else(|| {
        std::env::current_dir()
            .map(|p| p.join("config"))
            .unwrap_or_else(|_| PathBuf::from("config"))
    });

    let system_config_dir = match system_config_dir_path {
        Some(path) => path,
        None => ProjectDirs::from("com", "petconnect", "petconnect")
            .map(|d| d.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("config")),
    };

    let settings = Config::builder()
        .set_default("api.base_url", DEFAULT_API_BASE_URL)?
        .set_default("api.ws_url", DEFAULT_WS_URL)?
        .set_default("api.ws_origin", DEFAULT_WS_ORIGIN)?
        .set_default("api.timeout_secs", 30)?
        .set_default("api.connect_timeout_secs", 10)?
        // Backend names are lowercase strings
        .set_default("storage.backend", "file")?
        .set_default("log_level", "info")?
        .add_source(File::from(system_config_dir.join("config.toml")).required(false))
        .add_source(File::from(config_directory.join("config.toml")).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    settings.try_deserialize::<Settings>()
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    get_configuration_with_paths(None, None)
}
