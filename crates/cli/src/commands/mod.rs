pub mod config_cmd;
pub mod replay;

use std::path::Path;

use contextrank_config::{AppConfig, ConfigError};

/// Load the configuration from `explicit` or the default location.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match explicit {
        Some(path) => {
            let mut config = AppConfig::load_from(path)?;
            config.apply_env_overrides()?;
            config.validate()?;
            Ok(config)
        }
        None => AppConfig::load(),
    }
}
