//! TOML config file loading and creation.

use crate::schema::HuddleConfig;
use crate::validation;
use huddle_common::ConfigError;
use std::path::Path;
use tracing::{info, warn};

/// Load config from a specific TOML file path.
///
/// Missing fields take serde defaults. A file that parses but fails
/// validation is logged and replaced by the default config.
pub fn load_from_path(path: &Path) -> Result<HuddleConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::ParseError(format!("failed to read {}: {e}", path.display()))
    })?;

    let config: HuddleConfig = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(format!("failed to parse TOML: {e}")))?;

    if let Err(e) = validation::validate(&config) {
        warn!("config validation warning: {e}");
        warn!("falling back to default config");
        return Ok(HuddleConfig::default());
    }

    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Load config from the platform-specific default path, creating a
/// commented default file when none exists.
pub fn load_default() -> Result<HuddleConfig, ConfigError> {
    let path = default_config_path()?;

    if !path.exists() {
        info!("no config found at {}, creating default", path.display());
        create_default_config(&path)?;
        return Ok(HuddleConfig::default());
    }

    load_from_path(&path)
}

/// Get the platform-specific default config file path.
pub fn default_config_path() -> Result<std::path::PathBuf, ConfigError> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::ParseError("could not determine config directory".into()))?;
    Ok(config_dir.join("huddle").join("config.toml"))
}

/// Create a default TOML config file with documentation comments.
pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ConfigError::ParseError(format!(
                "failed to create config directory {}: {e}",
                parent.display()
            ))
        })?;
    }

    std::fs::write(path, default_config_toml()).map_err(|e| {
        ConfigError::ParseError(format!(
            "failed to write default config to {}: {e}",
            path.display()
        ))
    })?;

    info!("created default config at {}", path.display());
    Ok(())
}

/// Generate the default TOML config content with comments.
fn default_config_toml() -> String {
    r##"# huddle configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.

[signaling]
# relay_url = "ws://127.0.0.1:8787"   # ws:// or wss://
# reconnect_delay_secs = 3            # 1-60, fixed backoff
# connect_timeout_secs = 15           # 1-120
# heartbeat_interval_secs = 25        # 1-300

[peer]
# ice_gathering_timeout_ms = 2000     # 100-30000
# disconnect_grace_secs = 10          # 1-300
# max_retries = 1                     # 0-5

[ice]
# stun_servers = ["stun:stun.l.google.com:19302"]
# turn_servers = []
# turn_username = ""
# turn_credential = ""

[room]
# max_participants = 8                # 2-64
# expiry_hours = 24                   # 1-168
# roster_poll_interval_secs = 5       # 1-300

[side_channel]
# bus_capacity = 256
# data_channel_label = "huddle"

[logging]
# level = "huddle=info"
"##
    .to_string()
}
