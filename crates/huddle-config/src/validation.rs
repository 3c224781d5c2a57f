//! Full configuration validation.
//!
//! Validates numeric ranges and the relay URL scheme, collecting every
//! problem into a single error.

use crate::schema::HuddleConfig;
use huddle_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &HuddleConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    let url = &config.signaling.relay_url;
    if !(url.starts_with("ws://") || url.starts_with("wss://")) {
        errors.push(format!(
            "signaling.relay_url = {url:?} must start with ws:// or wss://"
        ));
    }
    validate_range(
        &mut errors,
        "signaling.reconnect_delay_secs",
        config.signaling.reconnect_delay_secs,
        1,
        60,
    );
    validate_range(
        &mut errors,
        "signaling.connect_timeout_secs",
        config.signaling.connect_timeout_secs,
        1,
        120,
    );
    validate_range(
        &mut errors,
        "signaling.heartbeat_interval_secs",
        config.signaling.heartbeat_interval_secs,
        1,
        300,
    );

    validate_range(
        &mut errors,
        "peer.ice_gathering_timeout_ms",
        config.peer.ice_gathering_timeout_ms,
        100,
        30_000,
    );
    validate_range(
        &mut errors,
        "peer.disconnect_grace_secs",
        config.peer.disconnect_grace_secs,
        1,
        300,
    );
    validate_range(&mut errors, "peer.max_retries", config.peer.max_retries, 0, 5);

    validate_range(
        &mut errors,
        "room.max_participants",
        config.room.max_participants,
        2,
        64,
    );
    validate_range(&mut errors, "room.expiry_hours", config.room.expiry_hours, 1, 168);
    validate_range(
        &mut errors,
        "room.roster_poll_interval_secs",
        config.room.roster_poll_interval_secs,
        1,
        300,
    );

    validate_range(
        &mut errors,
        "side_channel.bus_capacity",
        config.side_channel.bus_capacity,
        1,
        65_536,
    );
    if config.side_channel.data_channel_label.trim().is_empty() {
        errors.push("side_channel.data_channel_label must not be empty".into());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_range(errors: &mut Vec<String>, name: &str, value: u32, min: u32, max: u32) {
    if value < min || value > max {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}
