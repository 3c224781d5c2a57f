//! huddle-relay: WebSocket signaling relay for mesh conferencing rooms.
//!
//! Clients announce themselves with `join`, learn who is already in the
//! room, and from then on exchange offers, answers, candidates and side
//! messages through the relay. Addressed messages reach only their
//! recipient; everything else fans out to the rest of the room. Media
//! never passes through here.

mod connection;
mod room;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use huddle_config::HuddleConfig;
use tokio::net::TcpListener;

use crate::connection::serve;
use crate::room::RoomStore;

#[derive(Parser)]
#[command(name = "huddle-relay", about = "WebSocket signaling relay for huddle rooms")]
struct Args {
    /// Port to listen on.
    #[arg(short, long, default_value_t = 8787)]
    port: u16,

    /// Seconds an empty room is kept before it is reaped.
    #[arg(long, default_value_t = 300)]
    room_ttl: u64,

    /// Maximum members per room.
    #[arg(long, default_value_t = 16)]
    max_room_size: usize,

    /// huddle config file; its `logging.level` applies when RUST_LOG is unset.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Filter directive used when RUST_LOG is unset.
fn default_directive(config: Option<&HuddleConfig>) -> String {
    config.map_or_else(|| "huddle_relay=info".to_string(), |c| c.logging.level.clone())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let args = Args::parse();
    let config = args
        .config
        .as_deref()
        .map(huddle_config::toml_loader::load_from_path)
        .transpose();

    let directive = default_directive(config.as_ref().ok().and_then(Option::as_ref));
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| directive.into()),
        )
        .init();

    if let Err(e) = config {
        tracing::error!(error = %e, "Failed to load config");
        return Err(std::io::Error::other(e));
    }

    let store = RoomStore::new(args.max_room_size);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        tracing::error!(addr = %addr, error = %e, "Failed to bind TCP listener");
        e
    })?;

    tracing::info!("huddle-relay listening on {}", addr);

    // Empty-room reaper.
    let reaper_store = store.clone();
    let ttl = Duration::from_secs(args.room_ttl);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(60)).await;
            let reaped = reaper_store.reap_empty(ttl).await;
            let count = reaper_store.count().await;
            tracing::debug!(rooms = count, reaped, "Reaper tick");
        }
    });

    serve(listener, store).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_directive_comes_from_config_when_given() {
        assert_eq!(default_directive(None), "huddle_relay=info");

        let mut config = HuddleConfig::default();
        assert_eq!(default_directive(Some(&config)), "huddle=info");
        config.logging.level = "huddle_relay=debug".into();
        assert_eq!(default_directive(Some(&config)), "huddle_relay=debug");
    }

    #[test]
    fn config_flag_is_optional() {
        let args = Args::parse_from(["huddle-relay"]);
        assert!(args.config.is_none());
        assert_eq!(args.port, 8787);

        let args = Args::parse_from(["huddle-relay", "--config", "/etc/huddle.toml", "-p", "9000"]);
        assert_eq!(args.config, Some(PathBuf::from("/etc/huddle.toml")));
        assert_eq!(args.port, 9000);
    }
}
