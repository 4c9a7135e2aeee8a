//! `ChatZone` relay server -- room-based WebSocket chat fan-out.
//!
//! An axum WebSocket server where clients join named rooms and exchange
//! text messages and typing indicators with the other members of the same
//! room.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:8080
//! cargo run --bin chatzone-relay
//!
//! # Run on custom address
//! cargo run --bin chatzone-relay -- --bind 127.0.0.1:9000
//!
//! # Or via environment variable
//! CHATZONE_ADDR=127.0.0.1:9000 cargo run --bin chatzone-relay
//! ```

use std::sync::Arc;

use chatzone_relay::config::{RelayCliArgs, RelayConfig};
use chatzone_relay::relay::{self, RelayState};
use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = RelayCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match RelayConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting chatzone relay server");

    let state = Arc::new(RelayState::new());

    match relay::start_server_with_state(&config.bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "relay server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "relay server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start relay server");
            std::process::exit(1);
        }
    }
}
