//! Invite-gated TCP Chat Relay - Entry Point
//!
//! Loads configuration, builds the invite gate and runs the listener.

use std::env;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use invite_chat::{ChatServer, Config, InviteGate, InvitePolicy};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=invite_chat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("invite_chat=info")),
        )
        .init();

    // relay.toml and RELAY_* variables, then an optional bind address argument
    let mut config = Config::load()?;
    if let Some(addr) = env::args().nth(1) {
        config = config.with_bind_addr(addr)?;
    }

    let policy = config.invite_policy();
    let raw_codes = config.raw_invite_codes();
    let gate = if raw_codes.is_empty() {
        warn!(
            "No invite codes configured, generating {}",
            config.generated_invite_count
        );
        InviteGate::generate(config.generated_invite_count, policy)
    } else {
        InviteGate::from_raw_codes(raw_codes, policy)
    };

    match gate.policy() {
        InvitePolicy::Reusable => info!("Invite codes are reusable"),
        InvitePolicy::SingleUse => info!("Invite codes are single-use"),
    }
    info!("Invite codes (Base64):");
    for code in gate.codes() {
        info!("  {}", code);
    }

    let server = ChatServer::bind(&config, gate).await?;
    server.run().await;

    Ok(())
}
