//! Configuration for the chat relay
//!
//! Loaded from an optional `relay.toml` in the working directory, then
//! overridden by `RELAY_*` environment variables (e.g. `RELAY_BIND_ADDR`).
//! Every field has a default, so running with no configuration works.

use std::net::SocketAddr;
use std::time::Duration;

use config::builder::DefaultState;
use config::{ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;

use crate::invite::InvitePolicy;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// `RELAY_*` variables, kept as strings until deserialization so invite
/// codes like `007` reach the gate unchanged
fn environment() -> Environment {
    Environment::with_prefix("RELAY")
}

/// Relay configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the listener binds to
    pub bind_addr: String,

    /// Comma-separated raw invite codes; empty means generate some
    pub invite_codes: String,

    /// How many random codes to generate when none are configured
    pub generated_invite_count: usize,

    /// Consume an invite code on first use instead of keeping it valid
    pub single_use_invites: bool,

    /// Deadline for a single write to a peer, in milliseconds (0 = none)
    pub write_timeout_ms: u64,

    /// Longest accepted input line, in bytes
    pub max_line_length: usize,

    /// Capacity of each connection's outbound line queue
    pub outbound_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_ADDR.to_string(),
            invite_codes: String::new(),
            generated_invite_count: 4,
            single_use_invites: false,
            write_timeout_ms: 5_000,
            max_line_length: 1024,
            outbound_buffer: 32,
        }
    }
}

impl Config {
    /// Load configuration from `relay.toml` (if present) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_builder(
            config::Config::builder()
                .add_source(File::with_name("relay").required(false))
                .add_source(environment()),
        )
    }

    /// Build and validate from an already assembled set of sources
    pub(crate) fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Message(format!(
                "bind_addr '{}' is not a socket address",
                self.bind_addr
            )));
        }

        if self.max_line_length == 0 {
            return Err(ConfigError::Message(
                "max_line_length must be greater than 0".into(),
            ));
        }

        if self.outbound_buffer == 0 {
            return Err(ConfigError::Message(
                "outbound_buffer must be greater than 0".into(),
            ));
        }

        if self.raw_invite_codes().is_empty() && self.generated_invite_count == 0 {
            return Err(ConfigError::Message(
                "no invite codes configured and generated_invite_count is 0".into(),
            ));
        }

        Ok(())
    }

    /// Replace the bind address, e.g. from the command line
    pub fn with_bind_addr(mut self, addr: String) -> Result<Self, ConfigError> {
        self.bind_addr = addr;
        self.validate()?;
        Ok(self)
    }

    /// Configured raw invite codes, trimmed, blanks dropped
    pub fn raw_invite_codes(&self) -> Vec<&str> {
        self.invite_codes
            .split(',')
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .collect()
    }

    pub fn invite_policy(&self) -> InvitePolicy {
        InvitePolicy::from(self.single_use_invites)
    }

    /// Write deadline, or `None` when disabled
    pub fn write_timeout(&self) -> Option<Duration> {
        (self.write_timeout_ms > 0).then(|| Duration::from_millis(self.write_timeout_ms))
    }
}
