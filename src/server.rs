//! Listener
//!
//! Accepts TCP connections and spawns one detached handler task per
//! connection. No admission control: every accepted connection gets a task
//! and the accept loop never waits on a handler.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::broadcast::Broadcaster;
use crate::config::Config;
use crate::error::AppError;
use crate::handler::{handle_connection, HandlerContext, HandlerSettings};
use crate::invite::InviteGate;
use crate::registry::RegistryHandle;

/// Channel buffer size for registry commands
const REGISTRY_BUFFER_SIZE: usize = 256;

/// A bound chat relay, ready to accept connections
pub struct ChatServer {
    listener: TcpListener,
    ctx: HandlerContext,
}

impl ChatServer {
    /// Bind the listener and start the client registry
    ///
    /// Fails only if the address cannot be bound.
    pub async fn bind(config: &Config, gate: InviteGate) -> Result<Self, AppError> {
        let listener = TcpListener::bind(&config.bind_addr).await?;

        let registry = RegistryHandle::spawn(REGISTRY_BUFFER_SIZE);
        let broadcaster = Broadcaster::new(registry.clone(), config.write_timeout());
        let ctx = HandlerContext {
            registry,
            broadcaster,
            gate: Arc::new(gate),
            settings: HandlerSettings {
                max_line_length: config.max_line_length,
                outbound_buffer: config.outbound_buffer,
                write_timeout: config.write_timeout(),
            },
        };

        Ok(Self { listener, ctx })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr, AppError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> RegistryHandle {
        self.ctx.registry.clone()
    }

    /// Accept connections forever
    ///
    /// Accept failures are logged and skipped; a failing or panicking
    /// handler only ever ends its own task.
    pub async fn run(self) {
        info!(
            "Chat relay listening on {}",
            self.local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "unknown".to_string())
        );

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    debug!("New connection from {}", peer);
                    let ctx = self.ctx.clone();

                    // Spawn handler task for each connection
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, ctx).await {
                            error!("Connection handler error for {}: {}", peer, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}
