//! Client definitions
//!
//! `ClientHandle` is the connection handle shared between a connection's own
//! handler, the registry and the broadcaster. `Client` is the registry record
//! created when a connection finishes its handshake.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use crate::error::SendError;
use crate::types::ClientId;

/// Cloneable reference to one live connection
///
/// Lines sent through the handle are queued for the connection's writer
/// task. The socket itself is owned by the handler and its writer.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ClientId,
    peer: SocketAddr,
    /// Server → Client line queue
    outbound: mpsc::Sender<String>,
    /// Cancelled once the connection is closed, from either side
    closed: CancellationToken,
}

impl ClientHandle {
    pub fn new(
        id: ClientId,
        peer: SocketAddr,
        outbound: mpsc::Sender<String>,
        closed: CancellationToken,
    ) -> Self {
        Self {
            id,
            peer,
            outbound,
            closed,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Queue a line for this connection
    ///
    /// With a deadline, waiting longer than `deadline` for queue space counts
    /// as a failed write. Fails immediately once the connection is closed.
    pub async fn send(&self, line: String, deadline: Option<Duration>) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::ChannelClosed);
        }

        match deadline {
            Some(deadline) => self
                .outbound
                .send_timeout(line, deadline)
                .await
                .map_err(|e| match e {
                    SendTimeoutError::Timeout(_) => SendError::Timeout,
                    SendTimeoutError::Closed(_) => SendError::ChannelClosed,
                }),
            None => self
                .outbound
                .send(line)
                .await
                .map_err(|_| SendError::ChannelClosed),
        }
    }

    /// Mark the connection closed
    ///
    /// Wakes the handler's read loop and the writer task. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once [`close`](Self::close) has been called
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }
}

/// Registered client information
///
/// Created by the registry on successful handshake. The username is fixed
/// for the lifetime of the record.
#[derive(Debug, Clone)]
pub struct Client {
    /// Connection this client talks through
    pub handle: ClientHandle,
    /// Validated display name
    pub username: String,
    /// Registration time
    pub joined_at: Instant,
}

impl Client {
    /// Create a new client record, stamped with the current time
    pub fn new(handle: ClientHandle, username: String) -> Self {
        Self {
            handle,
            username,
            joined_at: Instant::now(),
        }
    }

    pub fn id(&self) -> ClientId {
        self.handle.id()
    }

    /// Time since registration
    pub fn session_duration(&self) -> Duration {
        self.joined_at.elapsed()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn test_handle(capacity: usize) -> (ClientHandle, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let handle = ClientHandle::new(ClientId::new(), peer, tx, CancellationToken::new());
        (handle, rx)
    }

    #[tokio::test]
    async fn test_send_queues_line() {
        let (handle, mut rx) = test_handle(4);
        handle.send("hello".to_string(), None).await.unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let (handle, rx) = test_handle(4);
        drop(rx);
        assert_eq!(
            handle.send("x".to_string(), None).await,
            Err(SendError::ChannelClosed)
        );
    }

    #[tokio::test]
    async fn test_send_times_out_when_queue_is_full() {
        let (handle, _rx) = test_handle(1);
        let deadline = Some(Duration::from_millis(20));
        handle.send("first".to_string(), deadline).await.unwrap();
        assert_eq!(
            handle.send("second".to_string(), deadline).await,
            Err(SendError::Timeout)
        );
    }

    #[tokio::test]
    async fn test_close_is_observed_by_clones() {
        let (handle, _rx) = test_handle(4);
        let other = handle.clone();
        assert!(!other.is_closed());

        handle.close();
        handle.close();

        other.closed().await;
        assert!(other.is_closed());
        assert_eq!(
            other.send("late".to_string(), None).await,
            Err(SendError::ChannelClosed)
        );
    }

    #[tokio::test]
    async fn test_client_creation() {
        let (handle, _rx) = test_handle(4);
        let id = handle.id();
        let client = Client::new(handle, "Alice".to_string());

        assert_eq!(client.id(), id);
        assert_eq!(client.username, "Alice");
        assert!(client.session_duration() < Duration::from_secs(5));
    }
}
