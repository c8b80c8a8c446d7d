//! Broadcast Engine
//!
//! Fans a line out to every registered connection except the originator.
//! Iterates a registry snapshot, so no registry access is held while
//! writing. A peer that fails to accept the line is unregistered and
//! closed; delivery to the remaining peers continues.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::AppError;
use crate::registry::RegistryHandle;
use crate::types::ClientId;

/// Outcome of one broadcast call
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Peers that accepted the line
    pub delivered: usize,
    /// Peers dropped because the write failed
    pub dropped: Vec<ClientId>,
}

/// Delivers lines to all registered connections
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: RegistryHandle,
    /// Per-peer write deadline; `None` waits indefinitely
    write_timeout: Option<Duration>,
}

impl Broadcaster {
    pub fn new(registry: RegistryHandle, write_timeout: Option<Duration>) -> Self {
        Self {
            registry,
            write_timeout,
        }
    }

    /// Send `message` to every registered connection other than `exclude`
    ///
    /// Best-effort: no retry and no acknowledgement. Only a broken registry
    /// is reported as an error; per-peer failures are isolated.
    pub async fn broadcast(
        &self,
        message: &str,
        exclude: Option<ClientId>,
    ) -> Result<BroadcastReport, AppError> {
        let snapshot = self.registry.snapshot().await?;
        let mut report = BroadcastReport::default();

        for (client_id, client) in snapshot {
            if Some(client_id) == exclude {
                continue;
            }

            match client
                .handle
                .send(message.to_string(), self.write_timeout)
                .await
            {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        "Dropping {} ({}) after failed write: {}",
                        client.username, client_id, e
                    );
                    self.registry.unregister(client_id).await?;
                    client.handle.close();
                    report.dropped.push(client_id);
                }
            }
        }

        debug!(
            "Broadcast delivered to {}, dropped {}",
            report.delivered,
            report.dropped.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::test_handle;

    #[tokio::test]
    async fn test_broadcast_skips_sender() {
        let registry = RegistryHandle::spawn(16);
        let (a, mut ra) = test_handle(4);
        let (b, mut rb) = test_handle(4);
        let (c, mut rc) = test_handle(4);
        let a_id = a.id();
        registry.register(a, "A".to_string()).await.unwrap();
        registry.register(b, "B".to_string()).await.unwrap();
        registry.register(c, "C".to_string()).await.unwrap();

        let broadcaster = Broadcaster::new(registry, None);
        let report = broadcaster.broadcast("[A]: hi", Some(a_id)).await.unwrap();

        assert_eq!(report.delivered, 2);
        assert!(report.dropped.is_empty());
        assert_eq!(rb.recv().await.as_deref(), Some("[A]: hi"));
        assert_eq!(rc.recv().await.as_deref(), Some("[A]: hi"));
        assert!(ra.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_without_exclusion_reaches_everyone() {
        let registry = RegistryHandle::spawn(16);
        let (a, mut ra) = test_handle(4);
        let (b, mut rb) = test_handle(4);
        registry.register(a, "A".to_string()).await.unwrap();
        registry.register(b, "B".to_string()).await.unwrap();

        let broadcaster = Broadcaster::new(registry, None);
        let report = broadcaster.broadcast("notice", None).await.unwrap();

        assert_eq!(report.delivered, 2);
        assert_eq!(ra.recv().await.as_deref(), Some("notice"));
        assert_eq!(rb.recv().await.as_deref(), Some("notice"));
    }

    #[tokio::test]
    async fn test_failed_peer_is_dropped_and_others_still_receive() {
        let registry = RegistryHandle::spawn(16);
        let (a, _ra) = test_handle(4);
        let (b, rb) = test_handle(4);
        let (c, mut rc) = test_handle(4);
        let a_id = a.id();
        let b_id = b.id();
        let b_handle = b.clone();
        registry.register(a, "A".to_string()).await.unwrap();
        registry.register(b, "B".to_string()).await.unwrap();
        registry.register(c, "C".to_string()).await.unwrap();

        // B's writer is gone
        drop(rb);

        let broadcaster = Broadcaster::new(registry.clone(), None);
        let report = broadcaster.broadcast("[A]: hi", Some(a_id)).await.unwrap();

        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, vec![b_id]);
        assert_eq!(rc.recv().await.as_deref(), Some("[A]: hi"));
        assert!(b_handle.is_closed());

        let snapshot = registry.snapshot().await.unwrap();
        assert!(snapshot.iter().all(|(id, _)| *id != b_id));

        // Later broadcasts never target B again
        let report = broadcaster.broadcast("[A]: again", Some(a_id)).await.unwrap();
        assert_eq!(report.delivered, 1);
        assert!(report.dropped.is_empty());
    }

    #[tokio::test]
    async fn test_stalled_peer_is_dropped_after_deadline() {
        let registry = RegistryHandle::spawn(16);
        let (slow, _slow_rx) = test_handle(1);
        let (fast, mut fast_rx) = test_handle(4);
        let slow_id = slow.id();
        let slow_handle = slow.clone();
        registry.register(slow, "slow".to_string()).await.unwrap();
        registry.register(fast, "fast".to_string()).await.unwrap();

        // Fill the stalled peer's queue
        slow_handle.send("backlog".to_string(), None).await.unwrap();

        let broadcaster = Broadcaster::new(registry.clone(), Some(Duration::from_millis(30)));
        let report = broadcaster.broadcast("tick", None).await.unwrap();

        assert_eq!(report.dropped, vec![slow_id]);
        assert_eq!(report.delivered, 1);
        assert_eq!(fast_rx.recv().await.as_deref(), Some("tick"));
        assert!(slow_handle.is_closed());
        assert_eq!(registry.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_broadcast_to_empty_registry() {
        let registry = RegistryHandle::spawn(16);
        let broadcaster = Broadcaster::new(registry, None);
        let report = broadcaster.broadcast("anyone?", None).await.unwrap();
        assert_eq!(report, BroadcastReport::default());
    }
}
