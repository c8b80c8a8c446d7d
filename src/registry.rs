//! Client Registry actor
//!
//! The single source of truth for who is connected. All state lives in the
//! `Registry` actor task; handlers and the broadcaster talk to it through a
//! cloneable `RegistryHandle`. Commands are processed one at a time, so every
//! register, unregister and snapshot is atomic with respect to the others.
//! The actor never performs network I/O.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::client::{Client, ClientHandle};
use crate::error::AppError;
use crate::types::ClientId;

/// Commands sent from handlers to the Registry actor
#[derive(Debug)]
pub enum RegistryCommand {
    /// Insert a newly handshaken client
    Register {
        handle: ClientHandle,
        username: String,
        reply: oneshot::Sender<Result<Client, AppError>>,
    },
    /// Remove a client, if present
    Unregister {
        client_id: ClientId,
        reply: oneshot::Sender<Option<Client>>,
    },
    /// Point-in-time copy of all clients, in registration order
    Snapshot {
        reply: oneshot::Sender<Vec<(ClientId, Client)>>,
    },
}

/// Registry entry with its registration sequence number
#[derive(Debug)]
struct Entry {
    seq: u64,
    client: Client,
}

/// The Registry actor
///
/// Uses a HashMap for O(1) register/unregister; snapshots are sorted by
/// registration sequence.
pub struct Registry {
    /// All registered clients: ClientId -> Entry
    clients: HashMap<ClientId, Entry>,
    /// Next registration sequence number
    next_seq: u64,
    /// Command receiver channel
    receiver: mpsc::Receiver<RegistryCommand>,
}

impl Registry {
    /// Create a new Registry with the given command receiver
    pub fn new(receiver: mpsc::Receiver<RegistryCommand>) -> Self {
        Self {
            clients: HashMap::new(),
            next_seq: 0,
            receiver,
        }
    }

    /// Run the Registry event loop
    ///
    /// Continuously receives and processes commands until all handles are dropped.
    pub async fn run(mut self) {
        info!("Client registry started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("Client registry shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Register {
                handle,
                username,
                reply,
            } => {
                let _ = reply.send(self.handle_register(handle, username));
            }
            RegistryCommand::Unregister { client_id, reply } => {
                let _ = reply.send(self.handle_unregister(client_id));
            }
            RegistryCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    fn handle_register(&mut self, handle: ClientHandle, username: String) -> Result<Client, AppError> {
        let client_id = handle.id();
        if self.clients.contains_key(&client_id) {
            return Err(AppError::AlreadyRegistered(client_id));
        }

        let client = Client::new(handle, username);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.clients.insert(
            client_id,
            Entry {
                seq,
                client: client.clone(),
            },
        );

        debug!("Registered {} (total clients: {})", client_id, self.clients.len());
        Ok(client)
    }

    fn handle_unregister(&mut self, client_id: ClientId) -> Option<Client> {
        let entry = self.clients.remove(&client_id)?;
        debug!("Unregistered {} (total clients: {})", client_id, self.clients.len());
        Some(entry.client)
    }

    fn snapshot(&self) -> Vec<(ClientId, Client)> {
        let mut entries: Vec<&Entry> = self.clients.values().collect();
        entries.sort_unstable_by_key(|entry| entry.seq);
        entries
            .into_iter()
            .map(|entry| (entry.client.id(), entry.client.clone()))
            .collect()
    }
}

/// Cloneable handle to a running Registry actor
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Start a Registry actor and return a handle to it
    pub fn spawn(buffer: usize) -> Self {
        let (sender, receiver) = mpsc::channel(buffer);
        tokio::spawn(Registry::new(receiver).run());
        Self { sender }
    }

    /// Register a client under its connection handle
    ///
    /// Fails with `AlreadyRegistered` if the handle is already present.
    pub async fn register(&self, handle: ClientHandle, username: String) -> Result<Client, AppError> {
        let (reply, rx) = oneshot::channel();
        self.request(RegistryCommand::Register {
            handle,
            username,
            reply,
        })
        .await?;
        rx.await.map_err(|_| AppError::RegistryClosed)?
    }

    /// Remove a client; returns `None` if it was not registered
    pub async fn unregister(&self, client_id: ClientId) -> Result<Option<Client>, AppError> {
        let (reply, rx) = oneshot::channel();
        self.request(RegistryCommand::Unregister { client_id, reply })
            .await?;
        rx.await.map_err(|_| AppError::RegistryClosed)
    }

    /// Copy of all registered clients, in registration order
    pub async fn snapshot(&self) -> Result<Vec<(ClientId, Client)>, AppError> {
        let (reply, rx) = oneshot::channel();
        self.request(RegistryCommand::Snapshot { reply }).await?;
        rx.await.map_err(|_| AppError::RegistryClosed)
    }

    /// Number of registered clients
    pub async fn len(&self) -> Result<usize, AppError> {
        Ok(self.snapshot().await?.len())
    }

    async fn request(&self, cmd: RegistryCommand) -> Result<(), AppError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| AppError::RegistryClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::test_handle;

    #[tokio::test]
    async fn test_register_and_snapshot_in_order() {
        let registry = RegistryHandle::spawn(16);
        let (a, _ra) = test_handle(4);
        let (b, _rb) = test_handle(4);
        let (c, _rc) = test_handle(4);
        let ids = [a.id(), b.id(), c.id()];

        registry.register(a, "A".to_string()).await.unwrap();
        registry.register(b, "B".to_string()).await.unwrap();
        registry.register(c, "C".to_string()).await.unwrap();

        let snapshot = registry.snapshot().await.unwrap();
        let order: Vec<ClientId> = snapshot.iter().map(|(id, _)| *id).collect();
        assert_eq!(order, ids);
        let names: Vec<&str> = snapshot.iter().map(|(_, c)| c.username.as_str()).collect();
        assert_eq!(names, ["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_double_register_is_rejected() {
        let registry = RegistryHandle::spawn(16);
        let (a, _ra) = test_handle(4);
        let id = a.id();

        registry.register(a.clone(), "A".to_string()).await.unwrap();
        let err = registry.register(a, "A again".to_string()).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyRegistered(dup) if dup == id));

        // The original entry is untouched
        let snapshot = registry.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].1.username, "A");
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let registry = RegistryHandle::spawn(16);
        let (a, _ra) = test_handle(4);
        let id = a.id();
        registry.register(a, "A".to_string()).await.unwrap();

        let removed = registry.unregister(id).await.unwrap();
        assert_eq!(removed.map(|c| c.username), Some("A".to_string()));
        assert!(registry.unregister(id).await.unwrap().is_none());
        assert_eq!(registry.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_is_a_copy() {
        let registry = RegistryHandle::spawn(16);
        let (a, _ra) = test_handle(4);
        let id = a.id();
        registry.register(a, "A".to_string()).await.unwrap();

        let snapshot = registry.snapshot().await.unwrap();
        registry.unregister(id).await.unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_registrations() {
        let registry = RegistryHandle::spawn(4);
        let mut tasks = Vec::new();
        for i in 0..50 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let (handle, rx) = test_handle(1);
                let id = handle.id();
                registry.register(handle, format!("user{}", i)).await.unwrap();
                if i % 2 == 0 {
                    assert!(registry.unregister(id).await.unwrap().is_some());
                }
                drop(rx);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(registry.len().await.unwrap(), 25);
    }
}
