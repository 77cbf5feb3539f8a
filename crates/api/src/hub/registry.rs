//! The hub loop: sole owner of the client registry.
//!
//! Every registry mutation arrives as a message on one of the loop's
//! channels. Delivery into a peer's send buffer uses `try_send`; a full
//! buffer drops the message for that peer only.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use clubpulse_core::types::{DbId, TenantId};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

pub type PeerId = u64;

pub const DEFAULT_SEND_BUFFER: usize = 256;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    /// Per-peer outbound buffer.
    pub send_buffer: usize,
    /// Bound of each hub inbound channel.
    pub channel_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            send_buffer: DEFAULT_SEND_BUFFER,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// A connected client handed to the hub by its reader task.
#[derive(Debug)]
pub struct PeerRegistration {
    pub id: PeerId,
    pub tenant_id: TenantId,
    pub user_id: DbId,
    pub sender: mpsc::Sender<String>,
}

/// Peer-originated registry command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerCommand {
    Subscribe { peer: PeerId, topic: String },
    Unsubscribe { peer: PeerId, topic: String },
}

/// Fan-out to every peer, or to subscribers of `topic`.
#[derive(Debug, Clone)]
pub struct Broadcast {
    /// Restrict delivery to one tenant's peers. `None` reaches all tenants.
    pub tenant_id: Option<TenantId>,
    pub topic: Option<String>,
    pub payload: String,
    pub exclude: Option<PeerId>,
}

/// Delivery to every device of one user.
#[derive(Debug, Clone)]
pub struct Unicast {
    pub tenant_id: Option<TenantId>,
    pub user_id: DbId,
    pub payload: String,
    /// Skip devices subscribed to this topic; they already get the broadcast.
    pub skip_topic: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    pub clients: usize,
    pub users: usize,
    pub topics: usize,
}

#[derive(Debug, thiserror::Error)]
#[error("Event hub is shut down")]
pub struct HubClosed;

/// Cloneable sender side of the hub.
#[derive(Clone)]
pub struct HubHandle {
    register: mpsc::Sender<PeerRegistration>,
    unregister: mpsc::Sender<PeerId>,
    commands: mpsc::Sender<PeerCommand>,
    broadcast: mpsc::Sender<Broadcast>,
    unicast: mpsc::Sender<Unicast>,
    stats: mpsc::Sender<oneshot::Sender<HubStats>>,
    next_peer: Arc<AtomicU64>,
    send_buffer: usize,
}

impl HubHandle {
    pub fn next_peer_id(&self) -> PeerId {
        self.next_peer.fetch_add(1, Ordering::Relaxed)
    }

    pub fn send_buffer(&self) -> usize {
        self.send_buffer
    }

    pub async fn register(&self, peer: PeerRegistration) -> Result<(), HubClosed> {
        self.register.send(peer).await.map_err(|_| HubClosed)
    }

    pub async fn unregister(&self, peer: PeerId) {
        // A closed hub has already dropped every peer.
        let _ = self.unregister.send(peer).await;
    }

    pub async fn command(&self, command: PeerCommand) -> Result<(), HubClosed> {
        self.commands.send(command).await.map_err(|_| HubClosed)
    }

    /// Queue a broadcast. Returns `false` when it was dropped.
    pub fn broadcast(&self, message: Broadcast) -> bool {
        match self.broadcast.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!("Hub broadcast channel full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Queue a unicast. Returns `false` when it was dropped.
    pub fn unicast(&self, message: Unicast) -> bool {
        match self.unicast.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(message)) => {
                tracing::warn!(user_id = %message.user_id, "Hub unicast channel full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Registry counters, answered by the loop itself.
    pub async fn stats(&self) -> Option<HubStats> {
        let (tx, rx) = oneshot::channel();
        self.stats.send(tx).await.ok()?;
        rx.await.ok()
    }
}

struct Peer {
    tenant_id: TenantId,
    user_id: DbId,
    sender: mpsc::Sender<String>,
    topics: HashSet<String>,
}

/// The hub loop. Build with [`Hub::new`] and drive with [`Hub::run`].
pub struct Hub {
    register: mpsc::Receiver<PeerRegistration>,
    unregister: mpsc::Receiver<PeerId>,
    commands: mpsc::Receiver<PeerCommand>,
    broadcast: mpsc::Receiver<Broadcast>,
    unicast: mpsc::Receiver<Unicast>,
    stats: mpsc::Receiver<oneshot::Sender<HubStats>>,

    clients: HashMap<PeerId, Peer>,
    users: HashMap<DbId, HashSet<PeerId>>,
    topics: HashMap<String, HashSet<PeerId>>,
}

impl Hub {
    pub fn new(config: HubConfig) -> (Self, HubHandle) {
        let capacity = config.channel_capacity.max(1);
        let (register_tx, register) = mpsc::channel(capacity);
        let (unregister_tx, unregister) = mpsc::channel(capacity);
        let (commands_tx, commands) = mpsc::channel(capacity);
        let (broadcast_tx, broadcast) = mpsc::channel(capacity);
        let (unicast_tx, unicast) = mpsc::channel(capacity);
        let (stats_tx, stats) = mpsc::channel(16);

        let hub = Self {
            register,
            unregister,
            commands,
            broadcast,
            unicast,
            stats,
            clients: HashMap::new(),
            users: HashMap::new(),
            topics: HashMap::new(),
        };
        let handle = HubHandle {
            register: register_tx,
            unregister: unregister_tx,
            commands: commands_tx,
            broadcast: broadcast_tx,
            unicast: unicast_tx,
            stats: stats_tx,
            next_peer: Arc::new(AtomicU64::new(1)),
            send_buffer: config.send_buffer.max(1),
        };
        (hub, handle)
    }

    /// Process registry messages until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        tracing::info!("Event hub started");
        loop {
            // Biased so lifecycle messages are applied before fan-out that
            // was queued after them.
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(peer) = self.register.recv() => self.add(peer),
                Some(id) = self.unregister.recv() => self.remove(id),
                Some(command) = self.commands.recv() => self.apply(command),
                Some(message) = self.broadcast.recv() => self.fan_out(message),
                Some(message) = self.unicast.recv() => self.deliver_to_user(message),
                Some(reply) = self.stats.recv() => {
                    let _ = reply.send(self.snapshot());
                }
                else => break,
            }
        }
        self.shutdown();
    }

    fn snapshot(&self) -> HubStats {
        HubStats {
            clients: self.clients.len(),
            users: self.users.len(),
            topics: self.topics.len(),
        }
    }

    fn add(&mut self, reg: PeerRegistration) {
        tracing::debug!(peer_id = reg.id, tenant_id = %reg.tenant_id, user_id = %reg.user_id, "Peer registered");
        self.users.entry(reg.user_id).or_default().insert(reg.id);
        self.clients.insert(
            reg.id,
            Peer {
                tenant_id: reg.tenant_id,
                user_id: reg.user_id,
                sender: reg.sender,
                topics: HashSet::new(),
            },
        );
    }

    /// Drop a peer and every index entry pointing at it. Dropping the
    /// sender closes the peer's buffer, which ends its writer task.
    fn remove(&mut self, id: PeerId) {
        let Some(peer) = self.clients.remove(&id) else {
            return;
        };
        if let Some(set) = self.users.get_mut(&peer.user_id) {
            set.remove(&id);
            if set.is_empty() {
                self.users.remove(&peer.user_id);
            }
        }
        for topic in &peer.topics {
            self.unindex_topic(topic, id);
        }
        tracing::debug!(peer_id = id, "Peer unregistered");
    }

    fn unindex_topic(&mut self, topic: &str, id: PeerId) {
        if let Some(set) = self.topics.get_mut(topic) {
            set.remove(&id);
            if set.is_empty() {
                self.topics.remove(topic);
            }
        }
    }

    fn apply(&mut self, command: PeerCommand) {
        match command {
            PeerCommand::Subscribe { peer, topic } => {
                let Some(client) = self.clients.get_mut(&peer) else {
                    return;
                };
                client.topics.insert(topic.clone());
                self.topics.entry(topic).or_default().insert(peer);
            }
            PeerCommand::Unsubscribe { peer, topic } => {
                if let Some(client) = self.clients.get_mut(&peer) {
                    client.topics.remove(&topic);
                }
                self.unindex_topic(&topic, peer);
            }
        }
    }

    fn fan_out(&mut self, message: Broadcast) {
        let targets: Vec<PeerId> = match &message.topic {
            Some(topic) => self
                .topics
                .get(topic)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default(),
            None => self.clients.keys().copied().collect(),
        };

        let mut closed = Vec::new();
        for id in targets {
            if message.exclude == Some(id) {
                continue;
            }
            let Some(peer) = self.clients.get(&id) else {
                continue;
            };
            if message
                .tenant_id
                .as_ref()
                .is_some_and(|tenant| *tenant != peer.tenant_id)
            {
                continue;
            }
            if !offer(id, peer, &message.payload) {
                closed.push(id);
            }
        }
        for id in closed {
            self.remove(id);
        }
    }

    fn deliver_to_user(&mut self, message: Unicast) {
        let Some(ids) = self.users.get(&message.user_id) else {
            return;
        };
        let mut closed = Vec::new();
        for id in ids {
            let Some(peer) = self.clients.get(id) else {
                continue;
            };
            if message
                .tenant_id
                .as_ref()
                .is_some_and(|tenant| *tenant != peer.tenant_id)
            {
                continue;
            }
            if message
                .skip_topic
                .as_ref()
                .is_some_and(|topic| peer.topics.contains(topic))
            {
                continue;
            }
            if !offer(*id, peer, &message.payload) {
                closed.push(*id);
            }
        }
        for id in closed {
            self.remove(id);
        }
    }

    fn shutdown(&mut self) {
        let count = self.clients.len();
        let ids: Vec<PeerId> = self.clients.keys().copied().collect();
        for id in ids {
            self.remove(id);
        }
        tracing::info!(count, "Event hub stopped, all peers released");
    }
}

/// Enqueue without waiting. Returns `false` if the peer's buffer is closed.
fn offer(id: PeerId, peer: &Peer, payload: &str) -> bool {
    match peer.sender.try_send(payload.to_string()) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(_)) => {
            tracing::debug!(peer_id = id, "Peer send buffer full, message dropped");
            true
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    struct Client {
        id: PeerId,
        rx: mpsc::Receiver<String>,
    }

    async fn connect(handle: &HubHandle, tenant: &str, user: DbId, buffer: usize) -> Client {
        let id = handle.next_peer_id();
        let (tx, rx) = mpsc::channel(buffer);
        handle
            .register(PeerRegistration {
                id,
                tenant_id: tenant.to_string(),
                user_id: user,
                sender: tx,
            })
            .await
            .unwrap();
        Client { id, rx }
    }

    fn start() -> (HubHandle, CancellationToken, tokio::task::JoinHandle<()>) {
        let (hub, handle) = Hub::new(HubConfig::default());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(hub.run(cancel.clone()));
        (handle, cancel, task)
    }

    fn broadcast(tenant: Option<&str>, topic: Option<&str>, payload: &str) -> Broadcast {
        Broadcast {
            tenant_id: tenant.map(str::to_string),
            topic: topic.map(str::to_string),
            payload: payload.to_string(),
            exclude: None,
        }
    }

    #[tokio::test]
    async fn topic_broadcast_reaches_only_subscribers_of_the_tenant() {
        let (handle, cancel, _task) = start();
        let mut a = connect(&handle, "club-a", DbId::now_v7(), 8).await;
        let mut b = connect(&handle, "club-a", DbId::now_v7(), 8).await;
        let mut c = connect(&handle, "club-b", DbId::now_v7(), 8).await;
        for peer in [a.id, c.id] {
            handle
                .command(PeerCommand::Subscribe {
                    peer,
                    topic: "facility:1".into(),
                })
                .await
                .unwrap();
        }

        handle.broadcast(broadcast(Some("club-a"), Some("facility:1"), "hello"));
        // A stats round-trip orders after the broadcast in the loop.
        handle.stats().await.unwrap();

        assert_eq!(a.rx.try_recv().unwrap(), "hello");
        assert!(b.rx.try_recv().is_err());
        assert!(c.rx.try_recv().is_err());
        cancel.cancel();
    }

    #[tokio::test]
    async fn unicast_reaches_every_device_of_the_user() {
        let (handle, cancel, _task) = start();
        let user = DbId::now_v7();
        let mut phone = connect(&handle, "club-a", user, 8).await;
        let mut laptop = connect(&handle, "club-a", user, 8).await;
        let mut other = connect(&handle, "club-a", DbId::now_v7(), 8).await;

        handle.unicast(Unicast {
            tenant_id: Some("club-a".into()),
            user_id: user,
            payload: "mine".into(),
            skip_topic: None,
        });
        let stats = handle.stats().await.unwrap();

        assert_eq!(stats.clients, 3);
        assert_eq!(stats.users, 2);
        assert_eq!(phone.rx.try_recv().unwrap(), "mine");
        assert_eq!(laptop.rx.try_recv().unwrap(), "mine");
        assert!(other.rx.try_recv().is_err());
        cancel.cancel();
    }

    #[tokio::test]
    async fn full_peer_buffer_drops_without_stalling_others() {
        let (handle, cancel, _task) = start();
        let mut slow = connect(&handle, "club-a", DbId::now_v7(), 1).await;
        let mut fast = connect(&handle, "club-a", DbId::now_v7(), 8).await;

        for payload in ["1", "2", "3"] {
            handle.broadcast(broadcast(None, None, payload));
        }
        handle.stats().await.unwrap();

        assert_eq!(slow.rx.try_recv().unwrap(), "1");
        assert!(slow.rx.try_recv().is_err());
        let received: Vec<String> = std::iter::from_fn(|| fast.rx.try_recv().ok()).collect();
        assert_eq!(received, vec!["1", "2", "3"]);
        cancel.cancel();
    }

    #[tokio::test]
    async fn exclude_skips_the_origin_peer() {
        let (handle, cancel, _task) = start();
        let mut origin = connect(&handle, "club-a", DbId::now_v7(), 8).await;
        let mut other = connect(&handle, "club-a", DbId::now_v7(), 8).await;

        let mut message = broadcast(None, None, "x");
        message.exclude = Some(origin.id);
        handle.broadcast(message);
        handle.stats().await.unwrap();

        assert!(origin.rx.try_recv().is_err());
        assert_eq!(other.rx.try_recv().unwrap(), "x");
        cancel.cancel();
    }

    #[tokio::test]
    async fn unregister_cleans_every_index() {
        let (handle, cancel, _task) = start();
        let peer = connect(&handle, "club-a", DbId::now_v7(), 8).await;
        handle
            .command(PeerCommand::Subscribe {
                peer: peer.id,
                topic: "facility:9".into(),
            })
            .await
            .unwrap();
        assert_eq!(handle.stats().await.unwrap().topics, 1);

        handle.unregister(peer.id).await;
        assert_eq!(handle.stats().await.unwrap(), HubStats::default());
        cancel.cancel();
    }

    #[tokio::test]
    async fn shutdown_closes_peer_buffers() {
        let (handle, cancel, task) = start();
        let mut peer = connect(&handle, "club-a", DbId::now_v7(), 8).await;
        handle.stats().await.unwrap();

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(peer.rx.recv().await, None);
    }
}
