//! The connection registry: tracks every live push-channel connection.
//!
//! Two maps are kept in sync under one async mutex:
//!
//! - `topics`: topic name → the connection ids subscribed to it
//! - `entries`: connection id → the connection handle plus its metadata
//!
//! A topic key exists only while at least one connection is under it.
//!
//! # Delivery
//!
//! Every delivery method works the same way:
//!
//! ```text
//! encode ──→ snapshot targets (lock) ──→ send concurrently (no lock)
//!                                              │
//!                 failed or timed out ──→ evict (lock) after the pass
//! ```
//!
//! Sends run concurrently outside the lock, each bounded by the registry's
//! send timeout. A pass therefore finishes within one timeout no matter
//! how many peers have stopped reading, and a connection that disconnects
//! mid-pass doesn't disturb the iteration.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use timeright_protocol::{ProtocolError, UserId, encode_frame};
use timeright_transport::{Connection, ConnectionId};
use tokio::sync::Mutex;

/// The topic every push-channel connection joins.
pub const LEADERBOARD_TOPIC: &str = "leaderboard";

/// How long one frame may take to reach a peer before it is evicted.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// What the registry knows about one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionMeta {
    pub topic: String,
    /// The user the connection was opened for, if identified.
    pub owner: Option<UserId>,
    /// Set by a `subscribe_user_updates` request.
    pub subscribed_user: Option<UserId>,
}

/// Outcome of one delivery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub evicted: usize,
}

struct Entry<C> {
    conn: Arc<C>,
    meta: ConnectionMeta,
}

struct Inner<C> {
    topics: HashMap<String, HashSet<ConnectionId>>,
    entries: HashMap<ConnectionId, Entry<C>>,
}

impl<C> Inner<C> {
    /// Removes `id` from both maps, dropping its topic if it empties.
    fn remove(&mut self, id: ConnectionId) -> Option<ConnectionMeta> {
        let entry = self.entries.remove(&id)?;
        if let Some(members) = self.topics.get_mut(&entry.meta.topic) {
            members.remove(&id);
            if members.is_empty() {
                self.topics.remove(&entry.meta.topic);
            }
        }
        Some(entry.meta)
    }
}

/// All live connections, safe to share across connection tasks.
pub struct ConnectionRegistry<C> {
    inner: Mutex<Inner<C>>,
    send_timeout: Duration,
}

impl<C: Connection> Default for ConnectionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connection> ConnectionRegistry<C> {
    pub fn new() -> Self {
        Self::with_send_timeout(DEFAULT_SEND_TIMEOUT)
    }

    /// A registry that evicts peers whose send takes longer than
    /// `send_timeout`.
    pub fn with_send_timeout(send_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                topics: HashMap::new(),
                entries: HashMap::new(),
            }),
            send_timeout,
        }
    }

    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// Adds `conn` under `topic`, tagged with `owner`.
    ///
    /// Registering a connection id that is already present replaces its
    /// previous registration.
    pub async fn register(
        &self,
        conn: Arc<C>,
        topic: &str,
        owner: Option<UserId>,
    ) -> ConnectionId {
        let id = conn.id();
        let mut inner = self.inner.lock().await;
        inner.remove(id);

        inner
            .topics
            .entry(topic.to_owned())
            .or_default()
            .insert(id);
        inner.entries.insert(
            id,
            Entry {
                conn,
                meta: ConnectionMeta {
                    topic: topic.to_owned(),
                    owner,
                    subscribed_user: None,
                },
            },
        );

        tracing::info!(
            conn_id = %id,
            topic,
            owner = ?owner,
            "connection registered"
        );
        id
    }

    /// Removes a connection. Unknown ids are ignored.
    pub async fn unregister(
        &self,
        id: ConnectionId,
    ) -> Option<ConnectionMeta> {
        let meta = self.inner.lock().await.remove(id);
        if let Some(meta) = &meta {
            tracing::info!(
                conn_id = %id,
                topic = %meta.topic,
                "connection unregistered"
            );
        }
        meta
    }

    /// Tags a connection with the user it wants updates about. Returns
    /// `false` if the connection is not registered.
    pub async fn subscribe_user(
        &self,
        id: ConnectionId,
        user_id: UserId,
    ) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.entries.get_mut(&id) {
            Some(entry) => {
                entry.meta.subscribed_user = Some(user_id);
                true
            }
            None => false,
        }
    }

    /// Sends `message` to every connection under `topic`.
    pub async fn broadcast_to_topic<M: Serialize>(
        &self,
        topic: &str,
        message: &M,
    ) -> Result<Delivery, ProtocolError> {
        let text = encode_frame(message)?;
        let targets = {
            let inner = self.inner.lock().await;
            inner
                .topics
                .get(topic)
                .into_iter()
                .flatten()
                .filter_map(|id| {
                    let entry = inner.entries.get(id)?;
                    Some((*id, Arc::clone(&entry.conn)))
                })
                .collect()
        };
        Ok(self.deliver(targets, &text).await)
    }

    /// Sends `message` to every connection owned by `owner`, in any topic.
    pub async fn send_to_owner<M: Serialize>(
        &self,
        owner: UserId,
        message: &M,
    ) -> Result<Delivery, ProtocolError> {
        let text = encode_frame(message)?;
        let targets = {
            let inner = self.inner.lock().await;
            inner
                .entries
                .iter()
                .filter(|(_, e)| e.meta.owner == Some(owner))
                .map(|(id, e)| (*id, Arc::clone(&e.conn)))
                .collect()
        };
        Ok(self.deliver(targets, &text).await)
    }

    /// Sends `message` to every registered connection.
    pub async fn broadcast_all<M: Serialize>(
        &self,
        message: &M,
    ) -> Result<Delivery, ProtocolError> {
        let text = encode_frame(message)?;
        let targets = {
            let inner = self.inner.lock().await;
            inner
                .entries
                .iter()
                .map(|(id, e)| (*id, Arc::clone(&e.conn)))
                .collect()
        };
        Ok(self.deliver(targets, &text).await)
    }

    /// Live connections, in one topic or overall.
    pub async fn count(&self, topic: Option<&str>) -> usize {
        let inner = self.inner.lock().await;
        match topic {
            Some(topic) => inner.topics.get(topic).map_or(0, HashSet::len),
            None => inner.entries.len(),
        }
    }

    /// Topics that currently have at least one connection.
    pub async fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> =
            self.inner.lock().await.topics.keys().cloned().collect();
        topics.sort();
        topics
    }

    pub async fn metadata(&self, id: ConnectionId) -> Option<ConnectionMeta> {
        self.inner
            .lock()
            .await
            .entries
            .get(&id)
            .map(|e| e.meta.clone())
    }

    async fn deliver(
        &self,
        targets: Vec<(ConnectionId, Arc<C>)>,
        text: &str,
    ) -> Delivery {
        let limit = self.send_timeout;
        let sends = targets.into_iter().map(|(id, conn)| async move {
            let outcome = tokio::time::timeout(limit, conn.send(text)).await;
            (id, outcome)
        });
        let outcomes = join_all(sends).await;

        let mut delivery = Delivery::default();
        let mut failed = Vec::new();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(Ok(())) => delivery.delivered += 1,
                Ok(Err(e)) => {
                    tracing::warn!(
                        conn_id = %id,
                        error = %e,
                        "delivery failed, evicting connection"
                    );
                    failed.push(id);
                }
                Err(_) => {
                    tracing::warn!(
                        conn_id = %id,
                        timeout_ms = limit.as_millis() as u64,
                        "delivery timed out, evicting connection"
                    );
                    failed.push(id);
                }
            }
        }

        if !failed.is_empty() {
            let mut inner = self.inner.lock().await;
            for id in failed {
                if inner.remove(id).is_some() {
                    delivery.evicted += 1;
                }
            }
        }

        tracing::debug!(
            delivered = delivery.delivered,
            evicted = delivery.evicted,
            "delivery pass finished"
        );
        delivery
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for `ConnectionRegistry`.
    //!
    //! Naming convention: `test_{function}_{scenario}_{expected}`.

    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    /// Records every frame it is sent; fails sends once `broken` is set
    /// and never finishes them once `stalled` is set.
    struct MockConn {
        id: ConnectionId,
        frames: StdMutex<Vec<String>>,
        broken: AtomicBool,
        stalled: AtomicBool,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("mock send failure")]
    struct MockError;

    impl MockConn {
        fn new(id: u64) -> Arc<Self> {
            Arc::new(Self {
                id: ConnectionId::new(id),
                frames: StdMutex::new(Vec::new()),
                broken: AtomicBool::new(false),
                stalled: AtomicBool::new(false),
            })
        }

        fn stalled(id: u64) -> Arc<Self> {
            let conn = Self::new(id);
            conn.stalled.store(true, Ordering::SeqCst);
            conn
        }

        fn broken(id: u64) -> Arc<Self> {
            let conn = Self::new(id);
            conn.broken.store(true, Ordering::SeqCst);
            conn
        }

        fn frames(&self) -> Vec<String> {
            self.frames.lock().unwrap().clone()
        }
    }

    impl Connection for MockConn {
        type Error = MockError;

        async fn send(&self, text: &str) -> Result<(), MockError> {
            if self.stalled.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            if self.broken.load(Ordering::SeqCst) {
                return Err(MockError);
            }
            self.frames.lock().unwrap().push(text.to_owned());
            Ok(())
        }

        async fn recv(&self) -> Result<Option<String>, MockError> {
            Ok(None)
        }

        async fn close(&self) -> Result<(), MockError> {
            Ok(())
        }

        fn id(&self) -> ConnectionId {
            self.id
        }
    }

    #[derive(Serialize)]
    struct Ping {
        n: u32,
    }

    // =====================================================================
    // register() / unregister()
    // =====================================================================

    #[tokio::test]
    async fn test_register_then_unregister_removes_topic_key() {
        let registry = ConnectionRegistry::new();
        let conn = MockConn::new(1);

        let id = registry
            .register(conn, LEADERBOARD_TOPIC, Some(UserId(7)))
            .await;
        assert_eq!(registry.count(Some(LEADERBOARD_TOPIC)).await, 1);
        assert_eq!(registry.topics().await, vec![LEADERBOARD_TOPIC.to_owned()]);

        let meta = registry.unregister(id).await.unwrap();
        assert_eq!(meta.owner, Some(UserId(7)));
        assert_eq!(registry.count(Some(LEADERBOARD_TOPIC)).await, 0);
        assert!(registry.topics().await.is_empty());
    }

    #[tokio::test]
    async fn test_unregister_unknown_id_is_noop() {
        let registry: ConnectionRegistry<MockConn> = ConnectionRegistry::new();
        assert!(registry.unregister(ConnectionId::new(99)).await.is_none());
    }

    #[tokio::test]
    async fn test_register_same_id_twice_moves_topic() {
        let registry = ConnectionRegistry::new();
        let conn = MockConn::new(1);
        registry.register(Arc::clone(&conn), "a", None).await;
        registry.register(conn, "b", None).await;

        assert_eq!(registry.count(None).await, 1);
        assert_eq!(registry.topics().await, vec!["b".to_owned()]);
    }

    #[tokio::test]
    async fn test_subscribe_user_records_tag() {
        let registry = ConnectionRegistry::new();
        let id = registry
            .register(MockConn::new(1), LEADERBOARD_TOPIC, None)
            .await;

        assert!(registry.subscribe_user(id, UserId(4)).await);
        let meta = registry.metadata(id).await.unwrap();
        assert_eq!(meta.subscribed_user, Some(UserId(4)));
        assert_eq!(meta.owner, None);

        let unknown = ConnectionId::new(50);
        assert!(!registry.subscribe_user(unknown, UserId(4)).await);
    }

    // =====================================================================
    // delivery
    // =====================================================================

    #[tokio::test]
    async fn test_broadcast_to_topic_evicts_only_failing_connection() {
        let registry = ConnectionRegistry::new();
        let healthy = MockConn::new(1);
        let failing = MockConn::broken(2);
        registry.register(Arc::clone(&healthy), LEADERBOARD_TOPIC, None).await;
        registry.register(Arc::clone(&failing), LEADERBOARD_TOPIC, None).await;

        let delivery = registry
            .broadcast_to_topic(LEADERBOARD_TOPIC, &Ping { n: 1 })
            .await
            .unwrap();

        assert_eq!(delivery, Delivery { delivered: 1, evicted: 1 });
        assert_eq!(healthy.frames(), vec![r#"{"n":1}"#.to_owned()]);
        assert_eq!(registry.count(Some(LEADERBOARD_TOPIC)).await, 1);
        assert!(registry.metadata(ConnectionId::new(2)).await.is_none());
    }

    #[tokio::test]
    async fn test_broadcast_to_topic_stalled_peer_times_out_and_is_evicted() {
        let registry =
            ConnectionRegistry::with_send_timeout(Duration::from_millis(50));
        let healthy = MockConn::new(1);
        let stalled = MockConn::stalled(2);
        registry.register(Arc::clone(&stalled), LEADERBOARD_TOPIC, None).await;
        registry.register(Arc::clone(&healthy), LEADERBOARD_TOPIC, None).await;

        let delivery = tokio::time::timeout(
            Duration::from_secs(2),
            registry.broadcast_to_topic(LEADERBOARD_TOPIC, &Ping { n: 5 }),
        )
        .await
        .expect("a stalled peer must not hold up the pass")
        .unwrap();

        assert_eq!(delivery, Delivery { delivered: 1, evicted: 1 });
        assert_eq!(healthy.frames().len(), 1);
        assert!(registry.metadata(ConnectionId::new(2)).await.is_none());

        // Later passes no longer wait on it.
        let delivery = registry
            .broadcast_to_topic(LEADERBOARD_TOPIC, &Ping { n: 6 })
            .await
            .unwrap();
        assert_eq!(delivery, Delivery { delivered: 1, evicted: 0 });
    }

    #[test]
    fn test_new_uses_default_send_timeout() {
        let registry: ConnectionRegistry<MockConn> = ConnectionRegistry::new();
        assert_eq!(registry.send_timeout(), DEFAULT_SEND_TIMEOUT);
    }

    #[tokio::test]
    async fn test_broadcast_to_topic_skips_other_topics() {
        let registry = ConnectionRegistry::new();
        let inside = MockConn::new(1);
        let outside = MockConn::new(2);
        registry.register(Arc::clone(&inside), LEADERBOARD_TOPIC, None).await;
        registry.register(Arc::clone(&outside), "admin", None).await;

        registry
            .broadcast_to_topic(LEADERBOARD_TOPIC, &Ping { n: 2 })
            .await
            .unwrap();

        assert_eq!(inside.frames().len(), 1);
        assert!(outside.frames().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_to_unknown_topic_delivers_nothing() {
        let registry: ConnectionRegistry<MockConn> = ConnectionRegistry::new();
        let delivery = registry
            .broadcast_to_topic("nobody", &Ping { n: 0 })
            .await
            .unwrap();
        assert_eq!(delivery, Delivery::default());
    }

    #[tokio::test]
    async fn test_send_to_owner_matches_owner_across_topics() {
        let registry = ConnectionRegistry::new();
        let mine_a = MockConn::new(1);
        let mine_b = MockConn::new(2);
        let theirs = MockConn::new(3);
        let (five, six) = (Some(UserId(5)), Some(UserId(6)));
        registry.register(Arc::clone(&mine_a), LEADERBOARD_TOPIC, five).await;
        registry.register(Arc::clone(&mine_b), "other", five).await;
        registry.register(Arc::clone(&theirs), LEADERBOARD_TOPIC, six).await;

        let delivery = registry
            .send_to_owner(UserId(5), &Ping { n: 3 })
            .await
            .unwrap();

        assert_eq!(delivery.delivered, 2);
        assert_eq!(mine_a.frames().len(), 1);
        assert_eq!(mine_b.frames().len(), 1);
        assert!(theirs.frames().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_all_reaches_every_topic() {
        let registry = ConnectionRegistry::new();
        let a = MockConn::new(1);
        let b = MockConn::new(2);
        registry.register(Arc::clone(&a), "x", None).await;
        registry.register(Arc::clone(&b), "y", None).await;

        let delivery = registry.broadcast_all(&Ping { n: 4 }).await.unwrap();
        assert_eq!(delivery.delivered, 2);
        assert_eq!(registry.count(None).await, 2);
    }
}
