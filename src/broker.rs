//! The broker registry: tracks which brokers are known and keeps a live
//! socket open to each one.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::network::{Connection, NetworkClient};
use crate::protocol::messages::BrokerMetadata;

/// Identity = (host, port); two brokers are equal iff these match.
/// The socket, if any, is deliberately excluded from equality/hashing.
#[derive(Clone)]
pub struct Broker {
    pub node_id: Option<i32>,
    pub host: String,
    pub port: u16,
    socket: Option<Arc<dyn Connection>>,
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("node_id", &self.node_id)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("connected", &self.socket.is_some())
            .finish()
    }
}

impl PartialEq for Broker {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host && self.port == other.port
    }
}
impl Eq for Broker {}

impl std::hash::Hash for Broker {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.port.hash(state);
    }
}

impl Broker {
    pub fn new(host: String, port: u16) -> Self {
        Self { node_id: None, host, port, socket: None }
    }

    pub async fn is_connected(&self) -> bool {
        match &self.socket {
            Some(conn) => conn.connected().await,
            None => false,
        }
    }

    pub fn connection(&self) -> Option<&Arc<dyn Connection>> {
        self.socket.as_ref()
    }

    async fn close(&mut self) {
        if let Some(conn) = self.socket.take() {
            conn.close().await;
        }
    }
}

/// Ordered set of known brokers with live sockets. Insertion order is
/// preserved only to support `first()`'s "first broker" fallback.
#[derive(Debug, Default)]
pub struct BrokerRegistry {
    brokers: Vec<Broker>,
}

impl BrokerRegistry {
    pub fn new() -> Self {
        Self { brokers: Vec::new() }
    }

    /// Opens sockets to every seed broker and installs them, as part of the
    /// worker's startup sequence. Connect failures yield a broker with no
    /// live socket rather than aborting the whole seed.
    pub async fn seed(network: &dyn NetworkClient, seeds: &[(String, u16)]) -> Self {
        let mut brokers = Vec::with_capacity(seeds.len());
        for (host, port) in seeds {
            let mut broker = Broker::new(host.clone(), *port);
            match network.connect(host, *port).await {
                Ok(conn) => broker.socket = Some(conn),
                Err(err) => warn!(host, port, %err, "failed to connect to seed broker"),
            }
            brokers.push(broker);
        }
        Self { brokers }
    }

    pub fn is_empty(&self) -> bool {
        self.brokers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Broker> {
        self.brokers.iter()
    }

    pub fn find(&self, host: &str, port: u16) -> Option<&Broker> {
        self.brokers.iter().find(|b| b.host == host && b.port == port)
    }

    pub fn find_by_node(&self, node_id: i32) -> Option<&Broker> {
        self.brokers.iter().find(|b| b.node_id == Some(node_id))
    }

    /// Returns the registry's head, used by fallback paths that need *a*
    /// broker rather than a specific one.
    pub fn first(&self) -> Option<&Broker> {
        self.brokers.first()
    }

    /// Closes and drops every broker, as part of worker teardown.
    pub async fn close_all(&mut self) {
        for broker in &mut self.brokers {
            broker.close().await;
        }
        self.brokers.clear();
    }

    /// Reconciliation policy:
    ///
    /// 1. partition into keep/drop by (host, port) membership in `new_brokers`
    ///    and liveness;
    /// 2. if keep would be empty, abort the removal entirely (spurious-empty
    ///    metadata guard);
    /// 3. otherwise close every dropped broker's socket;
    /// 4. open sockets for every new broker not already kept, and prepend it.
    pub async fn reconcile(&mut self, network: &dyn NetworkClient, new_brokers: &[BrokerMetadata]) {
        if new_brokers.is_empty() {
            // An empty `brokers` list leaves the registry unchanged.
            return;
        }

        let mut keep = Vec::new();
        let mut drop_set = Vec::new();
        for broker in std::mem::take(&mut self.brokers) {
            let still_present = new_brokers.iter().any(|b| b.host == broker.host && b.port == broker.port);
            if still_present && broker.is_connected().await {
                keep.push(broker);
            } else {
                drop_set.push(broker);
            }
        }

        if keep.is_empty() {
            // Guard against a spurious metadata response disconnecting the
            // worker entirely: retain the drop set as-is.
            warn!("metadata reconciliation would drop every known broker; aborting removal");
            self.brokers = drop_set;
            return;
        }

        for mut broker in drop_set {
            broker.close().await;
        }

        for meta in new_brokers {
            let already_kept = keep.iter().any(|b| b.host == meta.host && b.port == meta.port);
            if already_kept {
                continue;
            }

            let mut broker = Broker::new(meta.host.clone(), meta.port);
            broker.node_id = Some(meta.node_id);
            match network.connect(&meta.host, meta.port).await {
                Ok(conn) => broker.socket = Some(conn),
                Err(err) => warn!(host = %meta.host, port = meta.port, %err, "failed to connect to new broker"),
            }
            info!(node_id = meta.node_id, host = %meta.host, port = meta.port, "registry: new broker");
            keep.insert(0, broker);
        }

        self.brokers = keep;
    }
}

/// First-broker-response: iterate the registry in order, skip disconnected
/// brokers, short-circuit on the first non-empty reply.
pub async fn first_broker_response(
    registry: &BrokerRegistry,
    request: Vec<u8>,
    timeout: Duration,
) -> Option<Vec<u8>> {
    for broker in registry.iter() {
        if !broker.is_connected().await {
            continue;
        }
        let Some(conn) = broker.connection() else { continue };
        if let Ok(Some(reply)) = conn.send_sync(request.clone(), timeout).await {
            return Some(reply);
        }
    }
    None
}
