//! Component F: the request router (spec §4.F). Resolves a request to a
//! target broker, triggering a metadata or coordinator refresh on a cache
//! miss.

use std::time::Duration;

use crate::broker::{Broker, BrokerRegistry};
use crate::config::ConsumerGroup;
use crate::error::WorkerError;
use crate::metadata::{self, MetadataSnapshot};
use crate::protocol::Protocol;
use crate::{coordinator, refresh};

/// Partition-scoped routing (produce, fetch, offset), spec §4.F.
///
/// 1. Consult the metadata cache. If a leader is found, return it.
/// 2. Otherwise refresh metadata and consult again.
///
/// `topic_scoped_first` implements produce's extra twist: on the initial
/// miss, perform a topic-scoped refresh before the full `update_metadata`.
pub async fn route(
    protocol: &dyn Protocol,
    client_id: &str,
    registry: &mut BrokerRegistry,
    network: &dyn crate::network::NetworkClient,
    metadata: &MetadataSnapshot,
    topic: &str,
    partition: i32,
    correlation_id: u32,
    sync_timeout: Duration,
    topic_scoped_first: bool,
) -> (u32, Result<Option<MetadataSnapshot>, WorkerError>) {
    if metadata::leader_for(metadata, registry, topic, partition).is_some() {
        return (correlation_id, Ok(None));
    }

    let mut cid = correlation_id;

    if topic_scoped_first {
        let (next_cid, result) =
            refresh::update_metadata(protocol, client_id, registry, network, Some(topic), cid, sync_timeout).await;
        cid = next_cid;
        match result {
            Ok(snapshot) => {
                if metadata::leader_for(&snapshot, registry, topic, partition).is_some() {
                    return (cid, Ok(Some(snapshot)));
                }
            }
            Err(fatal) => return (cid, Err(fatal)),
        }
    }

    let (next_cid, result) =
        refresh::update_metadata(protocol, client_id, registry, network, None, cid, sync_timeout).await;
    cid = next_cid;
    (cid, result.map(Some))
}

/// Resolves a partition leader given the (possibly refreshed) metadata
/// snapshot that `route` returned. Kept separate from `route` so callers can
/// reuse the original snapshot when no refresh was needed.
pub fn resolve_leader<'a>(
    metadata: &'a MetadataSnapshot,
    refreshed: Option<&'a MetadataSnapshot>,
    registry: &'a BrokerRegistry,
    topic: &str,
    partition: i32,
) -> Option<&'a Broker> {
    let snapshot = refreshed.unwrap_or(metadata);
    metadata::leader_for(snapshot, registry, topic, partition)
}

/// Coordinator-scoped routing (join, sync, heartbeat, offset-fetch,
/// offset-commit), spec §4.F.
///
/// 1. Consult the coordinator cache.
/// 2. On miss, refresh and consult again.
/// 3. If still none and `use_first_as_default` is set, fall back to the
///    registry's first broker -- used only by offset-commit, per spec.
pub async fn route_coordinator<'a>(
    protocol: &dyn Protocol,
    client_id: &str,
    registry: &'a BrokerRegistry,
    coordinator: &Option<crate::coordinator::CoordinatorSnapshot>,
    group: &ConsumerGroup,
    correlation_id: u32,
    sync_timeout: Duration,
    use_first_as_default: bool,
) -> (u32, Option<crate::coordinator::CoordinatorSnapshot>, RouterBrokerChoice) {
    if let Some(snapshot) = coordinator {
        if let Some(broker) = coordinator::coordinator_broker(snapshot, registry) {
            return (correlation_id, None, RouterBrokerChoice::Found(broker_key(broker)));
        }
    }

    let Some(group_name) = group.as_str() else {
        return (correlation_id, None, RouterBrokerChoice::None);
    };

    let (next_cid, result) =
        refresh::update_coordinator(protocol, client_id, registry, group_name, correlation_id, sync_timeout).await;

    match result {
        Ok(snapshot) => {
            let found = coordinator::coordinator_broker(&snapshot, registry).map(broker_key);
            let choice = match found {
                Some(key) => RouterBrokerChoice::Found(key),
                None if use_first_as_default => registry
                    .first()
                    .map(|b| RouterBrokerChoice::Found(broker_key(b)))
                    .unwrap_or(RouterBrokerChoice::None),
                None => RouterBrokerChoice::None,
            };
            (next_cid, Some(snapshot), choice)
        }
        Err(_) => {
            let choice = if use_first_as_default {
                registry
                    .first()
                    .map(|b| RouterBrokerChoice::Found(broker_key(b)))
                    .unwrap_or(RouterBrokerChoice::None)
            } else {
                RouterBrokerChoice::None
            };
            (next_cid, None, choice)
        }
    }
}

fn broker_key(broker: &Broker) -> (String, u16) {
    (broker.host.clone(), broker.port)
}

/// Coordinator/produce routing returns a broker by (host, port) identity
/// rather than a borrow, since the coordinator snapshot may have just been
/// replaced in caller state by the time the broker is looked up again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterBrokerChoice {
    Found((String, u16)),
    None,
}

impl RouterBrokerChoice {
    pub fn resolve<'a>(&self, registry: &'a BrokerRegistry) -> Option<&'a Broker> {
        match self {
            RouterBrokerChoice::Found((host, port)) => registry.find(host, *port),
            RouterBrokerChoice::None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KafkaCode;
    use crate::network::testing::MockNetworkClient;
    use crate::protocol::mock::MockProtocol;
    use crate::protocol::messages::{BrokerMetadata, PartitionMetadata, TopicMetadata};

    fn snapshot_with_leader() -> MetadataSnapshot {
        MetadataSnapshot {
            brokers: vec![BrokerMetadata { node_id: 1, host: "h1".into(), port: 9092 }],
            topics: vec![TopicMetadata {
                name: "t".into(),
                error: KafkaCode::NoError,
                partitions: vec![PartitionMetadata { partition_index: 0, leader_id: 1, error: KafkaCode::NoError }],
            }],
        }
    }

    #[tokio::test]
    async fn route_returns_immediately_on_cache_hit() {
        let network = MockNetworkClient::new();
        let mut registry = BrokerRegistry::new();
        registry.reconcile(&network, &snapshot_with_leader().brokers).await;

        let protocol = MockProtocol::default(); // no replies queued: a refresh would panic
        let metadata = snapshot_with_leader();

        let (cid, refreshed) =
            route(&protocol, "kafka_ex", &mut registry, &network, &metadata, "t", 0, 0, Duration::from_millis(10), false).await;

        assert_eq!(cid, 0);
        let refreshed = refreshed.unwrap();
        assert!(refreshed.is_none());
        assert!(resolve_leader(&metadata, refreshed.as_ref(), &registry, "t", 0).is_some());
    }

    #[tokio::test]
    async fn route_refreshes_on_miss_and_resolves_new_leader() {
        let network = MockNetworkClient::new();
        let mut registry = BrokerRegistry::new();
        registry.reconcile(&network, &snapshot_with_leader().brokers).await;

        let protocol = MockProtocol::default();
        protocol.metadata_replies.lock().push_back(snapshot_with_leader());

        let empty = MetadataSnapshot::default();
        let (cid, refreshed) =
            route(&protocol, "kafka_ex", &mut registry, &network, &empty, "t", 0, 0, Duration::from_millis(10), false).await;

        assert_eq!(cid, 1);
        let snap = refreshed.unwrap().expect("a refresh happened");
        assert!(resolve_leader(&empty, Some(&snap), &registry, "t", 0).is_some());
    }

    #[tokio::test]
    async fn route_coordinator_falls_back_to_first_broker_for_offset_commit() {
        let network = MockNetworkClient::new();
        let mut registry = BrokerRegistry::new();
        registry.reconcile(&network, &snapshot_with_leader().brokers).await;

        let protocol = MockProtocol::default();
        for _ in 0..3 {
            protocol.coordinator_replies.lock().push_back(crate::coordinator::CoordinatorSnapshot {
                error: KafkaCode::GroupCoordinatorNotAvailable,
                node_id: -1,
                host: String::new(),
                port: 0,
            });
        }

        let group = ConsumerGroup::Named("g".into());
        let (_, _, choice) = route_coordinator(
            &protocol,
            "kafka_ex",
            &registry,
            &None,
            &group,
            0,
            Duration::from_millis(1),
            true,
        )
        .await;

        assert_eq!(choice, RouterBrokerChoice::Found(("h1".to_string(), 9092)));
    }

    #[tokio::test]
    async fn route_coordinator_without_default_returns_none_on_exhaustion() {
        let network = MockNetworkClient::new();
        let mut registry = BrokerRegistry::new();
        registry.reconcile(&network, &snapshot_with_leader().brokers).await;

        let protocol = MockProtocol::default();
        for _ in 0..3 {
            protocol.coordinator_replies.lock().push_back(crate::coordinator::CoordinatorSnapshot {
                error: KafkaCode::GroupCoordinatorNotAvailable,
                node_id: -1,
                host: String::new(),
                port: 0,
            });
        }

        let group = ConsumerGroup::Named("g".into());
        let (_, _, choice) = route_coordinator(
            &protocol,
            "kafka_ex",
            &registry,
            &None,
            &group,
            0,
            Duration::from_millis(1),
            false,
        )
        .await;

        assert_eq!(choice, RouterBrokerChoice::None);
    }
}
