//! The metadata and coordinator refreshers. Both are built on the single
//! retry primitive in [`crate::backoff`].

use std::time::Duration;

use tracing::error;

use crate::backoff::{retry, RetryDecision};
use crate::broker::{first_broker_response, BrokerRegistry};
use crate::error::{KafkaCode, Result, WorkerError};
use crate::protocol::messages::{CoordinatorSnapshot, MetadataSnapshot};
use crate::protocol::Protocol;

const METADATA_RETRY_ATTEMPTS: u32 = 3;
const METADATA_RETRY_DELAY: Duration = Duration::from_millis(300);
const COORDINATOR_RETRY_ATTEMPTS: u32 = 3;
const COORDINATOR_RETRY_DELAY: Duration = Duration::from_millis(400);

fn snapshot_has_leader_not_available(snapshot: &MetadataSnapshot) -> bool {
    snapshot.topics.iter().any(|topic| {
        topic.error.is_leader_not_available()
            || topic.partitions.iter().any(|p| p.error.is_leader_not_available())
    })
}

/// `retrieve(topic?, correlation_id) -> (new_correlation_id, snapshot)`.
///
/// * No broker yields any reply at all -> fatal.
/// * A reply names `leader_not_available` for some topic -> retried up to
///   [`METADATA_RETRY_ATTEMPTS`] times total, sleeping
///   [`METADATA_RETRY_DELAY`] between attempts, incrementing the
///   correlation id each time.
/// * On exhaustion: log and return an empty snapshot so the caller proceeds
///   with stale/empty metadata -- this is explicitly *not* the fatal path.
pub async fn retrieve(
    protocol: &dyn Protocol,
    client_id: &str,
    registry: &BrokerRegistry,
    topic: Option<&str>,
    correlation_id: u32,
    sync_timeout: Duration,
) -> (u32, Result<MetadataSnapshot>) {
    let outcome = retry::<Result<(u32, MetadataSnapshot)>, MetadataSnapshot, _, _>(
        METADATA_RETRY_ATTEMPTS,
        METADATA_RETRY_DELAY,
        |try_index| {
            let cid = correlation_id.wrapping_add(try_index);
            async move {
                let request = protocol.encode_metadata_request(cid, client_id, topic);
                let reply = match first_broker_response(registry, request, sync_timeout).await {
                    Some(reply) => reply,
                    None => {
                        error!("unable to fetch metadata from any known broker");
                        return RetryDecision::Done(Err(WorkerError::NoMetadataAvailable));
                    }
                };

                let snapshot = protocol.decode_metadata_response(&reply);
                if snapshot_has_leader_not_available(&snapshot) {
                    RetryDecision::Retry(snapshot)
                } else {
                    RetryDecision::Done(Ok((cid.wrapping_add(1), snapshot)))
                }
            }
        },
    )
    .await;

    match outcome {
        Ok(Ok((next_cid, snapshot))) => (next_cid, Ok(snapshot)),
        Ok(Err(fatal)) => (correlation_id, Err(fatal)),
        Err(last_snapshot) => {
            error!(
                topics = last_snapshot.topics.len(),
                "metadata refresh exhausted retries with leader_not_available; \
                 continuing with empty metadata"
            );
            (correlation_id.wrapping_add(METADATA_RETRY_ATTEMPTS), Ok(MetadataSnapshot::default()))
        }
    }
}

/// Reconciles the broker registry against a freshly retrieved snapshot and
/// returns the new correlation id.
pub async fn update_metadata(
    protocol: &dyn Protocol,
    client_id: &str,
    registry: &mut BrokerRegistry,
    network: &dyn crate::network::NetworkClient,
    topic: Option<&str>,
    correlation_id: u32,
    sync_timeout: Duration,
) -> (u32, Result<MetadataSnapshot>) {
    let (next_cid, result) = retrieve(protocol, client_id, registry, topic, correlation_id, sync_timeout).await;
    if let Ok(snapshot) = &result {
        registry.reconcile(network, &snapshot.brokers).await;
    }
    (next_cid, result)
}

/// `update_coordinator(state) -> (snapshot, state')`.
///
/// Returns `Ok(snapshot)` when the coordinator should be installed (error
/// code `no_error`), or `Err(snapshot)` carrying the last observed error
/// code when retries were exhausted -- the caller must *not* install this
/// value.
pub async fn update_coordinator(
    protocol: &dyn Protocol,
    client_id: &str,
    registry: &BrokerRegistry,
    group: &str,
    correlation_id: u32,
    sync_timeout: Duration,
) -> (u32, std::result::Result<CoordinatorSnapshot, CoordinatorSnapshot>) {
    let outcome = retry::<(u32, CoordinatorSnapshot), CoordinatorSnapshot, _, _>(
        COORDINATOR_RETRY_ATTEMPTS,
        COORDINATOR_RETRY_DELAY,
        |try_index| {
            let cid = correlation_id.wrapping_add(try_index);
            async move {
                let request = protocol.encode_find_coordinator_request(cid, client_id, group);
                let reply = first_broker_response(registry, request, sync_timeout).await;

                let snapshot = match reply {
                    Some(bytes) => protocol.decode_find_coordinator_response(&bytes),
                    None => CoordinatorSnapshot {
                        error: KafkaCode::RequestTimedOut,
                        node_id: -1,
                        host: String::new(),
                        port: 0,
                    },
                };

                if snapshot.error.is_no_error() {
                    RetryDecision::Done((cid.wrapping_add(1), snapshot))
                } else {
                    RetryDecision::Retry(snapshot)
                }
            }
        },
    )
    .await;

    match outcome {
        Ok((next_cid, snapshot)) => (next_cid, Ok(snapshot)),
        Err(last_snapshot) => {
            error!(
                error = ?last_snapshot.error,
                group,
                "coordinator refresh exhausted retries; keeping previous coordinator"
            );
            (correlation_id.wrapping_add(COORDINATOR_RETRY_ATTEMPTS), Err(last_snapshot))
        }
    }
}
