//! Component H: the streaming loop (spec §4.H). Two states: **inactive** (no
//! sink) and **active** (sink present), tracked by `WorkerState::sink` being
//! `None`/`Some`.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::warn;

use crate::config::{ConsumerGroup, STREAM_MAX_BYTES, STREAM_MIN_BYTES, STREAM_WAIT_TIME_MS};
use crate::error::{Result, WorkerError};
use crate::protocol::messages::{FetchRequest, OffsetCommitRequest, RecordAndOffset};

use super::Worker;

/// The attached sink: an `UnboundedSender` half paired with the
/// `UnboundedReceiverStream` handed back to the caller from `create_stream`.
pub(super) struct StreamSink {
    tx: mpsc::UnboundedSender<RecordAndOffset>,
}

/// Handle to a stream's output sequence, returned by `create_stream`.
pub struct StreamHandle {
    pub records: UnboundedReceiverStream<RecordAndOffset>,
    stop: super::WorkerHandle,
}

impl StreamHandle {
    /// Spec §6.2 `stop_streaming`.
    pub async fn stop(&self) {
        let _ = self.stop.mailbox.send(super::Command::StopStreaming).await;
    }
}

impl Worker {
    /// `create_stream(handler, handler_init)` (spec §4.G): if a live sink is
    /// already attached, log and refuse rather than replacing it. Otherwise
    /// install a fresh sink and kick off the first `start_streaming` message
    /// immediately (subsequent iterations self-reschedule after
    /// `poll_interval`, spec §4.H).
    pub(super) fn handle_create_stream(
        &mut self,
        topic: String,
        partition: i32,
        offset: i64,
        auto_commit: bool,
        poll_interval: Duration,
    ) -> Result<StreamHandle> {
        if self.state.sink.is_some() {
            warn!(topic, partition, "create_stream: a sink is already attached; not replacing it");
            return Err(WorkerError::SinkAlreadyAttached);
        }

        if auto_commit {
            debug_assert!(
                self.state.consumer_group.is_configured(),
                "streaming with auto_commit requires a configured consumer group"
            );
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.state.sink = Some(StreamSink { tx });

        self.reschedule_streaming(topic, partition, offset, auto_commit, poll_interval, Duration::ZERO);

        Ok(StreamHandle {
            records: UnboundedReceiverStream::new(rx),
            stop: super::WorkerHandle { mailbox: self.mailbox_tx.clone() },
        })
    }

    /// `start_streaming(topic, partition, offset, auto_commit, poll_interval)`
    /// (spec §4.H). If the worker has since gone inactive (a race between a
    /// `stop_streaming` and an in-flight self-message), discard silently.
    pub(super) async fn handle_start_streaming(
        &mut self,
        topic: String,
        partition: i32,
        offset: i64,
        auto_commit: bool,
        poll_interval: Duration,
    ) {
        if self.state.sink.is_none() {
            return;
        }

        let request = FetchRequest {
            topic: topic.clone(),
            partition,
            offset,
            wait_time_ms: STREAM_WAIT_TIME_MS,
            min_bytes: STREAM_MIN_BYTES,
            max_bytes: STREAM_MAX_BYTES,
        };

        let next_offset = match self.handle_fetch(request, auto_commit).await {
            Ok(response) => {
                if let Some(sink) = &self.state.sink {
                    for record in &response.records {
                        if sink.tx.send(record.clone()).is_err() {
                            // Receiver dropped; the caller abandoned the stream
                            // without calling `stop()`. Treat like stop_streaming.
                            self.state.sink = None;
                            return;
                        }
                    }
                }
                response.last_offset.map(|last| last + 1).unwrap_or(offset)
            }
            Err(WorkerError::TopicNotFound { .. }) => offset,
            Err(err) => {
                warn!(%err, topic, partition, "streaming fetch failed; keeping current offset");
                offset
            }
        };

        if self.state.sink.is_some() {
            self.reschedule_streaming(topic, partition, next_offset, auto_commit, poll_interval, poll_interval);
        }
    }
}

/// Used only by the fetch handler's auto-commit synthesis to build the
/// substituted-group commit request; kept here since it is purely a
/// streaming/fetch concern, not a general offset-commit one.
pub(super) fn auto_commit_request(topic: String, partition: i32, last_offset: i64, group: ConsumerGroup) -> OffsetCommitRequest {
    OffsetCommitRequest { consumer_group: group, topic, partition, offset: last_offset, metadata: None }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;

    use crate::broker::BrokerRegistry;
    use crate::error::KafkaCode;
    use crate::metadata::MetadataSnapshot;
    use crate::network::testing::MockNetworkClient;
    use crate::protocol::messages::{BrokerMetadata, PartitionMetadata, TopicMetadata};
    use crate::protocol::mock::MockProtocol;

    use super::super::support;
    use super::*;

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

    async fn worker_with_leader(protocol: Arc<MockProtocol>) -> Worker {
        let network: Arc<dyn crate::network::NetworkClient> = Arc::new(MockNetworkClient::new());
        let mut registry = BrokerRegistry::new();
        registry.reconcile(&network, &snapshot_with_leader().brokers).await;
        support::worker(network, protocol, registry, snapshot_with_leader(), ConsumerGroup::None)
    }

    #[tokio::test]
    async fn create_stream_refuses_second_attachment() {
        let mut worker = worker_with_leader(Arc::new(MockProtocol::default())).await;

        let _first = worker
            .handle_create_stream("t".into(), 0, 0, false, Duration::from_millis(50))
            .expect("first attach succeeds");

        let second = worker.handle_create_stream("t".into(), 0, 0, false, Duration::from_millis(50));
        assert_matches!(second, Err(WorkerError::SinkAlreadyAttached));
    }

    /// If the caller drops the `StreamHandle` (and with it its receiver)
    /// without calling `stop()`, the next `start_streaming` iteration that
    /// tries to push a record detects the closed channel and clears the
    /// sink, the same outcome an explicit `stop_streaming` would produce.
    #[tokio::test]
    async fn start_streaming_detects_dropped_receiver_and_clears_sink() {
        let protocol = Arc::new(MockProtocol::default());
        protocol.fetch_replies.lock().push_back(crate::protocol::messages::FetchResponse {
            topic: "t".into(),
            partition: 0,
            error: KafkaCode::NoError,
            high_watermark: 1,
            last_offset: Some(0),
            records: vec![crate::protocol::messages::RecordAndOffset {
                offset: 0,
                key: None,
                value: Some(b"v".to_vec()),
                timestamp: chrono::Utc::now(),
            }],
        });

        let mut worker = worker_with_leader(protocol).await;
        let handle = worker
            .handle_create_stream("t".into(), 0, 0, false, Duration::from_millis(50))
            .expect("attach succeeds");
        drop(handle.records);

        worker
            .handle_start_streaming("t".into(), 0, 0, false, Duration::from_millis(50))
            .await;

        assert!(worker.state.sink.is_none());
    }

    /// `start_streaming` is a no-op once `stop_streaming` has already run
    /// (the sink is gone by the time the self-posted message is handled).
    #[tokio::test]
    async fn start_streaming_is_a_noop_after_stop() {
        let mut worker = worker_with_leader(Arc::new(MockProtocol::default())).await;
        worker
            .handle_create_stream("t".into(), 0, 0, false, Duration::from_millis(50))
            .expect("attach succeeds");

        worker.state.sink = None; // what StopStreaming does to WorkerState

        // No fetch reply is queued: if this reached the protocol it would panic.
        worker
            .handle_start_streaming("t".into(), 0, 0, false, Duration::from_millis(50))
            .await;
    }
}
