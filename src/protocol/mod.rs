//! The `Protocol` collaborator: pure, stateless encode/decode of individual
//! request/response types, plus the one default implementation this crate
//! ships ([`KafkaProtocol`]).
//!
//! Wire-format fidelity with real Apache Kafka is explicitly out of scope --
//! `KafkaProtocol` is a small, internally-consistent binary codec, not a
//! drop-in replacement for the real protocol. A production deployment would
//! swap in an implementation built from versioned `ReadType`/`WriteType`
//! pairs per KIP, the way a real wire-compatible client crate does.

mod codec;
pub mod messages;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::config::ConsumerGroup;
use crate::error::KafkaCode;
use messages::*;

/// Per-request-type `create_request`/`parse_response` pairs. No state; pure
/// encode/decode.
pub trait Protocol: Send + Sync + std::fmt::Debug {
    fn encode_metadata_request(&self, correlation_id: u32, client_id: &str, topic: Option<&str>) -> Vec<u8>;
    fn decode_metadata_response(&self, bytes: &[u8]) -> MetadataSnapshot;

    fn encode_find_coordinator_request(&self, correlation_id: u32, client_id: &str, group: &str) -> Vec<u8>;
    fn decode_find_coordinator_response(&self, bytes: &[u8]) -> CoordinatorSnapshot;

    fn encode_produce_request(&self, correlation_id: u32, client_id: &str, req: &ProduceRequest) -> Vec<u8>;
    fn decode_produce_response(&self, bytes: &[u8]) -> ProduceResponse;

    fn encode_fetch_request(&self, correlation_id: u32, client_id: &str, req: &FetchRequest) -> Vec<u8>;
    fn decode_fetch_response(&self, bytes: &[u8]) -> FetchResponse;

    fn encode_list_offsets_request(&self, correlation_id: u32, client_id: &str, req: &OffsetRequest) -> Vec<u8>;
    fn decode_list_offsets_response(&self, bytes: &[u8]) -> OffsetResponse;

    fn encode_offset_fetch_request(&self, correlation_id: u32, client_id: &str, req: &OffsetFetchRequest) -> Vec<u8>;
    fn decode_offset_fetch_response(&self, bytes: &[u8]) -> OffsetFetchResponse;

    fn encode_offset_commit_request(&self, correlation_id: u32, client_id: &str, req: &OffsetCommitRequest) -> Vec<u8>;
    fn decode_offset_commit_response(&self, bytes: &[u8]) -> OffsetCommitResponse;

    fn encode_join_group_request(&self, correlation_id: u32, client_id: &str, group: &str, req: &JoinGroupRequest) -> Vec<u8>;
    fn decode_join_group_response(&self, bytes: &[u8]) -> JoinGroupResponse;

    fn encode_sync_group_request(&self, correlation_id: u32, client_id: &str, group: &str, req: &SyncGroupRequest) -> Vec<u8>;
    fn decode_sync_group_response(&self, bytes: &[u8]) -> SyncGroupResponse;

    fn encode_heartbeat_request(&self, correlation_id: u32, client_id: &str, group: &str, req: &HeartbeatRequest) -> Vec<u8>;
    fn decode_heartbeat_response(&self, bytes: &[u8]) -> HeartbeatResponse;
}

#[derive(Debug, Default)]
pub struct KafkaProtocol;

impl KafkaProtocol {
    pub fn new() -> Self {
        Self
    }
}

fn put_header(buf: &mut BytesMut, correlation_id: u32, client_id: &str) {
    buf.put_u32(correlation_id);
    codec::put_str(buf, client_id);
}

impl Protocol for KafkaProtocol {
    fn encode_metadata_request(&self, correlation_id: u32, client_id: &str, topic: Option<&str>) -> Vec<u8> {
        let mut buf = BytesMut::new();
        put_header(&mut buf, correlation_id, client_id);
        codec::put_opt_str(&mut buf, topic);
        buf.to_vec()
    }

    fn decode_metadata_response(&self, bytes: &[u8]) -> MetadataSnapshot {
        let mut buf = Bytes::copy_from_slice(bytes);
        let n_brokers = buf.get_i32();
        let mut brokers = Vec::with_capacity(n_brokers.max(0) as usize);
        for _ in 0..n_brokers {
            brokers.push(BrokerMetadata {
                node_id: buf.get_i32(),
                host: codec::get_str(&mut buf),
                port: buf.get_u16(),
            });
        }

        let n_topics = buf.get_i32();
        let mut topics = Vec::with_capacity(n_topics.max(0) as usize);
        for _ in 0..n_topics {
            let name = codec::get_str(&mut buf);
            let error = codec::get_code(&mut buf);
            let n_partitions = buf.get_i32();
            let mut partitions = Vec::with_capacity(n_partitions.max(0) as usize);
            for _ in 0..n_partitions {
                partitions.push(PartitionMetadata {
                    partition_index: buf.get_i32(),
                    leader_id: buf.get_i32(),
                    error: codec::get_code(&mut buf),
                });
            }
            topics.push(TopicMetadata { name, error, partitions });
        }

        MetadataSnapshot { brokers, topics }
    }

    fn encode_find_coordinator_request(&self, correlation_id: u32, client_id: &str, group: &str) -> Vec<u8> {
        let mut buf = BytesMut::new();
        put_header(&mut buf, correlation_id, client_id);
        codec::put_str(&mut buf, group);
        buf.to_vec()
    }

    fn decode_find_coordinator_response(&self, bytes: &[u8]) -> CoordinatorSnapshot {
        let mut buf = Bytes::copy_from_slice(bytes);
        CoordinatorSnapshot {
            error: codec::get_code(&mut buf),
            node_id: buf.get_i32(),
            host: codec::get_str(&mut buf),
            port: buf.get_u16(),
        }
    }

    fn encode_produce_request(&self, correlation_id: u32, client_id: &str, req: &ProduceRequest) -> Vec<u8> {
        let mut buf = BytesMut::new();
        put_header(&mut buf, correlation_id, client_id);
        codec::put_str(&mut buf, &req.topic);
        buf.put_i32(req.partition);
        buf.put_i16(req.required_acks);
        buf.put_i32(req.timeout_ms);
        buf.put_i32(req.messages.len() as i32);
        for msg in &req.messages {
            codec::put_opt_bytes(&mut buf, msg.key.as_deref());
            codec::put_opt_bytes(&mut buf, msg.value.as_deref());
            codec::put_timestamp(&mut buf, msg.timestamp);
        }
        buf.to_vec()
    }

    fn decode_produce_response(&self, bytes: &[u8]) -> ProduceResponse {
        let mut buf = Bytes::copy_from_slice(bytes);
        ProduceResponse {
            topic: codec::get_str(&mut buf),
            partition: buf.get_i32(),
            error: codec::get_code(&mut buf),
            base_offset: buf.get_i64(),
        }
    }

    fn encode_fetch_request(&self, correlation_id: u32, client_id: &str, req: &FetchRequest) -> Vec<u8> {
        let mut buf = BytesMut::new();
        put_header(&mut buf, correlation_id, client_id);
        codec::put_str(&mut buf, &req.topic);
        buf.put_i32(req.partition);
        buf.put_i64(req.offset);
        buf.put_i32(req.wait_time_ms);
        buf.put_i32(req.min_bytes);
        buf.put_i32(req.max_bytes);
        buf.to_vec()
    }

    fn decode_fetch_response(&self, bytes: &[u8]) -> FetchResponse {
        let mut buf = Bytes::copy_from_slice(bytes);
        let topic = codec::get_str(&mut buf);
        let partition = buf.get_i32();
        let error = codec::get_code(&mut buf);
        let high_watermark = buf.get_i64();
        let has_last_offset = buf.get_u8() != 0;
        let last_offset = has_last_offset.then(|| buf.get_i64());
        let n_records = buf.get_i32();
        let mut records = Vec::with_capacity(n_records.max(0) as usize);
        for _ in 0..n_records {
            records.push(RecordAndOffset {
                offset: buf.get_i64(),
                key: codec::get_opt_bytes(&mut buf),
                value: codec::get_opt_bytes(&mut buf),
                timestamp: codec::get_timestamp(&mut buf),
            });
        }
        FetchResponse { topic, partition, error, high_watermark, last_offset, records }
    }

    fn encode_list_offsets_request(&self, correlation_id: u32, client_id: &str, req: &OffsetRequest) -> Vec<u8> {
        let mut buf = BytesMut::new();
        put_header(&mut buf, correlation_id, client_id);
        codec::put_str(&mut buf, &req.topic);
        buf.put_i32(req.partition);
        buf.put_i64(req.time);
        buf.to_vec()
    }

    fn decode_list_offsets_response(&self, bytes: &[u8]) -> OffsetResponse {
        let mut buf = Bytes::copy_from_slice(bytes);
        OffsetResponse {
            topic: codec::get_str(&mut buf),
            partition: buf.get_i32(),
            error: codec::get_code(&mut buf),
            offset: buf.get_i64(),
        }
    }

    fn encode_offset_fetch_request(&self, correlation_id: u32, client_id: &str, req: &OffsetFetchRequest) -> Vec<u8> {
        let mut buf = BytesMut::new();
        put_header(&mut buf, correlation_id, client_id);
        codec::put_opt_str(&mut buf, req.consumer_group.as_str());
        codec::put_str(&mut buf, &req.topic);
        buf.put_i32(req.partition);
        buf.to_vec()
    }

    fn decode_offset_fetch_response(&self, bytes: &[u8]) -> OffsetFetchResponse {
        let mut buf = Bytes::copy_from_slice(bytes);
        OffsetFetchResponse {
            topic: codec::get_str(&mut buf),
            partition: buf.get_i32(),
            error: codec::get_code(&mut buf),
            offset: buf.get_i64(),
            metadata: codec::get_opt_str(&mut buf),
        }
    }

    fn encode_offset_commit_request(&self, correlation_id: u32, client_id: &str, req: &OffsetCommitRequest) -> Vec<u8> {
        let mut buf = BytesMut::new();
        put_header(&mut buf, correlation_id, client_id);
        codec::put_opt_str(&mut buf, req.consumer_group.as_str());
        codec::put_str(&mut buf, &req.topic);
        buf.put_i32(req.partition);
        buf.put_i64(req.offset);
        codec::put_opt_str(&mut buf, req.metadata.as_deref());
        buf.to_vec()
    }

    fn decode_offset_commit_response(&self, bytes: &[u8]) -> OffsetCommitResponse {
        let mut buf = Bytes::copy_from_slice(bytes);
        OffsetCommitResponse {
            topic: codec::get_str(&mut buf),
            partition: buf.get_i32(),
            error: codec::get_code(&mut buf),
        }
    }

    fn encode_join_group_request(&self, correlation_id: u32, client_id: &str, group: &str, req: &JoinGroupRequest) -> Vec<u8> {
        let mut buf = BytesMut::new();
        put_header(&mut buf, correlation_id, client_id);
        codec::put_str(&mut buf, group);
        buf.put_i32(req.session_timeout_ms);
        codec::put_str(&mut buf, &req.member_id);
        buf.put_i32(req.topics.len() as i32);
        for topic in &req.topics {
            codec::put_str(&mut buf, topic);
        }
        buf.to_vec()
    }

    fn decode_join_group_response(&self, bytes: &[u8]) -> JoinGroupResponse {
        let mut buf = Bytes::copy_from_slice(bytes);
        let error = codec::get_code(&mut buf);
        let generation_id = buf.get_i32();
        let leader_id = codec::get_str(&mut buf);
        let member_id = codec::get_str(&mut buf);
        let n_members = buf.get_i32();
        let mut members = Vec::with_capacity(n_members.max(0) as usize);
        for _ in 0..n_members {
            members.push(JoinGroupMember {
                member_id: codec::get_str(&mut buf),
                metadata: codec::get_opt_bytes(&mut buf).unwrap_or_default(),
            });
        }
        JoinGroupResponse { error, generation_id, leader_id, member_id, members }
    }

    fn encode_sync_group_request(&self, correlation_id: u32, client_id: &str, group: &str, req: &SyncGroupRequest) -> Vec<u8> {
        let mut buf = BytesMut::new();
        put_header(&mut buf, correlation_id, client_id);
        codec::put_str(&mut buf, group);
        buf.put_i32(req.generation_id);
        codec::put_str(&mut buf, &req.member_id);
        buf.put_i32(req.assignments.len() as i32);
        for assignment in &req.assignments {
            codec::put_str(&mut buf, &assignment.member_id);
            codec::put_opt_bytes(&mut buf, Some(&assignment.assignment));
        }
        buf.to_vec()
    }

    fn decode_sync_group_response(&self, bytes: &[u8]) -> SyncGroupResponse {
        let mut buf = Bytes::copy_from_slice(bytes);
        SyncGroupResponse {
            error: codec::get_code(&mut buf),
            assignment: codec::get_opt_bytes(&mut buf).unwrap_or_default(),
        }
    }

    fn encode_heartbeat_request(&self, correlation_id: u32, client_id: &str, group: &str, req: &HeartbeatRequest) -> Vec<u8> {
        let mut buf = BytesMut::new();
        put_header(&mut buf, correlation_id, client_id);
        codec::put_str(&mut buf, group);
        buf.put_i32(req.generation_id);
        codec::put_str(&mut buf, &req.member_id);
        buf.to_vec()
    }

    fn decode_heartbeat_response(&self, bytes: &[u8]) -> HeartbeatResponse {
        let mut buf = Bytes::copy_from_slice(bytes);
        HeartbeatResponse { error: codec::get_code(&mut buf) }
    }
}

/// Test-only double that ignores wire bytes entirely and instead replies
/// from a pre-loaded, per-operation queue, so that higher layers (the
/// worker's router and handlers) can be tested without a live broker.
#[cfg(test)]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    #[derive(Debug, Default)]
    pub struct MockProtocol {
        pub metadata_replies: Mutex<VecDeque<MetadataSnapshot>>,
        pub coordinator_replies: Mutex<VecDeque<CoordinatorSnapshot>>,
        pub produce_replies: Mutex<VecDeque<ProduceResponse>>,
        pub fetch_replies: Mutex<VecDeque<FetchResponse>>,
        pub list_offsets_replies: Mutex<VecDeque<OffsetResponse>>,
        pub offset_fetch_replies: Mutex<VecDeque<OffsetFetchResponse>>,
        pub offset_commit_replies: Mutex<VecDeque<OffsetCommitResponse>>,
        pub join_group_replies: Mutex<VecDeque<JoinGroupResponse>>,
        pub sync_group_replies: Mutex<VecDeque<SyncGroupResponse>>,
        pub heartbeat_replies: Mutex<VecDeque<HeartbeatResponse>>,
    }

    fn pop<T: Clone>(queue: &Mutex<VecDeque<T>>) -> T {
        queue
            .lock()
            .pop_front()
            .expect("test did not queue enough mock replies")
    }

    impl Protocol for MockProtocol {
        fn encode_metadata_request(&self, _correlation_id: u32, _client_id: &str, _topic: Option<&str>) -> Vec<u8> {
            vec![1]
        }

        fn decode_metadata_response(&self, _bytes: &[u8]) -> MetadataSnapshot {
            pop(&self.metadata_replies)
        }

        fn encode_find_coordinator_request(&self, _correlation_id: u32, _client_id: &str, _group: &str) -> Vec<u8> {
            vec![1]
        }

        fn decode_find_coordinator_response(&self, _bytes: &[u8]) -> CoordinatorSnapshot {
            pop(&self.coordinator_replies)
        }

        fn encode_produce_request(&self, _correlation_id: u32, _client_id: &str, _req: &ProduceRequest) -> Vec<u8> {
            vec![1]
        }

        fn decode_produce_response(&self, _bytes: &[u8]) -> ProduceResponse {
            pop(&self.produce_replies)
        }

        fn encode_fetch_request(&self, _correlation_id: u32, _client_id: &str, _req: &FetchRequest) -> Vec<u8> {
            vec![1]
        }

        fn decode_fetch_response(&self, _bytes: &[u8]) -> FetchResponse {
            pop(&self.fetch_replies)
        }

        fn encode_list_offsets_request(&self, _correlation_id: u32, _client_id: &str, _req: &OffsetRequest) -> Vec<u8> {
            vec![1]
        }

        fn decode_list_offsets_response(&self, _bytes: &[u8]) -> OffsetResponse {
            pop(&self.list_offsets_replies)
        }

        fn encode_offset_fetch_request(&self, _correlation_id: u32, _client_id: &str, _req: &OffsetFetchRequest) -> Vec<u8> {
            vec![1]
        }

        fn decode_offset_fetch_response(&self, _bytes: &[u8]) -> OffsetFetchResponse {
            pop(&self.offset_fetch_replies)
        }

        fn encode_offset_commit_request(&self, _correlation_id: u32, _client_id: &str, _req: &OffsetCommitRequest) -> Vec<u8> {
            vec![1]
        }

        fn decode_offset_commit_response(&self, _bytes: &[u8]) -> OffsetCommitResponse {
            pop(&self.offset_commit_replies)
        }

        fn encode_join_group_request(&self, _correlation_id: u32, _client_id: &str, _group: &str, _req: &JoinGroupRequest) -> Vec<u8> {
            vec![1]
        }

        fn decode_join_group_response(&self, _bytes: &[u8]) -> JoinGroupResponse {
            pop(&self.join_group_replies)
        }

        fn encode_sync_group_request(&self, _correlation_id: u32, _client_id: &str, _group: &str, _req: &SyncGroupRequest) -> Vec<u8> {
            vec![1]
        }

        fn decode_sync_group_response(&self, _bytes: &[u8]) -> SyncGroupResponse {
            pop(&self.sync_group_replies)
        }

        fn encode_heartbeat_request(&self, _correlation_id: u32, _client_id: &str, _group: &str, _req: &HeartbeatRequest) -> Vec<u8> {
            vec![1]
        }

        fn decode_heartbeat_response(&self, _bytes: &[u8]) -> HeartbeatResponse {
            pop(&self.heartbeat_replies)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn metadata_round_trips() {
        let protocol = KafkaProtocol::new();
        let bytes = protocol.encode_metadata_request(7, "kafka_ex", Some("t"));
        assert!(!bytes.is_empty());

        // Build a response by hand the way a broker would, verify decode.
        let mut buf = BytesMut::new();
        buf.put_i32(1);
        buf.put_i32(1);
        codec::put_str(&mut buf, "broker-0");
        buf.put_u16(9092);
        buf.put_i32(1);
        codec::put_str(&mut buf, "t");
        codec::put_code(&mut buf, KafkaCode::NoError);
        buf.put_i32(1);
        buf.put_i32(0);
        buf.put_i32(1);
        codec::put_code(&mut buf, KafkaCode::NoError);

        let snapshot = protocol.decode_metadata_response(&buf);
        assert_eq!(snapshot.brokers.len(), 1);
        assert_eq!(snapshot.topics[0].name, "t");
        assert_eq!(snapshot.topics[0].partitions[0].leader_id, 1);
    }

    #[test]
    fn produce_round_trips() {
        let protocol = KafkaProtocol::new();
        let req = ProduceRequest {
            topic: "t".into(),
            partition: 0,
            required_acks: 1,
            timeout_ms: 1000,
            messages: vec![RecordToSend {
                key: None,
                value: Some(b"hello".to_vec()),
                timestamp: Utc::now(),
            }],
        };
        let bytes = protocol.encode_produce_request(1, "kafka_ex", &req);
        assert!(!bytes.is_empty());
    }
}
