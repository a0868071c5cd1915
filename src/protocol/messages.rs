//! Plain request/response data carried across the `Protocol` boundary.
//!
//! These structs are trimmed of wire-version branching and tagged fields --
//! that machinery belongs to the wire codec behind the `Protocol` trait,
//! not to the worker.

use chrono::{DateTime, Utc};

use crate::config::ConsumerGroup;
use crate::error::KafkaCode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMetadata {
    pub node_id: i32,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionMetadata {
    pub partition_index: i32,
    pub leader_id: i32,
    pub error: KafkaCode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMetadata {
    pub name: String,
    pub error: KafkaCode,
    pub partitions: Vec<PartitionMetadata>,
}

/// An immutable value comprising a list of broker identities and a list of
/// `TopicMetadata` entries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetadataSnapshot {
    pub brokers: Vec<BrokerMetadata>,
    pub topics: Vec<TopicMetadata>,
}

/// An error code plus a coordinator node identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorSnapshot {
    pub error: KafkaCode,
    pub node_id: i32,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct RecordToSend {
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ProduceRequest {
    pub topic: String,
    pub partition: i32,
    pub required_acks: i16,
    pub timeout_ms: i32,
    pub messages: Vec<RecordToSend>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProduceResponse {
    pub topic: String,
    pub partition: i32,
    pub error: KafkaCode,
    pub base_offset: i64,
}

/// What `produce` returns to the caller: either a parsed response (sync
/// produce, `required_acks != 0`) or a dispatch sentinel (`required_acks ==
/// 0`, fire-and-forget). See spec §4.G.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProduceOutcome {
    Dispatched,
    Response(ProduceResponse),
}

#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub wait_time_ms: i32,
    pub min_bytes: i32,
    pub max_bytes: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordAndOffset {
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub topic: String,
    pub partition: i32,
    pub error: KafkaCode,
    pub high_watermark: i64,
    /// `None` when the partition has no records past `offset`.
    pub last_offset: Option<i64>,
    pub records: Vec<RecordAndOffset>,
}

#[derive(Debug, Clone)]
pub struct OffsetRequest {
    pub topic: String,
    pub partition: i32,
    pub time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetResponse {
    pub topic: String,
    pub partition: i32,
    pub error: KafkaCode,
    pub offset: i64,
}

#[derive(Debug, Clone)]
pub struct OffsetFetchRequest {
    pub consumer_group: ConsumerGroup,
    pub topic: String,
    pub partition: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetFetchResponse {
    pub topic: String,
    pub partition: i32,
    pub error: KafkaCode,
    pub offset: i64,
    pub metadata: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OffsetCommitRequest {
    pub consumer_group: ConsumerGroup,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub metadata: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetCommitResponse {
    pub topic: String,
    pub partition: i32,
    pub error: KafkaCode,
}

#[derive(Debug, Clone)]
pub struct JoinGroupRequest {
    pub topics: Vec<String>,
    pub session_timeout_ms: i32,
    pub member_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinGroupMember {
    pub member_id: String,
    pub metadata: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinGroupResponse {
    pub error: KafkaCode,
    pub generation_id: i32,
    pub leader_id: String,
    pub member_id: String,
    pub members: Vec<JoinGroupMember>,
}

#[derive(Debug, Clone)]
pub struct SyncGroupAssignment {
    pub member_id: String,
    pub assignment: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct SyncGroupRequest {
    pub generation_id: i32,
    pub member_id: String,
    pub assignments: Vec<SyncGroupAssignment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncGroupResponse {
    pub error: KafkaCode,
    pub assignment: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct HeartbeatRequest {
    pub generation_id: i32,
    pub member_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatResponse {
    pub error: KafkaCode,
}
